//! Connection manager with a persistent issuer connection and automatic reconnection

use std::time::Duration;

use anyhow::{anyhow, Result};
use remotectl_shared::codec::{self, FrameDecoder};
use remotectl_shared::{limits, Frame};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{interval, timeout, timeout_at, Instant};
use tracing::{debug, warn};

use crate::system::LinkState;

/// Events emitted by the connection manager
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// Connected and introduced to the issuer
    Connected { address: String },
    /// Lost the issuer connection
    Disconnected { reason: String },
    /// Received a frame from the issuer
    Received(Frame),
    /// A connection attempt failed; another follows after the backoff
    ConnectionFailed { reason: String },
}

/// Configuration for connection manager
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Alias announced in the hello frame
    pub alias: String,
    /// Issuer address (host:port)
    pub issuer_address: String,
    /// Reconnection delay (initial)
    pub reconnect_delay: Duration,
    /// Maximum reconnection delay
    pub max_reconnect_delay: Duration,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Silence from the issuer longer than this drops the connection; the
    /// issuer sends keepalives every heartbeat interval
    pub read_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            alias: "device".into(),
            issuer_address: "127.0.0.1:7300".into(),
            reconnect_delay: Duration::from_secs(1),
            max_reconnect_delay: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(15),
        }
    }
}

/// Manages the persistent connection to the issuer
pub struct ConnectionManager {
    config: ConnectionConfig,
    /// Channel to send frames to the issuer
    outbound_tx: mpsc::Sender<Frame>,
    /// Channel to receive connection events
    event_rx: mpsc::Receiver<ConnectionEvent>,
}

impl ConnectionManager {
    /// Create a new connection manager and start the connection loop
    pub fn new(config: ConnectionConfig, link: LinkState) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::channel::<Frame>(100);
        let (event_tx, event_rx) = mpsc::channel::<ConnectionEvent>(100);

        let config_clone = config.clone();
        tokio::spawn(async move {
            connection_loop(config_clone, link, outbound_rx, event_tx).await;
        });

        Self {
            config,
            outbound_tx,
            event_rx,
        }
    }

    /// Receive the next connection event
    pub async fn recv(&mut self) -> Option<ConnectionEvent> {
        self.event_rx.recv().await
    }

    pub fn alias(&self) -> &str {
        &self.config.alias
    }

    /// Get a clone of the sender for outbound frames
    pub fn get_sender(&self) -> mpsc::Sender<Frame> {
        self.outbound_tx.clone()
    }
}

/// Next delay in the exponential backoff sequence
pub(crate) fn next_backoff(current: Duration, max: Duration) -> Duration {
    std::cmp::min(current.saturating_mul(2), max)
}

/// Main connection loop with reconnection logic
async fn connection_loop(
    config: ConnectionConfig,
    link: LinkState,
    mut outbound_rx: mpsc::Receiver<Frame>,
    event_tx: mpsc::Sender<ConnectionEvent>,
) {
    let mut reconnect_delay = config.reconnect_delay;

    loop {
        match timeout(
            config.connect_timeout,
            TcpStream::connect(&config.issuer_address),
        )
        .await
        {
            Ok(Ok(stream)) => {
                reconnect_delay = config.reconnect_delay;
                link.set(true);

                let _ = event_tx
                    .send(ConnectionEvent::Connected {
                        address: config.issuer_address.clone(),
                    })
                    .await;

                let result = handle_connection(stream, &config, &mut outbound_rx, &event_tx).await;
                link.set(false);

                let reason = match result {
                    Ok(()) => "connection closed".to_string(),
                    Err(e) => e.to_string(),
                };
                if event_tx
                    .send(ConnectionEvent::Disconnected { reason })
                    .await
                    .is_err()
                {
                    // Nobody is listening any more
                    return;
                }
            }
            Ok(Err(e)) => {
                let _ = event_tx
                    .send(ConnectionEvent::ConnectionFailed {
                        reason: format!("{}: {}", config.issuer_address, e),
                    })
                    .await;
            }
            Err(_) => {
                let _ = event_tx
                    .send(ConnectionEvent::ConnectionFailed {
                        reason: format!("{}: connect timed out", config.issuer_address),
                    })
                    .await;
            }
        }

        if event_tx.is_closed() {
            return;
        }

        debug!("Reconnecting in {:?}", reconnect_delay);
        tokio::time::sleep(reconnect_delay).await;
        reconnect_delay = next_backoff(reconnect_delay, config.max_reconnect_delay);
    }
}

/// Handle an active connection
async fn handle_connection(
    stream: TcpStream,
    config: &ConnectionConfig,
    outbound_rx: &mut mpsc::Receiver<Frame>,
    event_tx: &mpsc::Sender<ConnectionEvent>,
) -> Result<()> {
    let (mut reader, mut writer) = stream.into_split();

    let hello = Frame::Hello {
        alias: config.alias.clone(),
        version: env!("CARGO_PKG_VERSION").into(),
    };
    writer.write_all(&codec::encode(&hello)?).await?;

    let mut decoder = FrameDecoder::new();
    let mut read_buf = vec![0u8; 4096];

    let mut heartbeat_interval = interval(Duration::from_millis(limits::HEARTBEAT_INTERVAL_MS));
    let start_time = Instant::now();
    let mut last_inbound = Instant::now();

    loop {
        tokio::select! {
            _ = heartbeat_interval.tick() => {
                let uptime_ms = start_time.elapsed().as_millis() as u64;
                let encoded = codec::encode(&Frame::Heartbeat { uptime_ms })?;
                writer.write_all(&encoded).await?;
            }

            outbound = outbound_rx.recv() => {
                let Some(frame) = outbound else {
                    return Ok(());
                };
                let encoded = codec::encode(&frame)?;
                writer.write_all(&encoded).await?;
            }

            result = timeout_at(last_inbound + config.read_timeout, reader.read(&mut read_buf)) => {
                match result {
                    Ok(Ok(0)) => {
                        return Err(anyhow!("Issuer closed connection"));
                    }
                    Ok(Ok(n)) => {
                        last_inbound = Instant::now();
                        decoder.extend(&read_buf[..n]);

                        loop {
                            match decoder.decode_next() {
                                Ok(Some(Frame::Heartbeat { uptime_ms })) => {
                                    debug!(uptime_ms, "Issuer keepalive");
                                }
                                Ok(Some(frame)) => {
                                    let _ = event_tx.send(ConnectionEvent::Received(frame)).await;
                                }
                                Ok(None) => break,
                                Err(e) if e.is_recoverable() => {
                                    warn!("Dropping undecodable frame: {}", e);
                                }
                                Err(e) => return Err(e.into()),
                            }
                        }
                    }
                    Ok(Err(e)) => {
                        return Err(anyhow!("Read error: {}", e));
                    }
                    Err(_) => {
                        return Err(anyhow!(
                            "No traffic from issuer for {:?}",
                            config.read_timeout
                        ));
                    }
                }
            }
        }
    }
}
