//! Device-facing TCP listener

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use remotectl_shared::{limits, Frame};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{interval, timeout};
use tracing::{debug, info, warn};

use crate::command::{ResolveStatus, ResponseCorrelator};
use crate::session::{DeviceSession, SessionManager};

/// How long a new connection has to introduce itself
const HELLO_TIMEOUT: Duration = Duration::from_secs(10);

/// Accept device connections until the listener fails
pub async fn serve(
    listener: TcpListener,
    sessions: Arc<SessionManager>,
    correlator: Arc<ResponseCorrelator>,
) -> Result<()> {
    info!("Listening for devices on {}", listener.local_addr()?);

    loop {
        let (stream, addr) = listener.accept().await?;
        debug!("Connection from: {}", addr);

        let sessions = sessions.clone();
        let correlator = correlator.clone();
        tokio::spawn(async move {
            serve_connection(stream, addr, sessions, correlator).await;
        });
    }
}

/// Run one device connection from hello to close
pub async fn serve_connection(
    stream: TcpStream,
    addr: SocketAddr,
    sessions: Arc<SessionManager>,
    correlator: Arc<ResponseCorrelator>,
) {
    let mut session = DeviceSession::new(stream, addr);

    let alias = match timeout(HELLO_TIMEOUT, session.recv()).await {
        Ok(Ok(Some(Frame::Hello { alias, version }))) if !alias.trim().is_empty() => {
            info!(%alias, %version, "Device connected from {}", addr);
            alias
        }
        Ok(Ok(Some(other))) => {
            warn!("{} sent {} before hello; closing", addr, other.kind());
            return;
        }
        Ok(Ok(None)) => return,
        Ok(Err(e)) => {
            warn!("Decode error from {}: {}", addr, e);
            return;
        }
        Err(_) => {
            warn!("{} did not say hello in time", addr);
            return;
        }
    };

    let Some(handle) = session.bind(&alias) else {
        return;
    };
    let connection_id = handle.connection_id;
    sessions.register(handle.clone()).await;
    debug!("Online devices: {:?}", sessions.connected_aliases().await);

    let mut keepalive = interval(Duration::from_millis(limits::HEARTBEAT_INTERVAL_MS));

    loop {
        tokio::select! {
            _ = handle.closed() => {
                info!(%alias, "Session closed by issuer");
                break;
            }

            _ = keepalive.tick() => {
                let uptime_ms = handle.connected_at.elapsed().as_millis() as u64;
                if let Err(e) = handle.send(&Frame::Heartbeat { uptime_ms }).await {
                    warn!(%alias, "Keepalive failed: {}", e);
                    break;
                }
            }

            received = session.recv() => match received {
                Ok(Some(Frame::Heartbeat { uptime_ms })) => {
                    handle.update_heartbeat().await;
                    debug!(%alias, uptime_ms, "Heartbeat");
                }
                Ok(Some(Frame::Response(response))) => {
                    let command_id = response.command_id;
                    if correlator.resolve(&alias, response).await == ResolveStatus::Discarded {
                        debug!(%alias, %command_id, "Response had no pending command");
                    }
                }
                Ok(Some(other)) => {
                    warn!(%alias, "Unexpected {} frame from device", other.kind());
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(%alias, "Decode error: {}", e);
                    break;
                }
            }
        }
    }

    if sessions.unregister(&alias, connection_id).await {
        info!(%alias, "Device disconnected");
    }
}
