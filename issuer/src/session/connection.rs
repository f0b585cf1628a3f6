//! Individual device connection handling

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use remotectl_shared::codec::{self, CodecError, FrameDecoder};
use remotectl_shared::Frame;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tracing::{debug, warn};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Handle to send frames to a specific device
#[derive(Clone)]
pub struct SessionHandle {
    /// Distinguishes successive connections from the same alias
    pub connection_id: u64,
    pub alias: String,
    pub addr: SocketAddr,
    writer: Arc<Mutex<OwnedWriteHalf>>,
    pub connected_at: Instant,
    last_heartbeat: Arc<Mutex<Instant>>,
    close: Arc<Notify>,
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("connection_id", &self.connection_id)
            .field("alias", &self.alias)
            .field("addr", &self.addr)
            .finish()
    }
}

impl SessionHandle {
    /// Send a frame to this device
    pub async fn send(&self, frame: &Frame) -> Result<()> {
        let encoded = codec::encode(frame)?;
        let mut writer = self.writer.lock().await;
        writer.write_all(&encoded).await?;
        Ok(())
    }

    /// Whether a heartbeat arrived within `timeout`
    pub async fn is_alive(&self, timeout: Duration) -> bool {
        self.time_since_heartbeat().await < timeout
    }

    pub async fn update_heartbeat(&self) {
        *self.last_heartbeat.lock().await = Instant::now();
    }

    pub async fn time_since_heartbeat(&self) -> Duration {
        self.last_heartbeat.lock().await.elapsed()
    }

    /// End this connection: the device sees EOF and the read loop is told to stop
    pub async fn close(&self) {
        self.close.notify_one();
        if let Err(e) = self.writer.lock().await.shutdown().await {
            debug!(alias = %self.alias, "Shutdown of {} failed: {}", self.addr, e);
        }
    }

    /// Resolves once `close` has been called on any clone of this handle
    pub async fn closed(&self) {
        self.close.notified().await;
    }
}

/// Active device connection
pub struct DeviceSession {
    writer: Option<OwnedWriteHalf>,
    addr: SocketAddr,
    reader: OwnedReadHalf,
    decoder: FrameDecoder,
    read_buf: Vec<u8>,
}

impl DeviceSession {
    pub fn new(stream: TcpStream, addr: SocketAddr) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            writer: Some(writer),
            addr,
            reader,
            decoder: FrameDecoder::new(),
            read_buf: vec![0u8; 4096],
        }
    }

    /// Bind the connection to `alias`, returning the shareable send handle.
    ///
    /// Only the first call yields a handle.
    pub fn bind(&mut self, alias: &str) -> Option<SessionHandle> {
        let writer = self.writer.take()?;
        let now = Instant::now();
        Some(SessionHandle {
            connection_id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            alias: alias.to_string(),
            addr: self.addr,
            writer: Arc::new(Mutex::new(writer)),
            connected_at: now,
            last_heartbeat: Arc::new(Mutex::new(now)),
            close: Arc::new(Notify::new()),
        })
    }

    /// Read the next frame from this connection.
    ///
    /// `Ok(None)` means the peer closed the connection. Undecodable bodies are
    /// skipped; a corrupt length prefix ends the session.
    pub async fn recv(&mut self) -> Result<Option<Frame>, CodecError> {
        loop {
            match self.decoder.decode_next() {
                Ok(Some(frame)) => return Ok(Some(frame)),
                Ok(None) => {}
                Err(e) if e.is_recoverable() => {
                    warn!("Dropping undecodable frame from {}: {}", self.addr, e);
                    continue;
                }
                Err(e) => return Err(e),
            }

            match self.reader.read(&mut self.read_buf).await {
                Ok(0) => return Ok(None),
                Ok(n) => self.decoder.extend(&self.read_buf[..n]),
                Err(e) => {
                    warn!("Read error from {}: {}", self.addr, e);
                    return Ok(None);
                }
            }
        }
    }
}
