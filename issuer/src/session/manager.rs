//! Session manager for tracking all connected devices

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use remotectl_shared::{CommandEnvelope, Frame};
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::connection::SessionHandle;
use crate::transport::{DeviceTransport, TransportError};

/// Manages all active device sessions, keyed by alias
#[derive(Default)]
pub struct SessionManager {
    sessions: Arc<RwLock<HashMap<String, SessionHandle>>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session, replacing and closing any older one for the same alias
    pub async fn register(&self, handle: SessionHandle) -> Option<SessionHandle> {
        let previous = self
            .sessions
            .write()
            .await
            .insert(handle.alias.clone(), handle);
        if let Some(previous) = &previous {
            info!(alias = %previous.alias, "Replacing session from {}", previous.addr);
            previous.close().await;
        }
        previous
    }

    /// Remove `alias` if it is still served by `connection_id`
    pub async fn unregister(&self, alias: &str, connection_id: u64) -> bool {
        let mut sessions = self.sessions.write().await;
        match sessions.get(alias) {
            Some(handle) if handle.connection_id == connection_id => {
                sessions.remove(alias);
                true
            }
            _ => false,
        }
    }

    pub async fn get(&self, alias: &str) -> Option<SessionHandle> {
        self.sessions.read().await.get(alias).cloned()
    }

    /// Send a frame to a specific device
    pub async fn send_to(&self, alias: &str, frame: &Frame) -> Result<(), TransportError> {
        let handle = self
            .get(alias)
            .await
            .ok_or_else(|| TransportError::Unreachable(alias.to_string()))?;

        handle
            .send(frame)
            .await
            .map_err(|e| TransportError::Delivery {
                alias: alias.to_string(),
                reason: e.to_string(),
            })
    }

    /// Aliases of all connected devices, sorted
    pub async fn connected_aliases(&self) -> Vec<String> {
        let mut aliases: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        aliases.sort();
        aliases
    }

    /// Remove and close sessions whose last heartbeat is older than `timeout`.
    ///
    /// Closing makes a device whose socket survived a stall reconnect and
    /// register again instead of heartbeating into an unrouted connection.
    pub async fn remove_dead_sessions(&self, timeout: Duration) -> Vec<String> {
        let mut dead = Vec::new();
        {
            let sessions = self.sessions.read().await;
            for handle in sessions.values() {
                if !handle.is_alive(timeout).await {
                    dead.push(handle.clone());
                }
            }
        }

        let mut removed = Vec::new();
        for handle in dead {
            if self.unregister(&handle.alias, handle.connection_id).await {
                handle.close().await;
                removed.push(handle.alias);
            }
        }
        removed
    }
}

#[async_trait]
impl DeviceTransport for SessionManager {
    async fn deliver(&self, envelope: &CommandEnvelope) -> Result<(), TransportError> {
        debug!(
            command_id = %envelope.command_id,
            alias = %envelope.target_alias,
            "Delivering {}", envelope.command
        );
        self.send_to(&envelope.target_alias, &Frame::Command(envelope.clone()))
            .await
    }
}
