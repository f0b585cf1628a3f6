//! Periodic sweep of overdue commands and silent devices

use std::sync::Arc;

use remotectl_shared::limits;
use tokio::time::{interval, Duration};
use tracing::{info, warn};

use super::correlator::ResponseCorrelator;
use crate::session::SessionManager;

/// Times out overdue commands even when nobody is waiting on them, and
/// drops device sessions that stopped heartbeating
pub struct TimeoutTracker {
    correlator: Arc<ResponseCorrelator>,
    sessions: Arc<SessionManager>,
    check_interval: Duration,
    heartbeat_timeout: Duration,
}

impl TimeoutTracker {
    pub fn new(correlator: Arc<ResponseCorrelator>, sessions: Arc<SessionManager>) -> Self {
        Self {
            correlator,
            sessions,
            check_interval: Duration::from_millis(1000),
            heartbeat_timeout: Duration::from_millis(limits::HEARTBEAT_TIMEOUT_MS),
        }
    }

    /// One sweep
    pub async fn tick(&self) {
        let expired = self.correlator.expire_overdue().await;
        if !expired.is_empty() {
            warn!("Timed out {} pending commands", expired.len());
        }

        for alias in self.sessions.remove_dead_sessions(self.heartbeat_timeout).await {
            info!(%alias, "Dropped session after missed heartbeats");
        }
    }

    /// Start the monitoring loop
    pub async fn run(&self) {
        let mut ticker = interval(self.check_interval);
        loop {
            ticker.tick().await;
            self.tick().await;
        }
    }
}
