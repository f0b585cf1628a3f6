//! Structured facts reported by the Status command

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::time::Instant;

use crate::history::HistoryStats;

/// Whether the agent currently holds a connection to the issuer
#[derive(Debug, Clone, Default)]
pub struct LinkState(Arc<AtomicBool>);

impl LinkState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, connected: bool) {
        self.0.store(connected, Ordering::SeqCst);
    }

    pub fn is_connected(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DeviceFacts {
    pub alias: String,
    pub platform: &'static str,
    pub arch: &'static str,
    pub version: &'static str,
    pub hostname: String,
    pub uptime_secs: u64,
    pub connected: bool,
    pub session_control: &'static str,
    pub commands: HistoryStats,
}

impl DeviceFacts {
    pub fn gather(
        alias: &str,
        started_at: Instant,
        link: &LinkState,
        session_control: &'static str,
        commands: HistoryStats,
    ) -> Self {
        let hostname = hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "unknown".into());

        Self {
            alias: alias.to_string(),
            platform: std::env::consts::OS,
            arch: std::env::consts::ARCH,
            version: env!("CARGO_PKG_VERSION"),
            hostname,
            uptime_secs: started_at.elapsed().as_secs(),
            connected: link.is_connected(),
            session_control,
            commands,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_state_shared() {
        let link = LinkState::new();
        let clone = link.clone();
        assert!(!clone.is_connected());
        link.set(true);
        assert!(clone.is_connected());
    }

    #[tokio::test]
    async fn test_facts_serialize() {
        let link = LinkState::new();
        link.set(true);
        let facts = DeviceFacts::gather(
            "alpha",
            Instant::now(),
            &link,
            "dry-run",
            HistoryStats::default(),
        );

        let json = serde_json::to_value(&facts).unwrap();
        assert_eq!(json["alias"], "alpha");
        assert_eq!(json["platform"], std::env::consts::OS);
        assert_eq!(json["connected"], true);
        assert_eq!(json["commands"]["total"], 0);
    }
}
