//! Executed-command history and derived statistics

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};
use remotectl_shared::CommandType;
use serde::Serialize;
use tokio::sync::RwLock;
use uuid::Uuid;

pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;

#[derive(Debug, Clone, Serialize)]
pub struct HistoryRecord {
    pub command_id: Uuid,
    pub command: CommandType,
    pub success: bool,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: u64,
}

/// Counts over the retained window
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HistoryStats {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub by_type: BTreeMap<CommandType, usize>,
}

#[derive(Debug)]
pub struct CommandHistory {
    records: RwLock<VecDeque<HistoryRecord>>,
    capacity: usize,
}

impl Default for CommandHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl CommandHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: RwLock::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    pub async fn push(&self, record: HistoryRecord) {
        let mut records = self.records.write().await;
        if records.len() >= self.capacity {
            records.pop_front();
        }
        records.push_back(record);
    }

    pub async fn stats(&self) -> HistoryStats {
        let records = self.records.read().await;
        let mut stats = HistoryStats {
            total: records.len(),
            ..HistoryStats::default()
        };
        for record in records.iter() {
            if record.success {
                stats.succeeded += 1;
            } else {
                stats.failed += 1;
            }
            *stats.by_type.entry(record.command).or_default() += 1;
        }
        stats
    }

    /// Up to `limit` records, newest first
    pub async fn recent(&self, limit: usize) -> Vec<HistoryRecord> {
        self.records
            .read()
            .await
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }
}
