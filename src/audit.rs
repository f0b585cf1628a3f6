//! Local audit trail
//!
//! Every verification rejection and every executed command lands here. The
//! specific rejection cause is only ever visible through this log and the
//! `audit` tracing target, never on the wire.
//!
//! With a file sink every entry is also appended as one JSON line, and
//! [`AuditLog::restore`] reloads the newest entries after a restart.

use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

/// Default number of retained entries
pub const DEFAULT_AUDIT_CAPACITY: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    Rejected,
    PolicyDenied,
    UnknownCommand,
    Executed,
    ExecutionFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl AuditKind {
    fn severity(&self) -> Severity {
        match self {
            AuditKind::Executed => Severity::Info,
            AuditKind::UnknownCommand | AuditKind::ExecutionFailed => Severity::Warning,
            AuditKind::Rejected | AuditKind::PolicyDenied => Severity::Critical,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub kind: AuditKind,
    pub severity: Severity,
    pub command_id: Uuid,
    pub command: String,
    pub detail: String,
}

/// Bounded ring of audit entries, oldest dropped first
#[derive(Debug)]
pub struct AuditLog {
    entries: RwLock<VecDeque<AuditEntry>>,
    capacity: usize,
    /// Append-only JSON-lines file; the mutex keeps lines whole
    sink: Option<Mutex<PathBuf>>,
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new(DEFAULT_AUDIT_CAPACITY)
    }
}

impl AuditLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity: capacity.max(1),
            sink: None,
        }
    }

    /// Also append every entry to `path`
    pub fn with_file(capacity: usize, path: impl Into<PathBuf>) -> Self {
        Self {
            sink: Some(Mutex::new(path.into())),
            ..Self::new(capacity)
        }
    }

    /// Replace the in-memory entries with the newest ones from the file sink.
    ///
    /// Call before the log is in use. A missing file is an empty history and
    /// lines that do not parse are skipped. Returns the number loaded.
    pub async fn restore(&self) -> io::Result<usize> {
        let Some(sink) = &self.sink else {
            return Ok(0);
        };
        let path = sink.lock().await;
        let text = match tokio::fs::read_to_string(&*path).await {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };

        let mut restored = VecDeque::with_capacity(self.capacity.min(1024));
        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            match serde_json::from_str::<AuditEntry>(line) {
                Ok(entry) => {
                    if restored.len() >= self.capacity {
                        restored.pop_front();
                    }
                    restored.push_back(entry);
                }
                Err(e) => warn!("Skipping unreadable audit line in {}: {}", path.display(), e),
            }
        }

        let count = restored.len();
        *self.entries.write().await = restored;
        Ok(count)
    }

    pub async fn record(
        &self,
        kind: AuditKind,
        command_id: Uuid,
        command: &str,
        detail: impl Into<String>,
    ) {
        let entry = AuditEntry {
            timestamp: Utc::now(),
            kind,
            severity: kind.severity(),
            command_id,
            command: command.to_string(),
            detail: detail.into(),
        };

        match entry.severity {
            Severity::Info => info!(
                target: "audit",
                command_id = %entry.command_id,
                command = %entry.command,
                kind = ?entry.kind,
                "{}", entry.detail
            ),
            Severity::Warning | Severity::Critical => warn!(
                target: "audit",
                command_id = %entry.command_id,
                command = %entry.command,
                kind = ?entry.kind,
                "{}", entry.detail
            ),
        }

        if let Some(sink) = &self.sink {
            let path = sink.lock().await;
            if let Err(e) = append_line(&path, &entry).await {
                warn!("Audit file {} not written: {}", path.display(), e);
            }
        }

        let mut entries = self.entries.write().await;
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Up to `limit` entries, newest first
    pub async fn recent(&self, limit: usize) -> Vec<AuditEntry> {
        self.entries
            .read()
            .await
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

async fn append_line(path: &Path, entry: &AuditEntry) -> io::Result<()> {
    let mut line = serde_json::to_vec(entry)?;
    line.push(b'\n');

    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(&line).await?;
    file.flush().await
}
