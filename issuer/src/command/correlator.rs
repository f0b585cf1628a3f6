//! Matching device responses to outstanding commands
//!
//! Every sent envelope gets a [`PendingCommand`] holding a oneshot sender.
//! Whichever of response, deadline or cancellation removes the entry first
//! owns the single send; anything arriving later finds no entry and is
//! discarded.

use std::collections::HashMap;
use std::time::Duration;

use remotectl_shared::{CommandEnvelope, CommandError, CommandResponse, CommandResult};
use tokio::sync::{oneshot, Mutex};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

/// How a pending command ended
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Responded(CommandResult),
    TimedOut,
    /// Delivery failed after registration
    Cancelled,
}

/// Outcome of offering a response to the correlator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveStatus {
    Resolved,
    /// Unknown, already resolved, or from the wrong device
    Discarded,
}

/// Issuer-side record of a command awaiting its response
#[derive(Debug)]
struct PendingCommand {
    alias: String,
    command: String,
    submitted_at: Instant,
    deadline: Instant,
    tx: oneshot::Sender<Resolution>,
}

/// Handed to the submitter; awaited through [`ResponseCorrelator::wait`]
#[derive(Debug)]
pub struct PendingReceipt {
    pub command_id: Uuid,
    pub alias: String,
    timeout: Duration,
    deadline: Instant,
    rx: oneshot::Receiver<Resolution>,
}

#[derive(Debug, Default)]
pub struct ResponseCorrelator {
    pending: Mutex<HashMap<Uuid, PendingCommand>>,
}

impl ResponseCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking `envelope` with a deadline `timeout` from now
    pub async fn register(&self, envelope: &CommandEnvelope, timeout: Duration) -> PendingReceipt {
        let (tx, rx) = oneshot::channel();
        let submitted_at = Instant::now();
        let deadline = submitted_at + timeout;

        self.pending.lock().await.insert(
            envelope.command_id,
            PendingCommand {
                alias: envelope.target_alias.clone(),
                command: envelope.command.clone(),
                submitted_at,
                deadline,
                tx,
            },
        );

        PendingReceipt {
            command_id: envelope.command_id,
            alias: envelope.target_alias.clone(),
            timeout,
            deadline,
            rx,
        }
    }

    /// Deliver a response that arrived on `from_alias`'s connection
    pub async fn resolve(&self, from_alias: &str, response: CommandResponse) -> ResolveStatus {
        let mut pending = self.pending.lock().await;

        match pending.get(&response.command_id) {
            Some(entry) if entry.alias == from_alias => {}
            Some(entry) => {
                warn!(
                    command_id = %response.command_id,
                    "Response from '{}' for a command sent to '{}'", from_alias, entry.alias
                );
                return ResolveStatus::Discarded;
            }
            None => {
                debug!(command_id = %response.command_id, "Discarding late or duplicate response");
                return ResolveStatus::Discarded;
            }
        }

        let Some(entry) = pending.remove(&response.command_id) else {
            return ResolveStatus::Discarded;
        };
        drop(pending);

        debug!(
            command_id = %response.command_id,
            alias = %entry.alias,
            "{} answered after {:?}", entry.command, entry.submitted_at.elapsed()
        );
        // The waiter may have given up already; nothing else to notify
        let _ = entry.tx.send(Resolution::Responded(response.result()));
        ResolveStatus::Resolved
    }

    /// Resolve `command_id` as timed out if it is still pending
    pub async fn expire(&self, command_id: Uuid) -> bool {
        self.finish(command_id, Resolution::TimedOut).await
    }

    /// Resolve `command_id` as cancelled if it is still pending
    pub async fn cancel(&self, command_id: Uuid) -> bool {
        self.finish(command_id, Resolution::Cancelled).await
    }

    async fn finish(&self, command_id: Uuid, resolution: Resolution) -> bool {
        let entry = self.pending.lock().await.remove(&command_id);
        match entry {
            Some(entry) => {
                let _ = entry.tx.send(resolution);
                true
            }
            None => false,
        }
    }

    /// Time out every entry whose deadline has passed
    pub async fn expire_overdue(&self) -> Vec<Uuid> {
        let now = Instant::now();
        let mut pending = self.pending.lock().await;
        let overdue: Vec<Uuid> = pending
            .iter()
            .filter(|(_, entry)| entry.deadline <= now)
            .map(|(id, _)| *id)
            .collect();

        for id in &overdue {
            if let Some(entry) = pending.remove(id) {
                warn!(command_id = %id, alias = %entry.alias, "{} timed out", entry.command);
                let _ = entry.tx.send(Resolution::TimedOut);
            }
        }
        overdue
    }

    /// Suspend until the command resolves; the deadline is enforced here too
    pub async fn wait(&self, receipt: PendingReceipt) -> Result<CommandResult, CommandError> {
        let PendingReceipt {
            command_id,
            alias,
            timeout,
            deadline,
            mut rx,
        } = receipt;

        let resolution = match timeout_at(deadline, &mut rx).await {
            Ok(Ok(resolution)) => resolution,
            Ok(Err(_)) => Resolution::TimedOut,
            Err(_) => {
                // A response racing the deadline may still win
                self.expire(command_id).await;
                rx.await.unwrap_or(Resolution::TimedOut)
            }
        };

        match resolution {
            Resolution::Responded(result) => result.into_outcome(),
            Resolution::TimedOut => Err(CommandError::Timeout(timeout)),
            Resolution::Cancelled => Err(CommandError::Unreachable(alias)),
        }
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Whether `command_id` is still outstanding
    pub async fn is_pending(&self, command_id: &Uuid) -> bool {
        self.pending.lock().await.contains_key(command_id)
    }
}
