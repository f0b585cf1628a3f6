//! Pending confirmations for destructive commands

use std::collections::HashMap;
use std::time::Duration;

use remotectl_shared::CommandType;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmOutcome {
    /// The pending request for this alias is consumed
    Confirmed { command: CommandType, alias: String },
    NothingPending,
    /// The pending request names a different alias and stays pending
    AliasMismatch { command: CommandType, pending: String },
    Expired,
}

#[derive(Debug)]
struct PendingConfirmation {
    command: CommandType,
    alias: String,
    requested_at: Instant,
}

/// At most one pending confirmation per principal
#[derive(Debug)]
pub struct ConfirmationBook {
    ttl: Duration,
    pending: Mutex<HashMap<String, PendingConfirmation>>,
}

impl ConfirmationBook {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Record a request; replaces any earlier one from the same principal
    pub async fn request(&self, principal: &str, command: CommandType, alias: &str) {
        self.pending.lock().await.insert(
            principal.to_string(),
            PendingConfirmation {
                command,
                alias: alias.to_string(),
                requested_at: Instant::now(),
            },
        );
    }

    pub async fn confirm(&self, principal: &str, alias: &str) -> ConfirmOutcome {
        let mut pending = self.pending.lock().await;

        let Some(entry) = pending.get(principal) else {
            return ConfirmOutcome::NothingPending;
        };
        if entry.requested_at.elapsed() > self.ttl {
            pending.remove(principal);
            return ConfirmOutcome::Expired;
        }
        if entry.alias != alias {
            return ConfirmOutcome::AliasMismatch {
                command: entry.command,
                pending: entry.alias.clone(),
            };
        }

        let command = entry.command;
        pending.remove(principal);
        ConfirmOutcome::Confirmed {
            command,
            alias: alias.to_string(),
        }
    }

    pub async fn is_pending(&self, principal: &str) -> bool {
        self.pending.lock().await.contains_key(principal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_confirm_consumes() {
        let book = ConfirmationBook::new(Duration::from_secs(60));
        book.request("U1", CommandType::Logout, "gamma").await;

        assert_eq!(
            book.confirm("U1", "gamma").await,
            ConfirmOutcome::Confirmed {
                command: CommandType::Logout,
                alias: "gamma".into()
            }
        );
        assert_eq!(book.confirm("U1", "gamma").await, ConfirmOutcome::NothingPending);
    }

    #[tokio::test]
    async fn test_mismatch_keeps_pending() {
        let book = ConfirmationBook::new(Duration::from_secs(60));
        book.request("U1", CommandType::Logout, "gamma").await;

        assert_eq!(
            book.confirm("U1", "delta").await,
            ConfirmOutcome::AliasMismatch {
                command: CommandType::Logout,
                pending: "gamma".into()
            }
        );
        assert!(book.is_pending("U1").await);
    }

    #[tokio::test]
    async fn test_other_principal_cannot_confirm() {
        let book = ConfirmationBook::new(Duration::from_secs(60));
        book.request("U1", CommandType::Logout, "gamma").await;

        assert_eq!(book.confirm("U3", "gamma").await, ConfirmOutcome::NothingPending);
        assert!(book.is_pending("U1").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry() {
        let book = ConfirmationBook::new(Duration::from_secs(60));
        book.request("U1", CommandType::Logout, "gamma").await;

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(book.confirm("U1", "gamma").await, ConfirmOutcome::Expired);
        assert!(!book.is_pending("U1").await);
    }
}
