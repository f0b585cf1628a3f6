//! Remote Command Protocol Shared Types
//!
//! This crate provides the envelope types, signing and framing used between
//! the issuer and the device agents.

pub mod codec;
pub mod error;
pub mod message;
pub mod signer;
pub mod state_machine;

pub use error::CommandError;
pub use message::*;
pub use signer::{CommandSigner, Secret, SignerError, SigningKey};

/// Protocol limits shared by both sides
pub mod limits {
    /// Device heartbeat interval in milliseconds
    pub const HEARTBEAT_INTERVAL_MS: u64 = 5000;

    /// Issuer drops a device session after this long without a heartbeat
    pub const HEARTBEAT_TIMEOUT_MS: u64 = 30000;

    /// How long the issuer waits for a command response
    pub const COMMAND_TIMEOUT_MS: u64 = 30000;

    /// Maximum accepted envelope age (and future skew)
    pub const FRESHNESS_WINDOW_MS: u64 = 300_000;

    /// Maximum number of command ids remembered by the replay cache
    pub const REPLAY_CACHE_CAPACITY: usize = 4096;

    /// The only text a device ever returns for a verification failure
    pub const REJECTED_MESSAGE: &str = "command rejected";
}

impl CommandResult {
    /// A successful outcome
    pub fn completed(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            completed_at: chrono::Utc::now(),
            error: None,
        }
    }

    /// An OS-level or local-policy failure
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            completed_at: chrono::Utc::now(),
            error: Some(ErrorKind::ExecutionFailed),
        }
    }

    /// The generic verification rejection
    pub fn rejected() -> Self {
        Self {
            success: false,
            message: limits::REJECTED_MESSAGE.into(),
            completed_at: chrono::Utc::now(),
            error: Some(ErrorKind::Rejected),
        }
    }

    /// A verified envelope naming a command this agent does not know
    pub fn unknown_command(name: &str) -> Self {
        Self {
            success: false,
            message: format!("unknown command '{}'", name),
            completed_at: chrono::Utc::now(),
            error: Some(ErrorKind::UnknownCommand),
        }
    }

    /// Map a device outcome into the issuer-side error taxonomy
    pub fn into_outcome(self) -> Result<CommandResult, CommandError> {
        if self.success {
            return Ok(self);
        }
        match self.error {
            Some(ErrorKind::Rejected) => Err(CommandError::Rejected),
            Some(ErrorKind::UnknownCommand) => {
                let name = self
                    .message
                    .strip_prefix("unknown command '")
                    .and_then(|rest| rest.strip_suffix('\''))
                    .map(str::to_string)
                    .unwrap_or(self.message);
                Err(CommandError::UnknownCommand(name))
            }
            Some(ErrorKind::ExecutionFailed) | None => {
                Err(CommandError::ExecutionFailed(self.message))
            }
        }
    }
}

impl CommandResponse {
    /// Attach a result to the command it answers
    pub fn new(command_id: uuid::Uuid, result: CommandResult) -> Self {
        Self {
            command_id,
            success: result.success,
            message: result.message,
            completed_at: result.completed_at,
            error: result.error,
        }
    }

    /// Split the result back out of the response
    pub fn result(&self) -> CommandResult {
        CommandResult {
            success: self.success,
            message: self.message.clone(),
            completed_at: self.completed_at,
            error: self.error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejected_result_is_generic() {
        let result = CommandResult::rejected();
        assert!(!result.success);
        assert_eq!(result.message, limits::REJECTED_MESSAGE);
        assert_eq!(result.into_outcome(), Err(CommandError::Rejected));
    }

    #[test]
    fn test_response_carries_result() {
        let id = uuid::Uuid::new_v4();
        let response = CommandResponse::new(id, CommandResult::completed("Pong"));
        assert_eq!(response.command_id, id);
        assert!(response.success);
        assert_eq!(response.result().message, "Pong");
    }

    #[test]
    fn test_unknown_command_outcome_names_command() {
        assert_eq!(
            CommandResult::unknown_command("reboot").into_outcome(),
            Err(CommandError::UnknownCommand("reboot".into()))
        );
    }

    #[test]
    fn test_failure_without_code_is_execution_failure() {
        let mut result = CommandResult::failed("Failed to lock screen");
        result.error = None;
        assert_eq!(
            result.into_outcome(),
            Err(CommandError::ExecutionFailed("Failed to lock screen".into()))
        );
    }
}
