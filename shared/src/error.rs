//! Command error taxonomy shared by both sides

use std::time::Duration;

use thiserror::Error;

/// Why a command did not produce a successful result
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Principal is not entitled to issue the command
    #[error("not authorized")]
    Unauthorized,

    /// Principal exceeded its command budget
    #[error("rate limit exceeded")]
    RateLimited,

    /// Device offline or unaddressable
    #[error("device '{0}' is unreachable")]
    Unreachable(String),

    /// Signature, freshness or replay failure on the device
    #[error("command rejected")]
    Rejected,

    /// The OS action failed on the device
    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    /// Malformed or unrecognized command type
    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    /// No response arrived before the deadline
    #[error("no response within {}s", .0.as_secs())]
    Timeout(Duration),
}
