//! Wire messages exchanged between the issuer and device agents

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CommandError;

/// The closed set of device-control actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandType {
    Lock,
    Status,
    Ping,
    Logout,
}

impl CommandType {
    pub const ALL: [CommandType; 4] = [
        CommandType::Lock,
        CommandType::Status,
        CommandType::Ping,
        CommandType::Logout,
    ];

    /// Wire name of the command
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandType::Lock => "lock",
            CommandType::Status => "status",
            CommandType::Ping => "ping",
            CommandType::Logout => "logout",
        }
    }

    /// Commands that change the user session and must not race each other
    pub fn mutates_session(&self) -> bool {
        matches!(self, CommandType::Lock | CommandType::Logout)
    }

    /// Irreversible commands that need a second confirmation before signing
    pub fn requires_confirmation(&self) -> bool {
        matches!(self, CommandType::Logout)
    }
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandType {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CommandType::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| CommandError::UnknownCommand(s.to_string()))
    }
}

/// The signed, timestamped unit of work sent from issuer to device.
///
/// `command` travels as a plain string so that a device can still answer an
/// envelope naming a command it does not know; [`CommandEnvelope::command_type`]
/// is the only way to turn it into a [`CommandType`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub command: String,
    pub command_id: Uuid,
    pub target_alias: String,
    pub issued_at: DateTime<Utc>,
    pub signature: String,
}

impl CommandEnvelope {
    /// Parse the command name against the closed set
    pub fn command_type(&self) -> Result<CommandType, CommandError> {
        self.command.parse()
    }

    /// The exact byte string covered by the signature
    pub fn signing_input(&self) -> String {
        crate::signer::signing_input(&self.command_id, &self.target_alias, &self.issued_at)
    }
}

/// Coarse failure class carried next to a failed result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Rejected,
    ExecutionFailed,
    UnknownCommand,
}

/// Device-side outcome of a command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResult {
    pub success: bool,
    /// Plain text, or a JSON document for `Status`
    pub message: String,
    pub completed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
}

/// A result on the wire, correlated to its envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub command_id: Uuid,
    pub success: bool,
    pub message: String,
    pub completed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
}

/// Every message on a device connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    /// First frame a device sends; binds the connection to its alias
    Hello { alias: String, version: String },
    /// Periodic device liveness
    Heartbeat { uptime_ms: u64 },
    /// Issuer to device
    Command(CommandEnvelope),
    /// Device to issuer
    Response(CommandResponse),
}

impl Frame {
    /// Short name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Hello { .. } => "hello",
            Frame::Heartbeat { .. } => "heartbeat",
            Frame::Command(_) => "command",
            Frame::Response(_) => "response",
        }
    }
}
