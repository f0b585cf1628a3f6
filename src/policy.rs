//! Device-local policy checked after verification and before execution

use std::collections::HashSet;
use std::path::PathBuf;

use remotectl_shared::CommandType;
use thiserror::Error;
use tracing::warn;

use crate::config::PolicyConfig;

/// Why local policy refused a verified command
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyDenial {
    #[error("remote commands are disabled on this device")]
    ConsentNotGiven,

    #[error("remote commands are emergency-disabled on this device")]
    EmergencyDisabled,

    #[error("command '{0}' is not allowed on this device")]
    CommandNotAllowed(CommandType),
}

/// Owner-controlled gate on top of the issuer's authorization
#[derive(Debug, Clone)]
pub struct LocalPolicy {
    remote_commands_enabled: bool,
    emergency_disable_file: Option<PathBuf>,
    allowed_commands: Option<HashSet<CommandType>>,
}

impl LocalPolicy {
    pub fn new(config: &PolicyConfig) -> Self {
        Self {
            remote_commands_enabled: config.remote_commands_enabled,
            emergency_disable_file: config.emergency_disable_file.clone(),
            allowed_commands: config
                .allowed_commands
                .as_ref()
                .map(|cmds| cmds.iter().copied().collect()),
        }
    }

    /// A policy that accepts everything
    pub fn permissive() -> Self {
        Self {
            remote_commands_enabled: true,
            emergency_disable_file: None,
            allowed_commands: None,
        }
    }

    /// Whether the kill-switch file is present.
    ///
    /// A path that cannot be inspected counts as present.
    pub async fn is_emergency_disabled(&self) -> bool {
        let Some(path) = &self.emergency_disable_file else {
            return false;
        };
        match tokio::fs::try_exists(path).await {
            Ok(exists) => exists,
            Err(e) => {
                warn!("Cannot inspect {}: {}", path.display(), e);
                true
            }
        }
    }

    pub async fn check(&self, command: CommandType) -> Result<(), PolicyDenial> {
        if self.is_emergency_disabled().await {
            return Err(PolicyDenial::EmergencyDisabled);
        }
        if !self.remote_commands_enabled {
            return Err(PolicyDenial::ConsentNotGiven);
        }
        match &self.allowed_commands {
            Some(allowed) if !allowed.contains(&command) => {
                Err(PolicyDenial::CommandNotAllowed(command))
            }
            _ => Ok(()),
        }
    }
}
