//! Agent configuration
//!
//! Loaded once at startup from a TOML file and never mutated afterwards.
//! The shared secret may come from `REMOTECTL_SECRET` instead of the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use remotectl_shared::{limits, CommandType, Secret};
use serde::Deserialize;
use thiserror::Error;

use crate::connection::ConnectionConfig;

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "REMOTECTL_CONFIG";

/// Environment variable overriding the shared secret
pub const SECRET_ENV: &str = "REMOTECTL_SECRET";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("no shared secret configured (set `secret` or {SECRET_ENV})")]
    MissingSecret,

    #[error("freshness window must be non-zero")]
    ZeroWindow,

    #[error("replay cache capacity must be non-zero")]
    ZeroReplayCapacity,

    #[error("device alias must not be empty")]
    EmptyAlias,
}

/// Secondary, device-local policy
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// The device owner's consent to remote commands
    pub remote_commands_enabled: bool,
    /// While this file exists every command is refused
    pub emergency_disable_file: Option<PathBuf>,
    /// Restrict accepted commands; `None` accepts all
    pub allowed_commands: Option<Vec<CommandType>>,
}

/// Full agent configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Name this device answers to
    pub alias: String,
    /// Issuer address (host:port)
    pub issuer_address: String,
    pub secret: Option<Secret>,
    pub freshness_window_secs: u64,
    pub replay_cache_capacity: usize,
    pub reconnect_delay_ms: u64,
    pub max_reconnect_delay_ms: u64,
    pub connect_timeout_ms: u64,
    /// Record session actions instead of calling the OS
    pub dry_run: bool,
    /// Append audit entries to this JSON-lines file as well
    pub audit_file: Option<PathBuf>,
    pub policy: PolicyConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            alias: "device".into(),
            issuer_address: "127.0.0.1:7300".into(),
            secret: None,
            freshness_window_secs: limits::FRESHNESS_WINDOW_MS / 1000,
            replay_cache_capacity: limits::REPLAY_CACHE_CAPACITY,
            reconnect_delay_ms: 1000,
            max_reconnect_delay_ms: 30_000,
            connect_timeout_ms: 5000,
            dry_run: false,
            audit_file: None,
            policy: PolicyConfig::default(),
        }
    }
}

impl AgentConfig {
    /// Load from `path` (or defaults), apply the environment and validate
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                toml::from_str(&text)?
            }
            None => Self::default(),
        };

        if let Ok(secret) = std::env::var(SECRET_ENV) {
            config.secret = Some(Secret::new(secret));
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse and validate without touching the environment
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.secret.as_ref().map_or(true, Secret::is_empty) {
            return Err(ConfigError::MissingSecret);
        }
        if self.freshness_window_secs == 0 {
            return Err(ConfigError::ZeroWindow);
        }
        if self.replay_cache_capacity == 0 {
            return Err(ConfigError::ZeroReplayCapacity);
        }
        if self.alias.trim().is_empty() {
            return Err(ConfigError::EmptyAlias);
        }
        Ok(())
    }

    pub fn freshness_window(&self) -> Duration {
        Duration::from_secs(self.freshness_window_secs)
    }

    /// Connection settings derived from this config
    pub fn connection(&self) -> ConnectionConfig {
        ConnectionConfig {
            alias: self.alias.clone(),
            issuer_address: self.issuer_address.clone(),
            reconnect_delay: Duration::from_millis(self.reconnect_delay_ms),
            max_reconnect_delay: Duration::from_millis(self.max_reconnect_delay_ms),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            ..ConnectionConfig::default()
        }
    }
}

/// Config path from the first CLI argument, else `REMOTECTL_CONFIG`
pub fn config_path_from_env() -> Option<PathBuf> {
    std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_minimal_config() {
        let config = AgentConfig::from_toml_str(
            r#"
            alias = "alpha"
            secret = "s3cret"
            "#,
        )
        .unwrap();

        assert_eq!(config.alias, "alpha");
        assert_eq!(config.freshness_window(), Duration::from_secs(300));
        assert_eq!(config.replay_cache_capacity, limits::REPLAY_CACHE_CAPACITY);
        assert!(!config.policy.remote_commands_enabled);
    }

    #[test]
    fn test_missing_secret_rejected() {
        let err = AgentConfig::from_toml_str(r#"alias = "alpha""#).unwrap_err();
        assert!(matches!(err, ConfigError::MissingSecret));

        let err = AgentConfig::from_toml_str(
            r#"
            alias = "alpha"
            secret = ""
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingSecret));
    }

    #[test]
    fn test_zero_window_rejected() {
        let err = AgentConfig::from_toml_str(
            r#"
            secret = "s3cret"
            freshness_window_secs = 0
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::ZeroWindow));
    }

    #[test]
    fn test_zero_replay_capacity_rejected() {
        let err = AgentConfig::from_toml_str(
            r#"
            secret = "s3cret"
            replay_cache_capacity = 0
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::ZeroReplayCapacity));
    }

    #[test]
    fn test_policy_section() {
        let config = AgentConfig::from_toml_str(
            r#"
            alias = "beta"
            secret = "s3cret"

            [policy]
            remote_commands_enabled = true
            allowed_commands = ["ping", "status"]
            "#,
        )
        .unwrap();

        assert!(config.policy.remote_commands_enabled);
        assert_eq!(
            config.policy.allowed_commands,
            Some(vec![CommandType::Ping, CommandType::Status])
        );
    }

    #[test]
    fn test_debug_hides_secret() {
        let config = AgentConfig::from_toml_str(
            r#"
            alias = "alpha"
            secret = "very-private"
            "#,
        )
        .unwrap();
        assert!(!format!("{:?}", config).contains("very-private"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "alias = \"gamma\"\nsecret = \"s3cret\"\nissuer_address = \"10.0.0.5:7300\"").unwrap();

        let config = AgentConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.alias, "gamma");
        assert_eq!(config.connection().issuer_address, "10.0.0.5:7300");
    }
}
