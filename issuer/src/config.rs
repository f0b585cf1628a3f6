//! Issuer configuration
//!
//! Built once at startup and shared read-only with every component.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use remotectl_shared::{limits, Secret};
use serde::Deserialize;
use thiserror::Error;

pub const CONFIG_ENV: &str = "REMOTECTL_CONFIG";
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

    #[error("command timeout must be non-zero")]
    ZeroTimeout,

    #[error("command prefix must not be empty")]
    EmptyPrefix,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IssuerConfig {
    /// Where device agents connect
    pub listen_address: String,
    pub secret: Option<Secret>,
    pub allowed_principals: HashSet<String>,
    pub allowed_roles: HashSet<String>,
    pub command_timeout_secs: u64,
    /// How long a logout waits for `!confirm`
    pub confirmation_ttl_secs: u64,
    /// Per principal, sliding one-minute window; 0 disables the limit
    pub max_commands_per_minute: usize,
    /// Alias used when a chat command names none
    pub default_alias: Option<String>,
    pub prefix: String,
}

impl Default for IssuerConfig {
    fn default() -> Self {
        Self {
            listen_address: "0.0.0.0:7300".into(),
            secret: None,
            allowed_principals: HashSet::new(),
            allowed_roles: HashSet::new(),
            command_timeout_secs: limits::COMMAND_TIMEOUT_MS / 1000,
            confirmation_ttl_secs: 60,
            max_commands_per_minute: 10,
            default_alias: None,
            prefix: "!".into(),
        }
    }
}

impl IssuerConfig {
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

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.secret.as_ref().map_or(true, Secret::is_empty) {
            return Err(ConfigError::MissingSecret);
        }
        if self.command_timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.prefix.is_empty() {
            return Err(ConfigError::EmptyPrefix);
        }
        Ok(())
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn confirmation_ttl(&self) -> Duration {
        Duration::from_secs(self.confirmation_ttl_secs)
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

    #[test]
    fn test_defaults() {
        let config = IssuerConfig::from_toml_str(r#"secret = "s3cret""#).unwrap();
        assert_eq!(config.command_timeout(), Duration::from_secs(30));
        assert_eq!(config.confirmation_ttl(), Duration::from_secs(60));
        assert_eq!(config.max_commands_per_minute, 10);
        assert_eq!(config.prefix, "!");
        assert!(config.allowed_principals.is_empty());
    }

    #[test]
    fn test_allow_lists() {
        let config = IssuerConfig::from_toml_str(
            r#"
            secret = "s3cret"
            allowed_principals = ["U1"]
            allowed_roles = ["ops"]
            default_alias = "alpha"
            "#,
        )
        .unwrap();

        assert!(config.allowed_principals.contains("U1"));
        assert!(config.allowed_roles.contains("ops"));
        assert_eq!(config.default_alias.as_deref(), Some("alpha"));
    }

    #[test]
    fn test_missing_secret_is_fatal() {
        assert!(matches!(
            IssuerConfig::from_toml_str("").unwrap_err(),
            ConfigError::MissingSecret
        ));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        assert!(matches!(
            IssuerConfig::from_toml_str(
                r#"
                secret = "s3cret"
                command_timeout_secs = 0
                "#
            )
            .unwrap_err(),
            ConfigError::ZeroTimeout
        ));
    }

    #[test]
    fn test_load_from_file() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "secret = \"s3cret\"\nlisten_address = \"127.0.0.1:7400\"\nprefix = \"?\""
        )
        .unwrap();

        let config = IssuerConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.listen_address, "127.0.0.1:7400");
        assert_eq!(config.prefix, "?");
    }

    #[test]
    fn test_unreadable_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = IssuerConfig::load(Some(&dir.path().join("missing.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
