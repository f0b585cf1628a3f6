//! Envelope signing
//!
//! The signature is HMAC-SHA256 over
//! ```text
//! command_id || target_alias || epoch_milliseconds(issued_at)
//! ```
//! keyed by a secret provisioned out-of-band to the issuer and every device,
//! and travels base64-encoded.

use std::fmt;

use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, SubsecRound, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;
use uuid::Uuid;

use crate::{CommandEnvelope, CommandType};

type HmacSha256 = Hmac<Sha256>;

/// Errors raised while preparing a signing key
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignerError {
    #[error("no shared secret configured")]
    MissingSecret,

    #[error("shared secret rejected by HMAC: {0}")]
    InvalidKey(String),
}

/// Shared secret as read from configuration; never shown by Debug
#[derive(Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

/// The exact string fed into the MAC
pub fn signing_input(command_id: &Uuid, target_alias: &str, issued_at: &DateTime<Utc>) -> String {
    format!("{}{}{}", command_id, target_alias, issued_at.timestamp_millis())
}

/// A keyed HMAC ready to sign or verify.
///
/// Debug output never includes key material.
#[derive(Clone)]
pub struct SigningKey {
    mac: HmacSha256,
}

impl SigningKey {
    /// Key from the shared secret; an absent or empty secret is fatal
    pub fn new(secret: Option<&str>) -> Result<Self, SignerError> {
        let secret = secret
            .filter(|s| !s.is_empty())
            .ok_or(SignerError::MissingSecret)?;
        let mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| SignerError::InvalidKey(e.to_string()))?;
        Ok(Self { mac })
    }

    /// Base64 MAC of `input`
    pub fn sign(&self, input: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(input.as_bytes());
        general_purpose::STANDARD.encode(mac.finalize().into_bytes())
    }

    /// Constant-time comparison of a base64 signature against `input`
    pub fn verify(&self, input: &str, signature: &str) -> bool {
        let provided = match general_purpose::STANDARD.decode(signature.as_bytes()) {
            Ok(bytes) => bytes,
            Err(_) => return false,
        };
        let mut mac = self.mac.clone();
        mac.update(input.as_bytes());
        mac.verify_slice(&provided).is_ok()
    }

    /// Recompute and compare an envelope's signature
    pub fn verify_envelope(&self, envelope: &CommandEnvelope) -> bool {
        self.verify(&envelope.signing_input(), &envelope.signature)
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningKey(<redacted>)")
    }
}

/// Builds signed envelopes on the issuer side
#[derive(Debug, Clone)]
pub struct CommandSigner {
    key: SigningKey,
}

impl CommandSigner {
    /// Create a signer; fails if no secret is configured
    pub fn new(secret: Option<&str>) -> Result<Self, SignerError> {
        Ok(Self {
            key: SigningKey::new(secret)?,
        })
    }

    /// Build a fresh envelope for `command` addressed to `target_alias`
    pub fn sign(&self, command: CommandType, target_alias: &str) -> CommandEnvelope {
        // Millisecond precision so the ISO-8601 form round-trips to the signed value
        self.sign_at(command, target_alias, Utc::now().trunc_subsecs(3))
    }

    /// Build an envelope with an explicit timestamp
    pub fn sign_at(
        &self,
        command: CommandType,
        target_alias: &str,
        issued_at: DateTime<Utc>,
    ) -> CommandEnvelope {
        let command_id = Uuid::new_v4();
        let signature = self
            .key
            .sign(&signing_input(&command_id, target_alias, &issued_at));

        CommandEnvelope {
            command: command.as_str().to_string(),
            command_id,
            target_alias: target_alias.to_string(),
            issued_at,
            signature,
        }
    }
}
