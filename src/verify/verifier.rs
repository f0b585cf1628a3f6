//! Device-side envelope verification

use std::time::Duration;

use chrono::{DateTime, Utc};
use remotectl_shared::{CommandEnvelope, SigningKey};
use thiserror::Error;
use tokio::sync::Mutex;

use super::replay::{ReplayCache, ReplayError};

/// Specific verification failure.
///
/// Only ever written to the local audit log; the network sees the generic
/// rejection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("signature mismatch")]
    BadSignature,

    #[error("issued_at outside freshness window (age {age_ms}ms)")]
    Stale { age_ms: i64 },

    #[error("addressed to '{0}'")]
    WrongTarget(String),

    #[error("command id already seen")]
    Replayed,

    #[error("replay cache full")]
    ReplayCacheFull,
}

/// An envelope that passed every check.
///
/// Only [`AgentVerifier`] can construct one, so the executor cannot be handed
/// an unverified envelope.
#[derive(Debug, Clone)]
pub struct VerifiedEnvelope {
    envelope: CommandEnvelope,
}

impl VerifiedEnvelope {
    pub fn envelope(&self) -> &CommandEnvelope {
        &self.envelope
    }
}

/// Checks signature, freshness, addressing and replay, in that order
#[derive(Debug)]
pub struct AgentVerifier {
    key: SigningKey,
    alias: String,
    window_ms: i64,
    replay: Mutex<ReplayCache>,
}

impl AgentVerifier {
    pub fn new(key: SigningKey, alias: impl Into<String>, window: Duration, capacity: usize) -> Self {
        let window_ms = i64::try_from(window.as_millis()).unwrap_or(i64::MAX);
        Self {
            key,
            alias: alias.into(),
            window_ms,
            replay: Mutex::new(ReplayCache::new(capacity, window_ms)),
        }
    }

    pub async fn verify(&self, envelope: CommandEnvelope) -> Result<VerifiedEnvelope, Rejection> {
        self.verify_at(envelope, Utc::now()).await
    }

    /// Verify against an explicit "now"
    pub async fn verify_at(
        &self,
        envelope: CommandEnvelope,
        now: DateTime<Utc>,
    ) -> Result<VerifiedEnvelope, Rejection> {
        if !self.key.verify_envelope(&envelope) {
            return Err(Rejection::BadSignature);
        }

        let now_ms = now.timestamp_millis();
        let issued_ms = envelope.issued_at.timestamp_millis();
        let age_ms = now_ms.saturating_sub(issued_ms);
        if age_ms.saturating_abs() > self.window_ms {
            return Err(Rejection::Stale { age_ms });
        }

        if envelope.target_alias != self.alias {
            return Err(Rejection::WrongTarget(envelope.target_alias));
        }

        // Only authentic, fresh ids reach the cache, so forged ids cannot fill it
        self.replay
            .lock()
            .await
            .check_and_insert(envelope.command_id, issued_ms, now_ms)
            .map_err(|e| match e {
                ReplayError::Duplicate => Rejection::Replayed,
                ReplayError::Full => Rejection::ReplayCacheFull,
            })?;

        Ok(VerifiedEnvelope { envelope })
    }

    /// The alias this device answers to
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Number of ids currently remembered
    pub async fn remembered(&self) -> usize {
        self.replay.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use remotectl_shared::{CommandSigner, CommandType};

    const SECRET: &str = "agent-test-secret";

    fn verifier() -> AgentVerifier {
        AgentVerifier::new(
            SigningKey::new(Some(SECRET)).unwrap(),
            "alpha",
            Duration::from_secs(300),
            64,
        )
    }

    fn signer() -> CommandSigner {
        CommandSigner::new(Some(SECRET)).unwrap()
    }

    #[tokio::test]
    async fn test_valid_envelope_accepted() {
        let envelope = signer().sign(CommandType::Ping, "alpha");
        let verified = verifier().verify(envelope.clone()).await.unwrap();
        assert_eq!(verified.envelope(), &envelope);
    }

    #[tokio::test]
    async fn test_tampered_alias_rejected_as_signature() {
        let mut envelope = signer().sign(CommandType::Ping, "alpha");
        envelope.target_alias = "alphb".into();
        assert_eq!(
            verifier().verify(envelope).await.unwrap_err(),
            Rejection::BadSignature
        );
    }

    #[tokio::test]
    async fn test_stale_envelope_rejected_despite_signature() {
        let issued = Utc::now() - ChronoDuration::seconds(301);
        let envelope = signer().sign_at(CommandType::Lock, "alpha", issued);

        assert!(SigningKey::new(Some(SECRET)).unwrap().verify_envelope(&envelope));
        assert!(matches!(
            verifier().verify(envelope).await.unwrap_err(),
            Rejection::Stale { .. }
        ));
    }

    #[tokio::test]
    async fn test_future_envelope_rejected() {
        let issued = Utc::now() + ChronoDuration::seconds(600);
        let envelope = signer().sign_at(CommandType::Lock, "alpha", issued);
        assert!(matches!(
            verifier().verify(envelope).await.unwrap_err(),
            Rejection::Stale { .. }
        ));
    }

    #[tokio::test]
    async fn test_wrong_target_rejected() {
        let envelope = signer().sign(CommandType::Lock, "beta");
        assert_eq!(
            verifier().verify(envelope).await.unwrap_err(),
            Rejection::WrongTarget("beta".into())
        );
    }

    #[tokio::test]
    async fn test_replay_rejected() {
        let verifier = verifier();
        let envelope = signer().sign(CommandType::Lock, "alpha");

        assert!(verifier.verify(envelope.clone()).await.is_ok());
        assert_eq!(
            verifier.verify(envelope).await.unwrap_err(),
            Rejection::Replayed
        );
    }

    #[tokio::test]
    async fn test_forged_ids_not_remembered() {
        let verifier = verifier();
        let mut envelope = signer().sign(CommandType::Lock, "alpha");
        envelope.signature = "AAAA".into();

        assert!(verifier.verify(envelope).await.is_err());
        assert_eq!(verifier.remembered().await, 0);
    }

    #[tokio::test]
    async fn test_boundary_of_window() {
        let verifier = verifier();
        let now = Utc::now();
        let issued = now - ChronoDuration::seconds(300);
        let envelope = signer().sign_at(CommandType::Status, "alpha", issued);
        assert!(verifier.verify_at(envelope, now).await.is_ok());
    }
}
