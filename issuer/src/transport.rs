//! Delivery of signed envelopes to addressed devices

use async_trait::async_trait;
use remotectl_shared::CommandEnvelope;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// No live connection for the alias
    #[error("device '{0}' is not connected")]
    Unreachable(String),

    /// A connection existed but the write failed
    #[error("failed to deliver to '{alias}': {reason}")]
    Delivery { alias: String, reason: String },
}

/// Hands an envelope to the device named by its `target_alias`.
///
/// Only the send is covered here; the response arrives asynchronously and is
/// matched by the correlator.
#[async_trait]
pub trait DeviceTransport: Send + Sync {
    async fn deliver(&self, envelope: &CommandEnvelope) -> Result<(), TransportError>;
}
