//! Envelope verification for the device agent
//!
//! Every inbound envelope passes through here before anything else touches
//! it:
//! - Recompute and compare the HMAC signature
//! - Enforce the freshness window on `issued_at`
//! - Refuse envelopes addressed to another alias
//! - Refuse command ids already seen inside the window

mod replay;
mod verifier;

pub use replay::{ReplayCache, ReplayError};
pub use verifier::{AgentVerifier, Rejection, VerifiedEnvelope};
