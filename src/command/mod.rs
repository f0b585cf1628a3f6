//! Command execution infrastructure for the device agent
//!
//! This module handles:
//! - Verifying envelopes received from the issuer
//! - Applying local policy
//! - Dispatching to the command handlers
//! - Building the correlated response

mod executor;
pub mod handlers;

pub use executor::CommandExecutor;
