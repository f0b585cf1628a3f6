//! Command dispatch and response tracking for the issuer
//!
//! This module handles:
//! - Authorizing, rate limiting and signing commands
//! - Tracking pending commands by `command_id`
//! - Resolving them from responses, deadlines or delivery failures

mod correlator;
mod dispatcher;
mod timeout;

pub use correlator::{PendingReceipt, Resolution, ResolveStatus, ResponseCorrelator};
pub use dispatcher::CommandDispatcher;
pub use timeout::TimeoutTracker;
