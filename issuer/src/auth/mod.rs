//! Who may issue commands, and how often

mod gate;
mod rate_limit;

pub use gate::{AuthorizationGate, Principal};
pub use rate_limit::RateLimiter;
