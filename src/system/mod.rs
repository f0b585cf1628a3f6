//! Operating-system facing pieces of the agent

mod facts;
mod session;

pub use facts::{DeviceFacts, LinkState};
pub use session::{DryRunSession, OsSessionControl, SessionControl, SessionError};
