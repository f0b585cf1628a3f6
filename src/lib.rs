//! Device agent
//!
//! Holds a connection to the issuer, verifies every signed envelope it
//! receives and runs the accepted ones against the local user session.

pub mod agent;
pub mod audit;
pub mod command;
pub mod config;
pub mod connection;
pub mod history;
pub mod policy;
pub mod system;
pub mod verify;

pub use agent::{build_executor, run, spawn};
pub use command::CommandExecutor;
pub use config::AgentConfig;
