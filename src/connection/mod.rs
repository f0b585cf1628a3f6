//! Connection management for persistent bidirectional communication
//!
//! This module handles:
//! - A persistent TCP connection to the issuer with automatic reconnection
//! - The hello frame that binds the connection to this device's alias
//! - Bidirectional frame streaming
//! - Heartbeat management

mod manager;

pub use manager::{ConnectionConfig, ConnectionEvent, ConnectionManager};
