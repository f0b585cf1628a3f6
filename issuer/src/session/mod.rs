//! Session management for tracking connected devices
//!
//! This module handles:
//! - Binding each connection to the alias from its hello frame
//! - Routing command frames to a specific device
//! - Heartbeat monitoring and dead device detection

mod connection;
mod manager;

pub use connection::{DeviceSession, SessionHandle};
pub use manager::SessionManager;
