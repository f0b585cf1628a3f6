//! Command handlers for the different command types

mod lock;
mod logout;
mod ping;
mod status;

pub use lock::handle_lock;
pub use logout::handle_logout;
pub use ping::handle_ping;
pub use status::handle_status;

use std::sync::Arc;

use tokio::time::Instant;
use uuid::Uuid;

use crate::history::CommandHistory;
use crate::system::{LinkState, SessionControl};

/// Context passed to command handlers
#[derive(Clone)]
pub struct HandlerContext {
    pub alias: String,
    pub command_id: Uuid,
    pub session: Arc<dyn SessionControl>,
    pub link: LinkState,
    pub history: Arc<CommandHistory>,
    pub started_at: Instant,
}

/// What a handler did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Completed { message: String },
    /// Message is already sanitized for the wire
    Failed { message: String },
}
