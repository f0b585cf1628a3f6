//! Lock command handler

use tracing::{error, info};

use super::{ActionOutcome, HandlerContext};

/// Handle LOCK
pub async fn handle_lock(ctx: &HandlerContext) -> ActionOutcome {
    info!(command_id = %ctx.command_id, "Locking session via {}", ctx.session.name());

    match ctx.session.lock_session().await {
        Ok(()) => ActionOutcome::Completed {
            message: "Screen locked".into(),
        },
        Err(e) => {
            // OS detail stays in the local log
            error!(command_id = %ctx.command_id, "Lock failed: {}", e);
            ActionOutcome::Failed {
                message: "Failed to lock screen".into(),
            }
        }
    }
}
