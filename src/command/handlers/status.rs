//! Status request command handler

use tracing::{debug, error};

use super::{ActionOutcome, HandlerContext};
use crate::system::DeviceFacts;

/// Handle STATUS
///
/// Always valid and read-only. The message is the JSON-encoded
/// [`DeviceFacts`].
pub async fn handle_status(ctx: &HandlerContext) -> ActionOutcome {
    debug!("Gathering status for {}", ctx.alias);

    let facts = DeviceFacts::gather(
        &ctx.alias,
        ctx.started_at,
        &ctx.link,
        ctx.session.name(),
        ctx.history.stats().await,
    );

    match serde_json::to_string(&facts) {
        Ok(message) => ActionOutcome::Completed { message },
        Err(e) => {
            error!("Failed to encode status: {}", e);
            ActionOutcome::Failed {
                message: "Failed to gather status".into(),
            }
        }
    }
}
