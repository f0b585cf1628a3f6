use super::{ActionOutcome, HandlerContext};

/// Handle PING. No side effects.
pub async fn handle_ping(_ctx: &HandlerContext) -> ActionOutcome {
    ActionOutcome::Completed {
        message: "Pong".into(),
    }
}
