//! Logout command handler

use tracing::{error, warn};

use super::{ActionOutcome, HandlerContext};

/// Handle LOGOUT
///
/// Irreversible; the issuer only signs it after a confirmation.
pub async fn handle_logout(ctx: &HandlerContext) -> ActionOutcome {
    warn!(command_id = %ctx.command_id, "Terminating user session via {}", ctx.session.name());

    match ctx.session.logout_session().await {
        Ok(()) => ActionOutcome::Completed {
            message: "User logged out".into(),
        },
        Err(e) => {
            error!(command_id = %ctx.command_id, "Logout failed: {}", e);
            ActionOutcome::Failed {
                message: "Failed to log out user".into(),
            }
        }
    }
}
