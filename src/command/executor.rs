//! Command executor - verifies and dispatches incoming envelopes

use std::sync::Arc;

use remotectl_shared::state_machine::{ExecutionEvent, ExecutionStateMachine, TransitionResult};
use remotectl_shared::{CommandEnvelope, CommandResponse, CommandResult, CommandType};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::handlers::{self, ActionOutcome, HandlerContext};
use crate::audit::{AuditKind, AuditLog};
use crate::history::{CommandHistory, HistoryRecord};
use crate::policy::LocalPolicy;
use crate::system::{LinkState, SessionControl};
use crate::verify::{AgentVerifier, VerifiedEnvelope};

/// Executes envelopes received from the issuer
///
/// One state-machine run per envelope. Runs for different envelopes may
/// overlap; Lock and Logout are serialized behind `session_guard`.
pub struct CommandExecutor {
    alias: String,
    verifier: AgentVerifier,
    policy: LocalPolicy,
    session: Arc<dyn SessionControl>,
    session_guard: Mutex<()>,
    audit: Arc<AuditLog>,
    history: Arc<CommandHistory>,
    link: LinkState,
    started_at: Instant,
}

impl CommandExecutor {
    pub fn new(
        verifier: AgentVerifier,
        policy: LocalPolicy,
        session: Arc<dyn SessionControl>,
        link: LinkState,
    ) -> Self {
        Self {
            alias: verifier.alias().to_string(),
            verifier,
            policy,
            session,
            session_guard: Mutex::new(()),
            audit: Arc::new(AuditLog::default()),
            history: Arc::new(CommandHistory::default()),
            link,
            started_at: Instant::now(),
        }
    }

    /// Replace the in-memory audit log, e.g. with one backed by a file
    pub fn with_audit_log(mut self, audit: AuditLog) -> Self {
        self.audit = Arc::new(audit);
        self
    }

    pub fn audit(&self) -> &Arc<AuditLog> {
        &self.audit
    }

    pub fn history(&self) -> &Arc<CommandHistory> {
        &self.history
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Run one envelope to completion and build the response frame body
    pub async fn execute(&self, envelope: CommandEnvelope) -> CommandResponse {
        let command_id = envelope.command_id;
        let command_name = envelope.command.clone();
        let mut machine = ExecutionStateMachine::new();

        debug!(%command_id, command = %command_name, "Received envelope");

        let verified = match self.verifier.verify(envelope).await {
            Ok(verified) => {
                advance(&mut machine, ExecutionEvent::VerificationPassed);
                verified
            }
            Err(rejection) => {
                advance(&mut machine, ExecutionEvent::VerificationFailed);
                self.audit
                    .record(AuditKind::Rejected, command_id, &command_name, rejection.to_string())
                    .await;
                return CommandResponse::new(command_id, CommandResult::rejected());
            }
        };

        let result = self.run_verified(&verified, &mut machine).await;
        debug!(%command_id, trail = ?machine.trail(), "Execution finished");
        CommandResponse::new(command_id, result)
    }

    async fn run_verified(
        &self,
        verified: &VerifiedEnvelope,
        machine: &mut ExecutionStateMachine,
    ) -> CommandResult {
        let envelope = verified.envelope();
        let command_id = envelope.command_id;

        let command = match envelope.command_type() {
            Ok(command) => command,
            Err(e) => {
                advance(machine, ExecutionEvent::LocalPolicyDenied);
                self.audit
                    .record(AuditKind::UnknownCommand, command_id, &envelope.command, e.to_string())
                    .await;
                return CommandResult::unknown_command(&envelope.command);
            }
        };

        if let Err(denial) = self.policy.check(command).await {
            advance(machine, ExecutionEvent::LocalPolicyDenied);
            self.audit
                .record(AuditKind::PolicyDenied, command_id, command.as_str(), denial.to_string())
                .await;
            return CommandResult::failed(denial.to_string());
        }
        advance(machine, ExecutionEvent::LocalPolicyPassed);

        let ctx = HandlerContext {
            alias: self.alias.clone(),
            command_id,
            session: self.session.clone(),
            link: self.link.clone(),
            history: self.history.clone(),
            started_at: self.started_at,
        };

        let start = Instant::now();
        advance(machine, ExecutionEvent::ExecutionStarted);
        info!(%command_id, %command, "Executing command");

        let outcome = if command.mutates_session() {
            let _guard = self.session_guard.lock().await;
            dispatch(command, &ctx).await
        } else {
            dispatch(command, &ctx).await
        };

        let (result, kind) = match outcome {
            ActionOutcome::Completed { message } => {
                advance(machine, ExecutionEvent::ActionSucceeded);
                (CommandResult::completed(message), AuditKind::Executed)
            }
            ActionOutcome::Failed { message } => {
                advance(machine, ExecutionEvent::ActionFailed);
                (CommandResult::failed(message), AuditKind::ExecutionFailed)
            }
        };

        self.history
            .push(HistoryRecord {
                command_id,
                command,
                success: result.success,
                completed_at: result.completed_at,
                duration_ms: start.elapsed().as_millis() as u64,
            })
            .await;

        // Status payloads are large; only the outcome goes to the audit log
        let detail = if command == CommandType::Status && result.success {
            "status reported".to_string()
        } else {
            result.message.clone()
        };
        self.audit
            .record(kind, command_id, command.as_str(), detail)
            .await;

        result
    }
}

async fn dispatch(command: CommandType, ctx: &HandlerContext) -> ActionOutcome {
    match command {
        CommandType::Lock => handlers::handle_lock(ctx).await,
        CommandType::Status => handlers::handle_status(ctx).await,
        CommandType::Ping => handlers::handle_ping(ctx).await,
        CommandType::Logout => handlers::handle_logout(ctx).await,
    }
}

fn advance(machine: &mut ExecutionStateMachine, event: ExecutionEvent) {
    if let TransitionResult::Invalid { from, event } = machine.process_event(event) {
        warn!("Invalid execution transition {:?} from {:?}", event, from);
    }
}
