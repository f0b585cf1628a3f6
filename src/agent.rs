//! Agent main loop: connection events in, responses out

use std::sync::Arc;

use anyhow::{anyhow, Result};
use remotectl_shared::{Frame, SigningKey};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::audit::{AuditLog, DEFAULT_AUDIT_CAPACITY};
use crate::command::CommandExecutor;
use crate::config::AgentConfig;
use crate::connection::{ConnectionEvent, ConnectionManager};
use crate::policy::LocalPolicy;
use crate::system::{LinkState, SessionControl};
use crate::verify::AgentVerifier;

/// Build the verifier, policy and executor described by `config`
pub fn build_executor(
    config: &AgentConfig,
    session: Arc<dyn SessionControl>,
    link: LinkState,
) -> Result<CommandExecutor> {
    let key = SigningKey::new(config.secret.as_ref().map(|s| s.expose()))?;
    let verifier = AgentVerifier::new(
        key,
        config.alias.clone(),
        config.freshness_window(),
        config.replay_cache_capacity,
    );
    let executor = CommandExecutor::new(verifier, LocalPolicy::new(&config.policy), session, link);
    Ok(match &config.audit_file {
        Some(path) => executor.with_audit_log(AuditLog::with_file(DEFAULT_AUDIT_CAPACITY, path)),
        None => executor,
    })
}

/// Start the connection and the event loop in the background
pub fn spawn(
    config: &AgentConfig,
    session: Arc<dyn SessionControl>,
) -> Result<(Arc<CommandExecutor>, JoinHandle<Result<()>>)> {
    let link = LinkState::new();
    let executor = Arc::new(build_executor(config, session, link.clone())?);
    let conn = ConnectionManager::new(config.connection(), link);

    let handle = tokio::spawn(run(conn, executor.clone()));
    Ok((executor, handle))
}

/// Process connection events until the connection manager goes away
pub async fn run(mut conn: ConnectionManager, executor: Arc<CommandExecutor>) -> Result<()> {
    loop {
        match conn.recv().await {
            Some(ConnectionEvent::Connected { address }) => {
                info!(alias = %conn.alias(), "Connected to issuer at {}", address);
            }
            Some(ConnectionEvent::Disconnected { reason }) => {
                warn!("Disconnected: {}", reason);
            }
            Some(ConnectionEvent::ConnectionFailed { reason }) => {
                warn!("Connection attempt failed: {}", reason);
            }
            Some(ConnectionEvent::Received(frame)) => {
                handle_issuer_frame(frame, conn.get_sender(), &executor);
            }
            None => {
                error!("Connection manager closed");
                return Err(anyhow!("connection manager closed"));
            }
        }
    }
}

fn handle_issuer_frame(frame: Frame, sender: mpsc::Sender<Frame>, executor: &Arc<CommandExecutor>) {
    match frame {
        Frame::Command(envelope) => {
            // Each envelope gets its own task so a slow Lock never delays a Ping
            let executor = executor.clone();
            tokio::spawn(async move {
                let command_id = envelope.command_id;
                let response = executor.execute(envelope).await;
                if let Err(e) = sender.send(Frame::Response(response)).await {
                    error!(%command_id, "Failed to queue response: {}", e);
                }
            });
        }
        other => {
            debug!("Ignoring {} frame from issuer", other.kind());
        }
    }
}
