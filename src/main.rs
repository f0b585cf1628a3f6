use std::sync::Arc;

use anyhow::{Context, Result};
use device_agent::config::{config_path_from_env, AgentConfig};
use device_agent::connection::ConnectionManager;
use device_agent::system::{DryRunSession, LinkState, OsSessionControl, SessionControl};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let path = config_path_from_env();
    let config = AgentConfig::load(path.as_deref()).context("loading agent configuration")?;

    info!("Device agent starting: {}", config.alias);
    info!("  Issuer: {}", config.issuer_address);
    info!("  Freshness window: {:?}", config.freshness_window());
    if !config.policy.remote_commands_enabled {
        warn!("Remote commands are not enabled; every command will be refused");
    }

    let session: Arc<dyn SessionControl> = if config.dry_run {
        warn!("Dry-run mode: session actions are only recorded");
        Arc::new(DryRunSession::new())
    } else {
        Arc::new(OsSessionControl::new())
    };

    let link = LinkState::new();
    let executor = Arc::new(device_agent::build_executor(&config, session, link.clone())?);
    if let Some(path) = &config.audit_file {
        match executor.audit().restore().await {
            Ok(count) => info!("  Audit file: {} ({} entries restored)", path.display(), count),
            Err(e) => warn!("Audit file {} unreadable: {}", path.display(), e),
        }
    }

    let conn = ConnectionManager::new(config.connection(), link);
    let agent = tokio::spawn(device_agent::run(conn, executor.clone()));

    tokio::select! {
        result = agent => {
            result.context("agent task panicked")??;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
        }
    }

    let stats = executor.history().stats().await;
    info!(
        "Session summary: {} commands ({} failed), {} audit entries",
        stats.total,
        stats.failed,
        executor.audit().len().await
    );
    if let Some(last) = executor.history().recent(1).await.first() {
        info!("  Last command: {} at {}", last.command, last.completed_at);
    }
    for entry in executor.audit().recent(5).await {
        info!(
            target: "audit",
            "  {} {:?} {} {}",
            entry.timestamp, entry.kind, entry.command, entry.detail
        );
    }

    Ok(())
}
