use std::sync::Arc;

use anyhow::{Context, Result};
use issuer::auth::Principal;
use issuer::config::{config_path_from_env, IssuerConfig};
use issuer::Issuer;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Console stand-in for a chat channel.
///
/// Each line is `<principal>[@role,role] <message>`, for example
/// `U1 !ping alpha` or `U7@ops !lock beta`.
fn parse_line(line: &str) -> Option<(Principal, &str)> {
    let line = line.trim();
    let (who, message) = line.split_once(char::is_whitespace)?;
    let principal = match who.split_once('@') {
        Some((id, roles)) => Principal::with_roles(id, roles.split(',').filter(|r| !r.is_empty())),
        None => Principal::new(who),
    };
    Some((principal, message.trim()))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let path = config_path_from_env();
    let config = IssuerConfig::load(path.as_deref()).context("loading issuer configuration")?;

    let issuer = Issuer::start(&config).await?;
    info!("Issuer listening on {}", issuer.local_addr);
    info!(
        "  {} allowed principals, {} allowed roles",
        config.allowed_principals.len(),
        config.allowed_roles.len()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    // No console; keep serving devices until interrupted
                    tokio::signal::ctrl_c().await?;
                    break;
                };
                let Some((principal, message)) = parse_line(&line) else {
                    if !line.trim().is_empty() {
                        warn!("Expected `<principal> <message>`");
                    }
                    continue;
                };

                // Each message runs on its own so a slow device never blocks the next one
                let chat = Arc::clone(&issuer.chat);
                let message = message.to_string();
                tokio::spawn(async move {
                    if let Some(reply) = chat.handle(&principal, &message).await {
                        println!("[{}] {}", principal.id, reply);
                    }
                });
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        }
    }

    Ok(())
}
