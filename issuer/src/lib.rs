//! Issuer
//!
//! Accepts device connections, turns chat commands from authorized
//! principals into signed envelopes and reports each device's answer.

pub mod auth;
pub mod chat;
pub mod command;
pub mod config;
pub mod server;
pub mod session;
pub mod transport;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;

use chat::ChatHandler;
use command::{CommandDispatcher, ResponseCorrelator, TimeoutTracker};
use config::IssuerConfig;
use session::SessionManager;

/// A running issuer: device listener, timeout sweeper and chat handler
pub struct Issuer {
    pub chat: Arc<ChatHandler>,
    pub sessions: Arc<SessionManager>,
    pub correlator: Arc<ResponseCorrelator>,
    pub local_addr: SocketAddr,
}

impl Issuer {
    /// Bind `config.listen_address` and start serving
    pub async fn start(config: &IssuerConfig) -> Result<Self> {
        let listener = TcpListener::bind(&config.listen_address).await?;
        Self::start_with_listener(config, listener)
    }

    pub fn start_with_listener(config: &IssuerConfig, listener: TcpListener) -> Result<Self> {
        let local_addr = listener.local_addr()?;
        let sessions = Arc::new(SessionManager::new());
        let correlator = Arc::new(ResponseCorrelator::new());

        let dispatcher = Arc::new(CommandDispatcher::from_config(
            config,
            sessions.clone(),
            correlator.clone(),
        )?);
        let chat = Arc::new(ChatHandler::new(dispatcher, config));

        let tracker = TimeoutTracker::new(correlator.clone(), sessions.clone());
        tokio::spawn(async move { tracker.run().await });

        {
            let sessions = sessions.clone();
            let correlator = correlator.clone();
            tokio::spawn(async move {
                if let Err(e) = server::serve(listener, sessions, correlator).await {
                    tracing::error!("Device listener stopped: {}", e);
                }
            });
        }

        Ok(Self {
            chat,
            sessions,
            correlator,
            local_addr,
        })
    }
}
