//! Command dispatcher: authorize, sign, send, await

use std::sync::Arc;
use std::time::Duration;

use remotectl_shared::{CommandError, CommandResult, CommandSigner, CommandType, SignerError};
use tracing::{info, warn};

use super::correlator::ResponseCorrelator;
use crate::auth::{AuthorizationGate, Principal, RateLimiter};
use crate::config::IssuerConfig;
use crate::transport::{DeviceTransport, TransportError};

/// Runs the issuer half of a command from principal to result.
///
/// Each call suspends only its own caller; any number may be in flight.
pub struct CommandDispatcher {
    gate: AuthorizationGate,
    limiter: RateLimiter,
    signer: CommandSigner,
    transport: Arc<dyn DeviceTransport>,
    correlator: Arc<ResponseCorrelator>,
    timeout: Duration,
}

impl CommandDispatcher {
    pub fn new(
        gate: AuthorizationGate,
        limiter: RateLimiter,
        signer: CommandSigner,
        transport: Arc<dyn DeviceTransport>,
        correlator: Arc<ResponseCorrelator>,
        timeout: Duration,
    ) -> Self {
        Self {
            gate,
            limiter,
            signer,
            transport,
            correlator,
            timeout,
        }
    }

    pub fn from_config(
        config: &IssuerConfig,
        transport: Arc<dyn DeviceTransport>,
        correlator: Arc<ResponseCorrelator>,
    ) -> Result<Self, SignerError> {
        let signer = CommandSigner::new(config.secret.as_ref().map(|s| s.expose()))?;
        Ok(Self::new(
            AuthorizationGate::from_config(config),
            RateLimiter::per_minute(config.max_commands_per_minute),
            signer,
            transport,
            correlator,
            config.command_timeout(),
        ))
    }

    /// Whether `principal` passes the allow-lists
    pub fn is_authorized(&self, principal: &Principal) -> bool {
        self.gate.is_allowed(principal)
    }

    /// Submit `command` for `alias` on behalf of `principal`.
    ///
    /// Authorization and rate limiting happen before an envelope exists, so a
    /// denied principal never causes network traffic.
    pub async fn submit(
        &self,
        principal: &Principal,
        command: CommandType,
        alias: &str,
    ) -> Result<CommandResult, CommandError> {
        if !self.gate.check(principal, true) {
            warn!(principal = %principal.id, %command, alias, "Unauthorized command");
            return Err(CommandError::Unauthorized);
        }
        if !self.limiter.try_acquire(&principal.id).await {
            warn!(principal = %principal.id, %command, alias, "Rate limited");
            return Err(CommandError::RateLimited);
        }

        let envelope = self.signer.sign(command, alias);
        let command_id = envelope.command_id;
        let receipt = self.correlator.register(&envelope, self.timeout).await;

        info!(%command_id, principal = %principal.id, %command, alias, "Sending command");

        if let Err(e) = self.transport.deliver(&envelope).await {
            self.correlator.cancel(command_id).await;
            match &e {
                TransportError::Unreachable(_) => {
                    info!(%command_id, alias, "Device not connected")
                }
                TransportError::Delivery { .. } => warn!(%command_id, "{}", e),
            }
            return Err(CommandError::Unreachable(alias.to_string()));
        }

        let outcome = self.correlator.wait(receipt).await;
        match &outcome {
            Ok(result) => info!(%command_id, success = result.success, "Command completed"),
            Err(e) => warn!(%command_id, "Command failed: {}", e),
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use remotectl_shared::{CommandEnvelope, CommandResponse};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const SECRET: &str = "dispatcher-secret";

    /// Records deliveries and optionally answers them
    #[derive(Default)]
    struct FakeTransport {
        delivered: AtomicUsize,
        unreachable: bool,
        responder: Option<(Arc<ResponseCorrelator>, CommandResult)>,
    }

    #[async_trait]
    impl DeviceTransport for FakeTransport {
        async fn deliver(&self, envelope: &CommandEnvelope) -> Result<(), TransportError> {
            if self.unreachable {
                return Err(TransportError::Unreachable(envelope.target_alias.clone()));
            }
            self.delivered.fetch_add(1, Ordering::SeqCst);

            if let Some((correlator, result)) = &self.responder {
                let correlator = correlator.clone();
                let response = CommandResponse::new(envelope.command_id, result.clone());
                let alias = envelope.target_alias.clone();
                tokio::spawn(async move {
                    correlator.resolve(&alias, response).await;
                });
            }
            Ok(())
        }
    }

    fn dispatcher(transport: Arc<FakeTransport>, correlator: Arc<ResponseCorrelator>) -> CommandDispatcher {
        CommandDispatcher::new(
            AuthorizationGate::new(
                ["U1".to_string()].into_iter().collect(),
                ["ops".to_string()].into_iter().collect(),
            ),
            RateLimiter::per_minute(3),
            CommandSigner::new(Some(SECRET)).unwrap(),
            transport,
            correlator,
            Duration::from_secs(30),
        )
    }

    fn answering(result: CommandResult) -> (Arc<FakeTransport>, Arc<ResponseCorrelator>) {
        let correlator = Arc::new(ResponseCorrelator::new());
        let transport = Arc::new(FakeTransport {
            responder: Some((correlator.clone(), result)),
            ..FakeTransport::default()
        });
        (transport, correlator)
    }

    #[tokio::test]
    async fn test_unauthorized_makes_no_network_call() {
        let (transport, correlator) = answering(CommandResult::completed("Screen locked"));
        let dispatcher = dispatcher(transport.clone(), correlator.clone());

        let outcome = dispatcher
            .submit(&Principal::new("U2"), CommandType::Lock, "beta")
            .await;

        assert_eq!(outcome, Err(CommandError::Unauthorized));
        assert_eq!(transport.delivered.load(Ordering::SeqCst), 0);
        assert_eq!(correlator.pending_count().await, 0);
    }

    #[tokio::test]
    async fn test_role_grants_access() {
        let (transport, correlator) = answering(CommandResult::completed("Pong"));
        let dispatcher = dispatcher(transport, correlator);

        let outcome = dispatcher
            .submit(&Principal::with_roles("U7", ["ops"]), CommandType::Ping, "alpha")
            .await
            .unwrap();
        assert_eq!(outcome.message, "Pong");
    }

    #[tokio::test]
    async fn test_device_failure_surfaces() {
        let (transport, correlator) = answering(CommandResult::failed("Failed to lock screen"));
        let dispatcher = dispatcher(transport, correlator);

        assert_eq!(
            dispatcher
                .submit(&Principal::new("U1"), CommandType::Lock, "alpha")
                .await,
            Err(CommandError::ExecutionFailed("Failed to lock screen".into()))
        );
    }

    #[tokio::test]
    async fn test_rejection_surfaces() {
        let (transport, correlator) = answering(CommandResult::rejected());
        let dispatcher = dispatcher(transport, correlator);

        assert_eq!(
            dispatcher
                .submit(&Principal::new("U1"), CommandType::Lock, "alpha")
                .await,
            Err(CommandError::Rejected)
        );
    }

    #[tokio::test]
    async fn test_unreachable_cleans_up() {
        let correlator = Arc::new(ResponseCorrelator::new());
        let transport = Arc::new(FakeTransport {
            unreachable: true,
            ..FakeTransport::default()
        });
        let dispatcher = dispatcher(transport, correlator.clone());

        assert_eq!(
            dispatcher
                .submit(&Principal::new("U1"), CommandType::Ping, "ghost")
                .await,
            Err(CommandError::Unreachable("ghost".into()))
        );
        assert_eq!(correlator.pending_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_device_times_out() {
        let correlator = Arc::new(ResponseCorrelator::new());
        let transport = Arc::new(FakeTransport::default());
        let dispatcher = dispatcher(transport.clone(), correlator.clone());

        assert_eq!(
            dispatcher
                .submit(&Principal::new("U1"), CommandType::Status, "alpha")
                .await,
            Err(CommandError::Timeout(Duration::from_secs(30)))
        );
        assert_eq!(transport.delivered.load(Ordering::SeqCst), 1);
        assert_eq!(correlator.pending_count().await, 0);
    }

    #[tokio::test]
    async fn test_rate_limit_per_principal() {
        let (transport, correlator) = answering(CommandResult::completed("Pong"));
        let dispatcher = dispatcher(transport.clone(), correlator);
        let principal = Principal::new("U1");

        for _ in 0..3 {
            assert!(dispatcher
                .submit(&principal, CommandType::Ping, "alpha")
                .await
                .is_ok());
        }
        assert_eq!(
            dispatcher.submit(&principal, CommandType::Ping, "alpha").await,
            Err(CommandError::RateLimited)
        );
        assert_eq!(transport.delivered.load(Ordering::SeqCst), 3);
    }
}
