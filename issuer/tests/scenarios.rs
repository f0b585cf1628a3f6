//! End-to-end runs over loopback TCP: chat in, signed envelope out, device
//! agent verifies and executes, response correlated back into a reply.

use std::sync::Arc;
use std::time::Duration;

use device_agent::config::{AgentConfig, PolicyConfig};
use device_agent::system::DryRunSession;
use issuer::auth::Principal;
use issuer::config::IssuerConfig;
use issuer::Issuer;
use remotectl_shared::Secret;
use tokio::net::TcpListener;

const SECRET: &str = "scenario-shared-secret";

async fn start_issuer() -> Issuer {
    let config = IssuerConfig {
        listen_address: "127.0.0.1:0".into(),
        secret: Some(Secret::new(SECRET)),
        allowed_principals: ["U1".to_string()].into_iter().collect(),
        allowed_roles: ["ops".to_string()].into_iter().collect(),
        command_timeout_secs: 5,
        max_commands_per_minute: 100,
        ..IssuerConfig::default()
    };
    let listener = TcpListener::bind(&config.listen_address).await.unwrap();
    Issuer::start_with_listener(&config, listener).unwrap()
}

/// Connect an agent for `alias` and wait until the issuer has its session
async fn start_agent(issuer: &Issuer, alias: &str, secret: &str) -> Arc<DryRunSession> {
    let config = AgentConfig {
        alias: alias.into(),
        issuer_address: issuer.local_addr.to_string(),
        secret: Some(Secret::new(secret)),
        dry_run: true,
        reconnect_delay_ms: 50,
        policy: PolicyConfig {
            remote_commands_enabled: true,
            ..PolicyConfig::default()
        },
        ..AgentConfig::default()
    };

    let session = Arc::new(DryRunSession::new());
    device_agent::spawn(&config, session.clone()).unwrap();

    for _ in 0..100 {
        if issuer.sessions.get(alias).await.is_some() {
            return session;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("agent {} never registered", alias);
}

async fn say(issuer: &Issuer, principal: &Principal, text: &str) -> String {
    issuer
        .chat
        .handle(principal, text)
        .await
        .expect("command should produce a reply")
}

#[tokio::test]
async fn ping_from_allowed_principal_reports_online() {
    let issuer = start_issuer().await;
    start_agent(&issuer, "alpha", SECRET).await;

    let reply = say(&issuer, &Principal::new("U1"), "!ping alpha").await;
    assert_eq!(reply, "alpha is online");
    assert_eq!(issuer.correlator.pending_count().await, 0);
}

#[tokio::test]
async fn unlisted_principal_cannot_lock() {
    let issuer = start_issuer().await;
    let beta = start_agent(&issuer, "beta", SECRET).await;

    let reply = say(&issuer, &Principal::new("U2"), "!lock beta").await;
    assert_eq!(reply, "You are not authorized to control devices.");

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(beta.locks(), 0);
    assert_eq!(issuer.correlator.pending_count().await, 0);
}

#[tokio::test]
async fn role_member_can_lock() {
    let issuer = start_issuer().await;
    let beta = start_agent(&issuer, "beta", SECRET).await;

    let reply = say(&issuer, &Principal::with_roles("U5", ["ops"]), "!lock beta").await;
    assert_eq!(reply, "beta: Screen locked");
    assert_eq!(beta.locks(), 1);
}

#[tokio::test]
async fn logout_needs_confirmation_for_same_alias() {
    let issuer = start_issuer().await;
    let gamma = start_agent(&issuer, "gamma", SECRET).await;
    let delta = start_agent(&issuer, "delta", SECRET).await;
    let u1 = Principal::new("U1");

    let prompt = say(&issuer, &u1, "!logout gamma").await;
    assert!(prompt.contains("!confirm gamma"));

    let mismatch = say(&issuer, &u1, "!confirm delta").await;
    assert!(mismatch.contains("pending logout is for gamma"));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(gamma.logouts(), 0);
    assert_eq!(delta.logouts(), 0);

    let done = say(&issuer, &u1, "!confirm gamma").await;
    assert_eq!(done, "gamma: User logged out");
    assert_eq!(gamma.logouts(), 1);
    assert_eq!(delta.logouts(), 0);
}

#[tokio::test]
async fn unknown_device_is_unreachable() {
    let issuer = start_issuer().await;

    let reply = say(&issuer, &Principal::new("U1"), "!ping ghost").await;
    assert_eq!(reply, "ghost is offline or unknown.");
    assert_eq!(issuer.correlator.pending_count().await, 0);
}

#[tokio::test]
async fn device_with_other_secret_rejects() {
    let issuer = start_issuer().await;
    let rogue = start_agent(&issuer, "epsilon", "some-other-secret").await;

    let reply = say(&issuer, &Principal::new("U1"), "!lock epsilon").await;
    assert_eq!(reply, "epsilon rejected the command.");
    assert_eq!(rogue.locks(), 0);
}

#[tokio::test]
async fn status_reports_device_facts() {
    let issuer = start_issuer().await;
    start_agent(&issuer, "alpha", SECRET).await;
    let u1 = Principal::new("U1");

    say(&issuer, &u1, "!ping alpha").await;
    let reply = say(&issuer, &u1, "!status alpha").await;

    assert!(reply.starts_with("alpha: "), "{}", reply);
    assert!(reply.contains(std::env::consts::OS), "{}", reply);
    assert!(reply.contains("1 commands (0 failed)"), "{}", reply);
}

#[tokio::test]
async fn concurrent_commands_resolve_independently() {
    let issuer = start_issuer().await;
    let alpha = start_agent(&issuer, "alpha", SECRET).await;
    start_agent(&issuer, "beta", SECRET).await;
    let u1 = Principal::new("U1");

    let messages = [
        "!ping alpha",
        "!ping beta",
        "!lock alpha",
        "!ping alpha",
        "!lock alpha",
        "!ping beta",
    ];
    let replies = futures::future::join_all(
        messages.iter().map(|text| issuer.chat.handle(&u1, text)),
    )
    .await;

    let replies: Vec<String> = replies.into_iter().map(Option::unwrap).collect();
    assert_eq!(
        replies,
        vec![
            "alpha is online",
            "beta is online",
            "alpha: Screen locked",
            "alpha is online",
            "alpha: Screen locked",
            "beta is online",
        ]
    );
    assert_eq!(alpha.locks(), 2);
    assert_eq!(issuer.correlator.pending_count().await, 0);
}

#[tokio::test]
async fn reaped_device_reconnects_and_stays_routable() {
    let issuer = start_issuer().await;
    start_agent(&issuer, "alpha", SECRET).await;
    let first = issuer.sessions.get("alpha").await.unwrap().connection_id;

    // A stall longer than the heartbeat timeout, with the socket still up
    let reaped = issuer.sessions.remove_dead_sessions(Duration::ZERO).await;
    assert_eq!(reaped, vec!["alpha".to_string()]);

    let mut reconnected = None;
    for _ in 0..200 {
        match issuer.sessions.get("alpha").await {
            Some(handle) if handle.connection_id != first => {
                reconnected = Some(handle.connection_id);
                break;
            }
            _ => tokio::time::sleep(Duration::from_millis(20)).await,
        }
    }
    assert!(reconnected.is_some(), "agent never registered again");

    let reply = say(&issuer, &Principal::new("U1"), "!ping alpha").await;
    assert_eq!(reply, "alpha is online");
}
