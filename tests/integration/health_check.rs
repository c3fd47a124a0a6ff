//! Health probing: an unanswered probe tears the session down; answered
//! probes keep it alive.

use std::sync::Arc;
use std::time::Duration;

use redlink::{Connection, ConnectionConfig, Error, Operation};
use rl_test_utils::{MockServer, ServerAction, default_reply};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .try_init();
}

#[tokio::test]
async fn unanswered_probe_fails_the_run() {
    init_tracing();
    // The server swallows pings after the handshake.
    let server = MockServer::start_with(|args| match args.first().map(Vec::as_slice) {
        Some(b"PING") => ServerAction::Ignore,
        _ => default_reply(args),
    })
    .await
    .unwrap();

    let conn = Connection::new(ConnectionConfig {
        reconnect: false,
        health_check_interval: Duration::from_millis(50),
        health_check_timeout: Duration::from_millis(100),
        ..ConnectionConfig::default()
    });

    let err = conn.run(&server.endpoint()).await.unwrap_err();
    assert!(matches!(err, Error::HealthTimeout));
}

#[tokio::test]
async fn answered_probes_keep_the_session_alive() {
    init_tracing();
    let server = MockServer::start().await.unwrap();
    let conn = Arc::new(Connection::new(ConnectionConfig {
        reconnect: false,
        health_check_interval: Duration::from_millis(25),
        health_check_timeout: Duration::from_millis(200),
        ..ConnectionConfig::default()
    }));

    let run = {
        let conn = conn.clone();
        let endpoint = server.endpoint();
        tokio::spawn(async move { conn.run(&endpoint).await })
    };

    // Several probe intervals pass without the session failing.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!run.is_finished());

    conn.cancel(Operation::Run);
    assert!(run.await.unwrap().is_ok());
}
