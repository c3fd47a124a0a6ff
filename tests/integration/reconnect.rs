//! Reconnection: surviving requests replay on the next session, flagged
//! ones fail, and handshake rejection surfaces.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use redlink::{Connection, ConnectionConfig, Error, Operation, Request};
use rl_test_utils::{MockServer, ServerAction, default_reply};

fn reconnect_config() -> ConnectionConfig {
    ConnectionConfig {
        reconnect: true,
        reconnect_wait: Duration::from_millis(50),
        health_check_interval: Duration::ZERO,
        ..ConnectionConfig::default()
    }
}

#[tokio::test]
async fn written_request_replays_after_connection_drop() {
    // The first PING kills the connection; the replayed PING succeeds.
    let dropped_once = Arc::new(AtomicBool::new(false));
    let server = {
        let dropped_once = dropped_once.clone();
        MockServer::start_with(move |args| match args.first().map(Vec::as_slice) {
            Some(b"PING") if !dropped_once.swap(true, Ordering::SeqCst) => ServerAction::Close,
            _ => default_reply(args),
        })
        .await
        .unwrap()
    };

    let conn = Arc::new(Connection::new(reconnect_config()));
    let run = {
        let conn = conn.clone();
        let endpoint = server.endpoint();
        tokio::spawn(async move { conn.run(&endpoint).await })
    };

    let mut req = Request::new();
    req.push("PING", ());
    let mut resp: (String,) = Default::default();
    conn.exec(&req, &mut resp).await.unwrap();

    assert_eq!(resp.0, "PONG");
    assert_eq!(server.connection_count(), 2);

    conn.cancel(Operation::Run);
    assert!(run.await.unwrap().is_ok());
}

#[tokio::test]
async fn cancel_if_unresponsive_fails_instead_of_replaying() {
    let server = MockServer::start_with(|args| match args.first().map(Vec::as_slice) {
        Some(b"CRASH") => ServerAction::Close,
        _ => default_reply(args),
    })
    .await
    .unwrap();

    let conn = Arc::new(Connection::new(reconnect_config()));
    let run = {
        let conn = conn.clone();
        let endpoint = server.endpoint();
        tokio::spawn(async move { conn.run(&endpoint).await })
    };

    let mut req = Request::new();
    req.push("CRASH", ());
    req.config_mut().cancel_if_unresponsive = true;
    let mut resp = ();
    let err = conn.exec(&req, &mut resp).await.unwrap_err();
    assert!(matches!(err, Error::TransportLost(_)));

    // The engine reconnected regardless; the connection is usable again.
    let mut req = Request::new();
    req.push("PING", ());
    let mut resp: (String,) = Default::default();
    conn.exec(&req, &mut resp).await.unwrap();
    assert_eq!(resp.0, "PONG");
    assert!(server.connection_count() >= 2);

    conn.cancel(Operation::Run);
    assert!(run.await.unwrap().is_ok());
}

#[tokio::test]
async fn handshake_rejection_fails_run() {
    let server = MockServer::start_with(|args| match args.first().map(Vec::as_slice) {
        Some(b"HELLO") => {
            ServerAction::Reply(b"-ERR unknown command 'HELLO'\r\n".to_vec())
        }
        _ => default_reply(args),
    })
    .await
    .unwrap();

    let conn = Connection::new(ConnectionConfig {
        reconnect: false,
        health_check_interval: Duration::ZERO,
        ..ConnectionConfig::default()
    });

    let err = conn.run(&server.endpoint()).await.unwrap_err();
    assert!(matches!(err, Error::HandshakeFailed(ref reason) if reason.starts_with("ERR")));
}

#[tokio::test]
async fn connect_failure_without_reconnect_surfaces_transport_loss() {
    // Nothing listens here.
    let conn = Connection::new(ConnectionConfig {
        reconnect: false,
        health_check_interval: Duration::ZERO,
        ..ConnectionConfig::default()
    });
    let err = conn.run("127.0.0.1:1").await.unwrap_err();
    assert!(matches!(err, Error::TransportLost(_)));
}

#[tokio::test]
async fn run_is_exclusive_while_active() {
    let server = MockServer::start().await.unwrap();
    let conn = Arc::new(Connection::new(reconnect_config()));
    let run = {
        let conn = conn.clone();
        let endpoint = server.endpoint();
        tokio::spawn(async move { conn.run(&endpoint).await })
    };

    // Give the first run a moment to start.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let err = conn.run(&server.endpoint()).await.unwrap_err();
    assert!(matches!(err, Error::AlreadyRunning));

    conn.cancel(Operation::Run);
    assert!(run.await.unwrap().is_ok());
}
