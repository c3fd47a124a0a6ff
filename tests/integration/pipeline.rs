//! Pipelined submissions against the mock server: ordering, coalesced
//! batches, and per-command projection.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use redlink::{Connection, ConnectionConfig, Error, Operation, Request};
use rl_test_utils::{MockServer, ServerAction, default_reply};

fn test_config() -> ConnectionConfig {
    ConnectionConfig {
        reconnect: false,
        health_check_interval: Duration::ZERO,
        ..ConnectionConfig::default()
    }
}

fn spawn_run(
    conn: &Arc<Connection>,
    server: &MockServer,
) -> tokio::task::JoinHandle<Result<(), Error>> {
    let conn = conn.clone();
    let endpoint = server.endpoint();
    tokio::spawn(async move { conn.run(&endpoint).await })
}

#[tokio::test]
async fn pipelined_requests_complete_in_submission_order() {
    let server = MockServer::start().await.unwrap();
    let conn = Arc::new(Connection::new(test_config()));
    let run = spawn_run(&conn, &server);

    let completions = Arc::new(AtomicUsize::new(0));

    let mut req1 = Request::new();
    req1.push("PING", ());
    let mut resp1: (String,) = Default::default();

    let mut req2 = Request::new();
    req2.push("PING", ());
    let mut resp2: (String,) = Default::default();

    // Both futures are polled together; the first submission must settle
    // first.
    let first = async {
        conn.exec(&req1, &mut resp1).await.unwrap();
        completions.fetch_add(1, Ordering::SeqCst)
    };
    let second = async {
        conn.exec(&req2, &mut resp2).await.unwrap();
        completions.fetch_add(1, Ordering::SeqCst)
    };
    let (rank1, rank2) = tokio::join!(first, second);

    assert_eq!(resp1.0, "PONG");
    assert_eq!(resp2.0, "PONG");
    assert!(rank1 < rank2, "second submission settled first");

    conn.cancel(Operation::Run);
    assert!(run.await.unwrap().is_ok());
}

#[tokio::test]
async fn tuple_response_projects_each_command() {
    let server = MockServer::start_with(|args| match args.first().map(Vec::as_slice) {
        Some(b"LRANGE") => ServerAction::Reply(b"*2\r\n$3\r\none\r\n$3\r\ntwo\r\n".to_vec()),
        Some(b"HGETALL") => {
            ServerAction::Reply(b"%2\r\n$3\r\nkey\r\n$3\r\nval\r\n$1\r\na\r\n$1\r\nb\r\n".to_vec())
        }
        _ => default_reply(args),
    })
    .await
    .unwrap();
    let conn = Arc::new(Connection::new(test_config()));
    let run = spawn_run(&conn, &server);

    let mut req = Request::new();
    req.push("LRANGE", ("list", 0, -1));
    req.push("HGETALL", ("hash",));
    req.push("QUIT", ());

    let mut resp: (Vec<String>, HashMap<String, String>, ()) = Default::default();
    let bytes = conn.exec(&req, &mut resp).await.unwrap();

    assert_eq!(resp.0, ["one", "two"]);
    assert_eq!(resp.1.len(), 2);
    assert_eq!(resp.1["key"], "val");
    assert_eq!(resp.1["a"], "b");
    assert!(bytes > 0);

    conn.cancel(Operation::Run);
    assert!(run.await.unwrap().is_ok());
}

#[tokio::test]
async fn slot_count_must_match_command_count() {
    let conn = Connection::new(test_config());

    let mut req = Request::new();
    req.push("PING", ());
    req.push("PING", ());

    let mut resp: (String,) = Default::default();
    let err = conn.exec(&req, &mut resp).await.unwrap_err();
    assert!(matches!(err, Error::Resp3(resp3::Error::UnexpectedType(_))));
}

#[tokio::test]
async fn server_error_reply_surfaces_through_projection() {
    let server = MockServer::start_with(|args| match args.first().map(Vec::as_slice) {
        Some(b"GET") => ServerAction::Reply(b"-ERR wrong number of arguments\r\n".to_vec()),
        _ => default_reply(args),
    })
    .await
    .unwrap();
    let conn = Arc::new(Connection::new(test_config()));
    let run = spawn_run(&conn, &server);

    let mut req = Request::new();
    req.push("GET", ());
    let mut resp: (String,) = Default::default();
    let err = conn.exec(&req, &mut resp).await.unwrap_err();
    assert!(
        matches!(err, Error::Resp3(resp3::Error::Server(ref payload))
            if payload.starts_with(b"ERR")),
        "unexpected error: {err:?}"
    );

    conn.cancel(Operation::Run);
    assert!(run.await.unwrap().is_ok());
}

#[tokio::test]
async fn empty_request_completes_without_io() {
    let conn = Connection::new(test_config());
    let req = Request::new();
    let mut resp = ();
    assert_eq!(conn.exec(&req, &mut resp).await.unwrap(), 0);
}

#[tokio::test]
async fn cancel_if_not_connected_fails_fast() {
    let conn = Connection::new(test_config());

    let mut req = Request::new();
    req.push("PING", ());
    req.config_mut().cancel_if_not_connected = true;

    let mut resp = ();
    let err = conn.exec(&req, &mut resp).await.unwrap_err();
    assert!(matches!(err, Error::NotConnected));
}
