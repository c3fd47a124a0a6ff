//! `cancel(Exec)` semantics with a slow command in flight: staged requests
//! fail at once, written requests are signalled but drained silently, and
//! the connection survives.

use std::sync::Arc;
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

#[tokio::test]
async fn cancel_exec_spares_the_connection() {
    // BLPOP blocks server-side for a while, then yields null -- long enough
    // for the cancellation to land first.
    let server = MockServer::start_with(|args| match args.first().map(Vec::as_slice) {
        Some(b"BLPOP") => {
            ServerAction::DelayedReply(Duration::from_millis(500), b"_\r\n".to_vec())
        }
        _ => default_reply(args),
    })
    .await
    .unwrap();

    let conn = Arc::new(Connection::new(test_config()));
    let run = {
        let conn = conn.clone();
        let endpoint = server.endpoint();
        tokio::spawn(async move { conn.run(&endpoint).await })
    };

    // In flight once written; its reply arrives only after the cancel.
    let mut req1 = Request::new();
    req1.push("BLPOP", ("any", 3));
    req1.config_mut().coalesce = false;

    // Stays staged behind req1's batch, so it is cancelled instantly.
    let mut req2 = Request::new();
    req2.push("PING", ());
    req2.config_mut().coalesce = false;

    let mut resp1 = ();
    let mut resp2 = ();
    let exec1 = conn.exec(&req1, &mut resp1);
    let exec2 = conn.exec(&req2, &mut resp2);
    let canceller = async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        conn.cancel(Operation::Exec);
    };

    let (result1, result2, ()) = tokio::join!(exec1, exec2, canceller);
    assert!(matches!(result1, Err(Error::OperationCancelled)));
    assert!(matches!(result2, Err(Error::OperationCancelled)));

    // The engine drains BLPOP's eventual reply to keep the stream aligned,
    // then the connection keeps working.
    let mut req3 = Request::new();
    req3.push("QUIT", ());
    let mut resp3: (String,) = Default::default();
    conn.exec(&req3, &mut resp3).await.unwrap();
    assert_eq!(resp3.0, "OK");

    conn.cancel(Operation::Run);
    assert!(run.await.unwrap().is_ok());
}

#[tokio::test]
async fn cancel_run_fails_every_outstanding_wait() {
    let server = MockServer::start_with(|args| match args.first().map(Vec::as_slice) {
        Some(b"BLPOP") => ServerAction::DelayedReply(Duration::from_secs(5), b"_\r\n".to_vec()),
        _ => default_reply(args),
    })
    .await
    .unwrap();

    let conn = Arc::new(Connection::new(test_config()));
    let run = {
        let conn = conn.clone();
        let endpoint = server.endpoint();
        tokio::spawn(async move { conn.run(&endpoint).await })
    };

    let mut req = Request::new();
    req.push("BLPOP", ("any", 0));
    let mut resp = ();
    let exec = conn.exec(&req, &mut resp);
    let canceller = async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        conn.cancel(Operation::Run);
    };

    let (result, ()) = tokio::join!(exec, canceller);
    assert!(matches!(result, Err(Error::OperationCancelled)));
    assert!(run.await.unwrap().is_ok());

    // The engine is gone for good: later submissions fail immediately.
    let mut req = Request::new();
    req.push("PING", ());
    let mut resp = ();
    assert!(matches!(
        conn.exec(&req, &mut resp).await,
        Err(Error::OperationCancelled)
    ));
}
