//! Server pushes route to `receive`, never to the request at the queue
//! head, and only interleave at reply boundaries.

use std::sync::Arc;
use std::time::Duration;

use redlink::{Connection, ConnectionConfig, Error, Operation, Request, Tree};
use rl_test_utils::{MockServer, ServerAction, default_reply};

const PUSH_FRAME: &[u8] = b">3\r\n$7\r\nmessage\r\n$7\r\nchannel\r\n$5\r\nhello\r\n";

fn test_config() -> ConnectionConfig {
    ConnectionConfig {
        reconnect: false,
        health_check_interval: Duration::ZERO,
        ..ConnectionConfig::default()
    }
}

#[tokio::test]
async fn push_goes_to_receive_not_to_the_request() {
    // The server slips a push frame in front of the PING reply.
    let server = MockServer::start_with(|args| match args.first().map(Vec::as_slice) {
        Some(b"PING") => {
            let mut bytes = PUSH_FRAME.to_vec();
            bytes.extend_from_slice(b"+PONG\r\n");
            ServerAction::Reply(bytes)
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

    let mut req = Request::new();
    req.push("PING", ());
    let mut resp: (String,) = Default::default();
    conn.exec(&req, &mut resp).await.unwrap();
    // The request saw only its own reply.
    assert_eq!(resp.0, "PONG");

    // The push is waiting on the side channel, projectable like any flat
    // aggregate.
    let mut push: Vec<String> = Vec::new();
    let bytes = conn.receive(&mut push).await.unwrap();
    assert_eq!(push, ["message", "channel", "hello"]);
    assert_eq!(bytes, PUSH_FRAME.len());

    conn.cancel(Operation::Run);
    assert!(run.await.unwrap().is_ok());
}

#[tokio::test]
async fn push_projects_into_a_tree_with_kinds() {
    let server = MockServer::start_with(|args| match args.first().map(Vec::as_slice) {
        Some(b"PING") => {
            let mut bytes = PUSH_FRAME.to_vec();
            bytes.extend_from_slice(b"+PONG\r\n");
            ServerAction::Reply(bytes)
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

    let mut req = Request::new();
    req.push("PING", ());
    conn.exec(&req, &mut ()).await.unwrap();

    let mut push = Tree::new();
    conn.receive(&mut push).await.unwrap();
    let root = push.root().unwrap();
    assert_eq!(root.kind, redlink::DataKind::Push);
    assert_eq!(root.aggregate_size, 3);
    assert_eq!(push.nodes().len(), 4);

    conn.cancel(Operation::Run);
    assert!(run.await.unwrap().is_ok());
}

#[tokio::test]
async fn cancel_receive_wakes_the_waiter() {
    let conn = Arc::new(Connection::new(test_config()));

    let mut push = Tree::new();
    let receive = conn.receive(&mut push);
    let canceller = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        conn.cancel(Operation::Receive);
    };

    let (result, ()) = tokio::join!(receive, canceller);
    assert!(matches!(result, Err(Error::OperationCancelled)));
}
