// mock_server: A mock RESP3 server for testing the connection engine.
//
// Accepts TCP connections on 127.0.0.1:<port>, decodes commands with the
// real protocol parser, and answers each one from a caller-supplied script.
// Commands are processed strictly in order, so a delayed reply also delays
// everything pipelined behind it -- matching real server semantics.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bytes::{Buf, BytesMut};
use resp3::{NodesAdapter, ParseStatus, Parser};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// What the script wants done with one decoded command.
#[derive(Debug, Clone)]
pub enum ServerAction {
    /// Write these raw reply bytes.  Tests compose them freely, so a single
    /// action can also carry push frames or several replies.
    Reply(Vec<u8>),
    /// Wait, then write.  Replies to later pipelined commands queue behind
    /// the delay.
    DelayedReply(Duration, Vec<u8>),
    /// Swallow the command without answering.
    Ignore,
    /// Drop the connection.
    Close,
}

/// Stock behavior for the commands every session sends: a RESP3 hello map,
/// `+PONG` for pings, `+OK` otherwise.  Custom scripts usually fall back to
/// this for commands they do not care about.
pub fn default_reply(args: &[Vec<u8>]) -> ServerAction {
    match args.first().map(Vec::as_slice) {
        Some(b"HELLO") => ServerAction::Reply(
            b"%3\r\n$6\r\nserver\r\n$5\r\nredis\r\n$5\r\nproto\r\n:3\r\n\
              $4\r\nmode\r\n$10\r\nstandalone\r\n"
                .to_vec(),
        ),
        Some(b"PING") => ServerAction::Reply(b"+PONG\r\n".to_vec()),
        _ => ServerAction::Reply(b"+OK\r\n".to_vec()),
    }
}

type Script = dyn Fn(&[Vec<u8>]) -> ServerAction + Send + Sync;

/// A mock RESP3 server for integration testing.
///
/// Binds to port 0 (random) and exposes the actual bound address.  Each
/// test can spin up its own isolated server instance.  The script receives
/// each command's bulk arguments (command name first) and decides the
/// response.
pub struct MockServer {
    addr: SocketAddr,
    connections: Arc<AtomicUsize>,
    /// Handle to the background accept loop; dropped when the server is
    /// dropped.
    _task: tokio::task::JoinHandle<()>,
}

impl MockServer {
    /// Start the mock server with the stock script.
    pub async fn start() -> std::io::Result<MockServer> {
        MockServer::start_with(default_reply).await
    }

    /// Start the mock server, binding to a random available port.
    ///
    /// Returns immediately once the listener is bound.  Client connections
    /// are handled in a background tokio task (one spawned task per
    /// connection).
    pub async fn start_with<F>(script: F) -> std::io::Result<MockServer>
    where
        F: Fn(&[Vec<u8>]) -> ServerAction + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let connections = Arc::new(AtomicUsize::new(0));

        let script: Arc<Script> = Arc::new(script);
        let counter = connections.clone();
        let task = tokio::spawn(async move {
            Self::accept_loop(listener, script, counter).await;
        });

        Ok(MockServer {
            addr,
            connections,
            _task: task,
        })
    }

    /// The address the server is listening on, as a `host:port` string.
    pub fn endpoint(&self) -> String {
        self.addr.to_string()
    }

    /// Return the address the server is listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// How many connections have been accepted so far.
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    // -- internal --

    /// Accept loop: accepts TCP connections and spawns a handler per
    /// connection.
    async fn accept_loop(listener: TcpListener, script: Arc<Script>, counter: Arc<AtomicUsize>) {
        loop {
            match listener.accept().await {
                Ok((stream, _peer)) => {
                    counter.fetch_add(1, Ordering::SeqCst);
                    let script = script.clone();
                    tokio::spawn(async move {
                        // In tests, connection errors are expected (e.g.
                        // client drops).  Swallow silently.
                        let _ = Self::handle_connection(stream, script).await;
                    });
                }
                Err(_) => break,
            }
        }
    }

    /// Handle a single connection: decode one command at a time and apply
    /// the scripted action.
    async fn handle_connection(mut stream: TcpStream, script: Arc<Script>) -> std::io::Result<()> {
        let mut buf = BytesMut::with_capacity(4096);
        let mut parser = Parser::new();
        loop {
            let mut nodes = Vec::new();
            loop {
                match parser.consume(&buf, &mut NodesAdapter::new(&mut nodes)) {
                    Ok(ParseStatus::Complete { consumed }) => {
                        buf.advance(consumed);
                        break;
                    }
                    Ok(ParseStatus::NeedsMore { consumed }) => {
                        buf.advance(consumed);
                        let n = stream.read_buf(&mut buf).await?;
                        if n == 0 {
                            return Ok(());
                        }
                    }
                    // Malformed client input; drop the connection.
                    Err(_) => return Ok(()),
                }
            }
            // nodes[0] is the command array header; the bulks follow.
            let args: Vec<Vec<u8>> = nodes.iter().skip(1).map(|n| n.value.clone()).collect();
            match script(&args) {
                ServerAction::Reply(bytes) => stream.write_all(&bytes).await?,
                ServerAction::DelayedReply(delay, bytes) => {
                    tokio::time::sleep(delay).await;
                    stream.write_all(&bytes).await?;
                }
                ServerAction::Ignore => {}
                ServerAction::Close => return Ok(()),
            }
        }
    }
}
