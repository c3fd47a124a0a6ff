//! The connection engine: connect/handshake/reconnect loop plus the writer,
//! reader, and health tasks of one session.
//!
//! Tasks share the request queue through [`Shared`] and report failure by
//! returning an error; the first failure (or a `cancel(Run)`) tears the
//! session down.  The queue then drains per entry policy and the loop
//! reconnects when configured to.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::{Buf, BytesMut};
use resp3::{DataKind, Node, NodesAdapter, ParseStatus, Parser, Request};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Notify, mpsc, oneshot, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::ConnectionConfig;
use crate::connection::ConnectionState;
use crate::error::Error;
use crate::queue::{ExecOutcome, RequestQueue};

/// One complete out-of-band push, ready for projection.
#[derive(Debug)]
pub(crate) struct PushMessage {
    pub nodes: Vec<Node>,
    pub bytes_read: usize,
}

/// State shared between the caller handle and the engine tasks.
pub(crate) struct Shared {
    queue: Mutex<RequestQueue>,
    /// Wakes the writer when the queue gains stageable bytes.
    pub write_ready: Notify,
    pub push_tx: mpsc::UnboundedSender<PushMessage>,
    state_tx: watch::Sender<ConnectionState>,
    shutdown_tx: watch::Sender<bool>,
    /// Bumped by `cancel(Receive)`; pending `receive` calls watch it.
    pub receive_cancel: watch::Sender<u64>,
}

impl Shared {
    pub(crate) fn new(push_tx: mpsc::UnboundedSender<PushMessage>) -> Shared {
        Shared {
            queue: Mutex::new(RequestQueue::new()),
            write_ready: Notify::new(),
            push_tx,
            state_tx: watch::Sender::new(ConnectionState::Disconnected),
            shutdown_tx: watch::Sender::new(false),
            receive_cancel: watch::Sender::new(0),
        }
    }

    pub(crate) fn lock_queue(&self) -> MutexGuard<'_, RequestQueue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    pub(crate) fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_replace(state);
    }

    pub(crate) fn is_shutdown(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// `cancel(Run)`: stops the engine and fails every outstanding wait.
    pub(crate) fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
        self.lock_queue().fail_all(&Error::OperationCancelled);
    }

    /// Stages a request and returns its completion signal.
    pub(crate) fn submit(
        &self,
        request: &Request,
    ) -> Result<oneshot::Receiver<Result<ExecOutcome, Error>>, Error> {
        if self.is_shutdown() {
            return Err(Error::OperationCancelled);
        }
        if request.config().cancel_if_not_connected && self.state() != ConnectionState::Connected {
            return Err(Error::NotConnected);
        }
        let (tx, rx) = oneshot::channel();
        self.lock_queue().stage(
            request.as_bytes().to_vec(),
            request.command_count(),
            *request.config(),
            tx,
        );
        self.write_ready.notify_one();
        Ok(rx)
    }
}

/// Aborts its task when dropped, so an abandoned `run` future cannot leak a
/// live socket.
struct Task(JoinHandle<Result<(), Error>>);

impl Drop for Task {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// The engine main loop, awaited by `Connection::run`.
pub(crate) async fn run(
    shared: Arc<Shared>,
    config: ConnectionConfig,
    endpoint: String,
) -> Result<(), Error> {
    let mut shutdown_rx = shared.shutdown_tx.subscribe();
    loop {
        if *shutdown_rx.borrow() {
            shared.lock_queue().fail_all(&Error::OperationCancelled);
            shared.set_state(ConnectionState::Disconnected);
            return Ok(());
        }
        shared.set_state(ConnectionState::Connecting);
        let connected = tokio::select! {
            result = TcpStream::connect(&endpoint) => result,
            _ = shutdown_rx.changed() => {
                shared.set_state(ConnectionState::Disconnected);
                return Ok(());
            }
        };
        let stream = match connected {
            Ok(stream) => stream,
            Err(e) => {
                warn!(%endpoint, error = %e, "connect failed");
                let error = Error::TransportLost(e.to_string());
                shared.lock_queue().drain_on_disconnect(&error, false);
                if !config.reconnect {
                    shared.lock_queue().fail_all(&error);
                    shared.set_state(ConnectionState::Disconnected);
                    return Err(error);
                }
                if !wait_reconnect(&config, &mut shutdown_rx).await {
                    shared.set_state(ConnectionState::Disconnected);
                    return Ok(());
                }
                continue;
            }
        };
        if let Err(e) = stream.set_nodelay(true) {
            debug!(error = %e, "set_nodelay failed");
        }
        info!(%endpoint, "connected");

        // Handshake goes to the queue front so it is the first request on
        // the wire, ahead of anything staged or replayed.
        let mut hello = Request::new();
        hello.push("HELLO", (3,));
        hello.config_mut().coalesce = false;
        hello.config_mut().cancel_if_unresponsive = true;
        let (hello_tx, hello_rx) = oneshot::channel();
        shared.lock_queue().stage_front(
            hello.as_bytes().to_vec(),
            hello.command_count(),
            *hello.config(),
            hello_tx,
        );

        shared.set_state(ConnectionState::Connected);
        shared.write_ready.notify_one();

        let (rd, wr) = stream.into_split();
        let mut writer = Task(tokio::spawn(write_loop(
            wr,
            shared.clone(),
            config.max_coalesce_bytes,
        )));
        let mut reader = Task(tokio::spawn(read_loop(rd, shared.clone())));
        let mut health = Task(tokio::spawn(health_loop(shared.clone(), config.clone())));
        let mut handshake = Task(tokio::spawn(handshake_watch(hello_rx)));

        let session_error = tokio::select! {
            result = &mut writer.0 => task_error(result),
            result = &mut reader.0 => task_error(result),
            result = &mut health.0 => task_error(result),
            result = &mut handshake.0 => task_error(result),
            _ = shutdown_rx.changed() => Error::OperationCancelled,
        };
        // Dropping the tasks aborts them and closes both socket halves.
        drop((writer, reader, health, handshake));

        shared.set_state(ConnectionState::Draining);
        // A task failure can win the select race against the shutdown
        // signal; honor the shutdown either way.
        let cancelled =
            matches!(session_error, Error::OperationCancelled) || shared.is_shutdown();
        // After a framing violation the stream position is unknowable, so
        // replies owed to written entries are lost for good.
        let written_fatal = matches!(session_error, Error::Resp3(resp3::Error::Protocol { .. }));
        {
            let mut queue = shared.lock_queue();
            if cancelled {
                queue.fail_all(&session_error);
            } else {
                queue.drain_on_disconnect(&session_error, written_fatal);
            }
        }
        shared.set_state(ConnectionState::Disconnected);

        if cancelled {
            info!("run cancelled");
            return Ok(());
        }
        warn!(error = %session_error, "session ended");
        if !config.reconnect {
            // No session will ever service the survivors.
            shared.lock_queue().fail_all(&session_error);
            return Err(session_error);
        }
        if !wait_reconnect(&config, &mut shutdown_rx).await {
            return Ok(());
        }
    }
}

/// Sleeps out the reconnect pause; false when shutdown arrives first.
async fn wait_reconnect(
    config: &ConnectionConfig,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> bool {
    tokio::select! {
        () = tokio::time::sleep(config.reconnect_wait) => true,
        _ = shutdown_rx.changed() => false,
    }
}

fn task_error(result: Result<Result<(), Error>, JoinError>) -> Error {
    match result {
        Ok(Ok(())) => Error::TransportLost("engine task exited".to_owned()),
        Ok(Err(e)) => e,
        Err(e) if e.is_cancelled() => Error::OperationCancelled,
        Err(e) => Error::TransportLost(e.to_string()),
    }
}

/// Flushes coalesced batches; at most one write in flight.
async fn write_loop(
    mut wr: OwnedWriteHalf,
    shared: Arc<Shared>,
    max_batch: usize,
) -> Result<(), Error> {
    loop {
        let notified = shared.write_ready.notified();
        let batch = shared.lock_queue().front_to_write(max_batch);
        match batch {
            Some(bytes) => {
                wr.write_all(&bytes)
                    .await
                    .map_err(|e| Error::TransportLost(e.to_string()))?;
                debug!(len = bytes.len(), "request batch flushed");
            }
            None => notified.await,
        }
    }
}

enum Route {
    Head,
    Push,
}

/// Reads the socket, parses reply by reply, and routes each completed reply
/// to the queue head or the push channel.
async fn read_loop(mut rd: OwnedReadHalf, shared: Arc<Shared>) -> Result<(), Error> {
    let mut buf = BytesMut::with_capacity(8 * 1024);
    let mut parser = Parser::new();
    let mut nodes: Vec<Node> = Vec::new();
    let mut route: Option<Route> = None;
    let mut reply_bytes = 0usize;
    loop {
        while !buf.is_empty() {
            if route.is_none() {
                // A fresh reply: the leading discriminant decides where it
                // goes.  Pushes may only interleave at reply boundaries.
                let is_push = Parser::peek_kind(&buf) == Some(DataKind::Push);
                if !is_push && !shared.lock_queue().has_head_awaiting() {
                    return Err(Error::Resp3(resp3::Error::Protocol {
                        offset: 0,
                        message: "reply without a pending request".to_owned(),
                    }));
                }
                route = Some(if is_push { Route::Push } else { Route::Head });
                nodes.clear();
                reply_bytes = 0;
            }
            let status = parser.consume(&buf, &mut NodesAdapter::new(&mut nodes))?;
            match status {
                ParseStatus::NeedsMore { consumed } => {
                    buf.advance(consumed);
                    reply_bytes += consumed;
                    break;
                }
                ParseStatus::Complete { consumed } => {
                    buf.advance(consumed);
                    reply_bytes += consumed;
                    let attributes = parser.take_attributes();
                    if !attributes.is_empty() {
                        debug!(nodes = attributes.len(), "discarding reply attributes");
                    }
                    match route.take() {
                        Some(Route::Push) => {
                            let _ = shared.push_tx.send(PushMessage {
                                nodes: std::mem::take(&mut nodes),
                                bytes_read: reply_bytes,
                            });
                        }
                        Some(Route::Head) | None => {
                            shared
                                .lock_queue()
                                .advance_command(std::mem::take(&mut nodes), reply_bytes);
                            // The head may have drained, unblocking the next
                            // write batch.
                            shared.write_ready.notify_one();
                        }
                    }
                }
            }
        }
        let n = rd
            .read_buf(&mut buf)
            .await
            .map_err(|e| Error::TransportLost(e.to_string()))?;
        if n == 0 {
            return Err(Error::TransportLost("connection closed by peer".to_owned()));
        }
    }
}

/// Periodic liveness probe.  Any completion before the deadline counts; an
/// unanswered probe kills the session.
async fn health_loop(shared: Arc<Shared>, config: ConnectionConfig) -> Result<(), Error> {
    if config.health_check_interval.is_zero() {
        std::future::pending::<()>().await;
        return Ok(());
    }
    let mut ticker = tokio::time::interval(config.health_check_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; the probe starts one interval in.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let mut probe = Request::new();
        probe.push("PING", ());
        probe.config_mut().coalesce = false;
        probe.config_mut().cancel_if_unresponsive = true;
        let rx = shared.submit(&probe)?;
        match tokio::time::timeout(config.health_check_timeout, rx).await {
            Ok(_completion) => debug!("health probe answered"),
            Err(_) => {
                warn!(timeout = ?config.health_check_timeout, "health probe unanswered");
                return Err(Error::HealthTimeout);
            }
        }
    }
}

/// Watches the handshake reply; parks once the session is established.
///
/// Only a server error reply fails the session here -- transport loss and
/// cancellation already surface through the reader and writer.
async fn handshake_watch(
    rx: oneshot::Receiver<Result<ExecOutcome, Error>>,
) -> Result<(), Error> {
    if let Ok(Ok(outcome)) = rx.await {
        let root = outcome.replies.first().and_then(|nodes| nodes.first());
        if let Some(node) = root
            && matches!(node.kind, DataKind::SimpleError | DataKind::BlobError)
        {
            return Err(Error::HandshakeFailed(
                String::from_utf8_lossy(&node.value).into_owned(),
            ));
        }
        debug!("handshake complete");
    }
    std::future::pending::<()>().await;
    Ok(())
}
