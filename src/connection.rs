//! The caller-facing connection handle.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use resp3::{Adapt, Request, replay};
use tokio::sync::{mpsc, watch};

use crate::config::ConnectionConfig;
use crate::engine::{self, PushMessage, Shared};
use crate::error::Error;
use crate::response::Response;

/// Lifecycle of the underlying transport, observable via
/// [`Connection::state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Draining,
}

/// Cancellation scopes accepted by [`Connection::cancel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Cancel pending `exec` submissions.  Staged requests fail at once;
    /// written requests are signalled now and their replies drained
    /// silently.  The connection stays usable.
    Exec,
    /// Tear the engine down: close the socket and fail every outstanding
    /// wait.  `run` returns.
    Run,
    /// Wake pending `receive` calls with `OperationCancelled`.
    Receive,
}

/// A client connection to one RESP3 server endpoint.
///
/// The connection is a passive handle until [`run`](Connection::run) drives
/// it; submissions made before (or between) sessions wait in the queue
/// unless their request opts into `cancel_if_not_connected`.  `run` performs
/// the protocol handshake, pipelines queued requests, routes server pushes
/// to [`receive`](Connection::receive), probes liveness, and reconnects
/// after failures when configured to.
///
/// ```no_run
/// use redlink::{Connection, ConnectionConfig, Request};
///
/// #[tokio::main]
/// async fn main() -> Result<(), redlink::Error> {
///     let conn = Connection::new(ConnectionConfig::default());
///
///     let mut req = Request::new();
///     req.push("PING", ());
///     let mut resp: (String,) = Default::default();
///
///     tokio::select! {
///         result = conn.run("127.0.0.1:6379") => result?,
///         result = conn.exec(&req, &mut resp) => {
///             result?;
///             println!("{}", resp.0);
///         }
///     }
///     Ok(())
/// }
/// ```
pub struct Connection {
    shared: Arc<Shared>,
    config: ConnectionConfig,
    push_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<PushMessage>>,
    running: AtomicBool,
}

impl Default for Connection {
    fn default() -> Connection {
        Connection::new(ConnectionConfig::default())
    }
}

impl Connection {
    pub fn new(config: ConnectionConfig) -> Connection {
        let (push_tx, push_rx) = mpsc::unbounded_channel();
        Connection {
            shared: Arc::new(Shared::new(push_tx)),
            config,
            push_rx: tokio::sync::Mutex::new(push_rx),
            running: AtomicBool::new(false),
        }
    }

    /// Drives the connection until `cancel(Run)` (returns `Ok`) or a fatal
    /// error with reconnection disabled.  At most one `run` may be active.
    pub async fn run(&self, endpoint: &str) -> Result<(), Error> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(Error::AlreadyRunning);
        }
        let _guard = RunGuard(&self.running);
        engine::run(self.shared.clone(), self.config.clone(), endpoint.to_owned()).await
    }

    /// Submits a request and projects its replies into `response`, one slot
    /// per command.  Resolves in submission order once every reply has
    /// arrived; returns the reply byte count.
    pub async fn exec<R: Response>(
        &self,
        request: &Request,
        response: &mut R,
    ) -> Result<usize, Error> {
        if request.is_empty() {
            return Ok(0);
        }
        if let Some(slots) = R::SLOTS
            && slots != request.command_count()
        {
            return Err(Error::Resp3(resp3::Error::UnexpectedType(format!(
                "response has {slots} slots but the request has {} commands",
                request.command_count()
            ))));
        }
        let rx = self.shared.submit(request)?;
        let outcome = rx.await.map_err(|_| Error::OperationCancelled)??;
        for (index, nodes) in outcome.replies.iter().enumerate() {
            response.apply(index, nodes)?;
        }
        Ok(outcome.bytes_read)
    }

    /// Awaits the next server push and projects it into `out`.  Pushes are
    /// delivered in arrival order; returns the push's byte count.
    ///
    /// Concurrent callers queue on an internal lock, so each push goes to
    /// exactly one receiver.
    pub async fn receive<T: Adapt>(&self, out: &mut T) -> Result<usize, Error> {
        // Subscribe first: a cancel arriving while we queue on the lock
        // must still wake us.
        let mut cancel_rx = self.shared.receive_cancel.subscribe();
        let mut push_rx = self.push_rx.lock().await;
        tokio::select! {
            message = push_rx.recv() => match message {
                Some(push) => {
                    replay(out, &push.nodes).map_err(Error::Resp3)?;
                    Ok(push.bytes_read)
                }
                None => Err(Error::OperationCancelled),
            },
            _ = cancel_rx.changed() => Err(Error::OperationCancelled),
        }
    }

    /// Cancels one scope; see [`Operation`].
    pub fn cancel(&self, operation: Operation) {
        match operation {
            Operation::Exec => {
                self.shared.lock_queue().cancel_exec();
                self.shared.write_ready.notify_one();
            }
            Operation::Run => self.shared.shutdown(),
            Operation::Receive => {
                self.shared.receive_cancel.send_modify(|generation| *generation += 1);
            }
        }
    }

    /// A watch over the transport lifecycle.
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.subscribe_state()
    }
}

struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
