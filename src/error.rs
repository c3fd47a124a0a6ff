/// Errors surfaced by the connection engine.
///
/// Wire-level kinds (protocol violations, projection mismatches, server
/// error replies) come wrapped from the protocol crate; the remaining kinds
/// are the engine's own lifecycle failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Resp3(#[from] resp3::Error),
    /// The connection died (I/O error, EOF, or failure to connect).
    #[error("connection lost: {0}")]
    TransportLost(String),
    /// The request asked to fail immediately while disconnected.
    #[error("not connected")]
    NotConnected,
    /// The awaited operation was cancelled.
    #[error("operation cancelled")]
    OperationCancelled,
    /// The server rejected the connection handshake.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),
    /// The health probe went unanswered past its deadline.
    #[error("health check timed out")]
    HealthTimeout,
    /// `run` was called while a previous `run` is still active.
    #[error("run is already active")]
    AlreadyRunning,
}
