use std::time::Duration;

/// Tunables for one [`Connection`](crate::Connection).
///
/// The defaults suit a long-lived connection to a nearby server; tests
/// shrink the intervals.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// How often the engine sends its health probe.  Zero disables the
    /// probe entirely.
    pub health_check_interval: Duration,
    /// How long a health probe may go unanswered before the connection is
    /// declared dead.
    pub health_check_timeout: Duration,
    /// Reconnect after a lost connection (replaying surviving requests),
    /// instead of returning the error from `run`.
    pub reconnect: bool,
    /// Pause between a disconnect and the next connection attempt.
    pub reconnect_wait: Duration,
    /// Soft cap on one coalesced write batch.  The batch stops growing past
    /// this size; a single oversized request still ships whole.
    pub max_coalesce_bytes: usize,
}

impl Default for ConnectionConfig {
    fn default() -> ConnectionConfig {
        ConnectionConfig {
            health_check_interval: Duration::from_secs(30),
            health_check_timeout: Duration::from_secs(90),
            reconnect: true,
            reconnect_wait: Duration::from_secs(1),
            max_coalesce_bytes: 64 * 1024,
        }
    }
}
