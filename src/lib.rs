//! redlink: an async RESP3 client over one long-lived connection.
//!
//! Requests are serialized by the [`resp3`] protocol crate, pipelined
//! through an ordered queue with coalesced writes, and answered in
//! submission order; server pushes arrive out of band through
//! [`Connection::receive`].  The engine handshakes, health-checks, and
//! reconnects on its own -- see [`Connection`] for the full surface and
//! [`ConnectionConfig`] for the knobs.

mod config;
mod connection;
mod engine;
mod error;
mod queue;
mod response;

pub use config::ConnectionConfig;
pub use connection::{Connection, ConnectionState, Operation};
pub use error::Error;
pub use response::Response;

// The protocol layer, also usable on its own.
pub use resp3;
pub use resp3::{Adapt, DataKind, Node, Request, Tree, adapt};
