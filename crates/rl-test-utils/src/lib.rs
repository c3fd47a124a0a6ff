//! rl-test-utils: scriptable in-process RESP3 server for integration tests.

mod mock_server;

pub use mock_server::{MockServer, ServerAction, default_reply};
