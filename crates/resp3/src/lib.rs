//! resp3: RESP3 wire protocol -- framing, streaming parse, typed projection.
//!
//! This crate is the I/O-free protocol layer: it serializes command
//! pipelines into RESP3 framing and parses reply bytes into a pre-order
//! event stream projected into caller containers.  Driving a live
//! connection (pipelining, pushes, cancellation, reconnection) is the
//! job of the `redlink` crate on top.
//!
//! ```
//! use resp3::{adapt, Parser, ParseStatus, Request};
//!
//! let mut req = Request::new();
//! req.push("LRANGE", ("a", 0, -1));
//!
//! let mut items: Vec<String> = Vec::new();
//! let reply = b"*2\r\n$3\r\none\r\n$3\r\ntwo\r\n";
//! let mut parser = Parser::new();
//! let status = parser.consume(reply, &mut adapt(&mut items)).unwrap();
//! assert!(matches!(status, ParseStatus::Complete { .. }));
//! assert_eq!(items, ["one", "two"]);
//! ```

mod adapter;
mod error;
mod kind;
mod node;
mod parser;
mod request;

pub use adapter::{
    Adapt, Adapter, Event, FromPayload, Ignore, KeySet, KeyValueMap, ListAdapter, MapAdapter,
    NodeAdapter, NodesAdapter, OptionalAdapter, Sequence, SeqAdapter, SetAdapter, SimpleAdapter,
    adapt, replay,
};
pub use error::Error;
pub use kind::DataKind;
pub use node::{Node, Tree};
pub use parser::{ParseStatus, Parser};
pub use request::{Args, RangeItem, Request, RequestConfig, ToBulk, add_bulk, add_header};
