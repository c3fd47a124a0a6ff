//! Multi-command response projection.
//!
//! A pipeline produces one reply per command; a [`Response`] distributes
//! those replies across per-command containers.  Tuples map positionally --
//! use `()` for commands whose reply does not matter:
//!
//! ```no_run
//! # use redlink::{Connection, ConnectionConfig, Request};
//! # use std::collections::HashMap;
//! # async fn example(conn: &Connection) -> Result<(), redlink::Error> {
//! let mut req = Request::new();
//! req.push("HGETALL", ("hset-key",));
//! req.push("QUIT", ());
//!
//! let mut resp: (HashMap<String, String>, ()) = Default::default();
//! conn.exec(&req, &mut resp).await?;
//! # Ok(())
//! # }
//! ```

use resp3::{Adapt, Node, replay};

use crate::error::Error;

/// A destination for the replies of a whole pipeline, one slot per command.
pub trait Response {
    /// Slot count, or `None` for sinks that accept any number of replies.
    const SLOTS: Option<usize>;

    /// Projects the reply of command `index` into its slot.
    fn apply(&mut self, index: usize, nodes: &[Node]) -> Result<(), Error>;
}

/// Ignores every reply; usable with pipelines of any length.
impl Response for () {
    const SLOTS: Option<usize> = None;

    fn apply(&mut self, _index: usize, _nodes: &[Node]) -> Result<(), Error> {
        Ok(())
    }
}

macro_rules! impl_response_tuple {
    ($len:expr; $($name:ident : $idx:tt),+) => {
        impl<$($name: Adapt),+> Response for ($($name,)+) {
            const SLOTS: Option<usize> = Some($len);

            fn apply(&mut self, index: usize, nodes: &[Node]) -> Result<(), Error> {
                match index {
                    $($idx => replay(&mut self.$idx, nodes)?,)+
                    _ => {
                        return Err(Error::Resp3(resp3::Error::UnexpectedType(
                            "more replies than response slots".to_owned(),
                        )));
                    }
                }
                Ok(())
            }
        }
    };
}

impl_response_tuple!(1; A: 0);
impl_response_tuple!(2; A: 0, B: 1);
impl_response_tuple!(3; A: 0, B: 1, C: 2);
impl_response_tuple!(4; A: 0, B: 1, C: 2, D: 3);
impl_response_tuple!(5; A: 0, B: 1, C: 2, D: 3, E: 4);
impl_response_tuple!(6; A: 0, B: 1, C: 2, D: 3, E: 4, F: 5);
impl_response_tuple!(7; A: 0, B: 1, C: 2, D: 3, E: 4, F: 5, G: 6);
impl_response_tuple!(8; A: 0, B: 1, C: 2, D: 3, E: 4, F: 5, G: 6, H: 7);
impl_response_tuple!(9; A: 0, B: 1, C: 2, D: 3, E: 4, F: 5, G: 6, H: 7, I: 8);
impl_response_tuple!(10; A: 0, B: 1, C: 2, D: 3, E: 4, F: 5, G: 6, H: 7, I: 8, J: 9);
impl_response_tuple!(11; A: 0, B: 1, C: 2, D: 3, E: 4, F: 5, G: 6, H: 7, I: 8, J: 9, K: 10);
impl_response_tuple!(12; A: 0, B: 1, C: 2, D: 3, E: 4, F: 5, G: 6, H: 7, I: 8, J: 9, K: 10, L: 11);
