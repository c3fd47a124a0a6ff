//! Streaming RESP3 reply parser.
//!
//! The parser consumes bytes incrementally and emits a pre-order sequence of
//! typed events into an [`Adapter`].  It never consumes a partial line or
//! payload: when the buffer ends mid-element it reports how many bytes it
//! did take and resumes from the same state on the next call, so feeding a
//! reply in arbitrary chunks yields the same events as feeding it whole.
//!
//! Attribute elements (`|`) are transparent side metadata: their subtree is
//! collected into parser-owned storage (see [`Parser::take_attributes`]) and
//! never delivered to the primary adapter, nor counted against the
//! surrounding reply.

use crate::adapter::{Adapter, Event};
use crate::error::Error;
use crate::kind::DataKind;
use crate::node::Node;

/// Outcome of one [`Parser::consume`] call.
///
/// `consumed` is the number of leading buffer bytes the parser took; the
/// caller must drain exactly that many before the next call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStatus {
    /// The reply is incomplete; read more bytes and call again.
    NeedsMore { consumed: usize },
    /// One full reply has been delivered to the adapter.
    Complete { consumed: usize },
}

#[derive(Debug)]
struct Frame {
    remaining: usize,
}

#[derive(Debug, Clone, Copy)]
enum Cursor {
    /// Expecting a `\r\n`-terminated type line.
    Line,
    /// Expecting `len` payload bytes plus the trailing `\r\n`.
    BulkBody { kind: DataKind, len: usize },
    /// Expecting `len` streamed-chunk bytes plus the trailing `\r\n`.
    StreamedBody { len: usize },
}

/// A resumable parser for one reply at a time.
///
/// After [`ParseStatus::Complete`] the parser is ready for the next reply.
/// A returned error leaves the stream unrecoverable; call [`Parser::reset`]
/// only after discarding the connection's read state.
#[derive(Debug)]
pub struct Parser {
    stack: Vec<Frame>,
    attr_stack: Vec<Frame>,
    cursor: Cursor,
    streamed: Option<Vec<u8>>,
    attributes: Vec<Node>,
    offset: u64,
}

impl Default for Parser {
    fn default() -> Parser {
        Parser::new()
    }
}

impl Parser {
    pub fn new() -> Parser {
        Parser {
            stack: Vec::new(),
            attr_stack: Vec::new(),
            cursor: Cursor::Line,
            streamed: None,
            attributes: Vec::new(),
            offset: 0,
        }
    }

    /// Discards all parse state, including the stream offset.
    pub fn reset(&mut self) {
        *self = Parser::new();
    }

    /// True when no reply is partially parsed.
    pub fn at_reply_boundary(&self) -> bool {
        self.stack.is_empty()
            && self.attr_stack.is_empty()
            && self.streamed.is_none()
            && matches!(self.cursor, Cursor::Line)
    }

    /// The kind a buffer's next reply starts with, judged by its leading
    /// discriminant byte.  Only meaningful at a reply boundary.
    pub fn peek_kind(buf: &[u8]) -> Option<DataKind> {
        buf.first().map(|b| DataKind::from_code(*b))
    }

    /// Side-collected attribute nodes of the replies parsed so far.
    pub fn take_attributes(&mut self) -> Vec<Node> {
        std::mem::take(&mut self.attributes)
    }

    /// Feeds bytes to the parser, delivering events to `adapter`.
    ///
    /// Returns how many bytes were taken and whether the reply completed.
    /// Unconsumed bytes must be presented again on the next call.
    pub fn consume<A: Adapter>(
        &mut self,
        buf: &[u8],
        adapter: &mut A,
    ) -> Result<ParseStatus, Error> {
        let mut pos = 0;
        loop {
            match self.cursor {
                Cursor::Line => {
                    let Some(line_len) = find_line(&buf[pos..]) else {
                        return Ok(ParseStatus::NeedsMore { consumed: pos });
                    };
                    let line = &buf[pos..pos + line_len];
                    let complete = self.on_line(line, adapter)?;
                    pos += line_len + 2;
                    self.offset += (line_len + 2) as u64;
                    if complete {
                        return Ok(ParseStatus::Complete { consumed: pos });
                    }
                }
                Cursor::BulkBody { kind, len } => {
                    if buf.len() - pos < len + 2 {
                        return Ok(ParseStatus::NeedsMore { consumed: pos });
                    }
                    let payload = &buf[pos..pos + len];
                    if &buf[pos + len..pos + len + 2] != b"\r\n" {
                        return Err(Error::protocol(
                            self.offset + len as u64,
                            "missing CRLF after blob payload",
                        ));
                    }
                    self.cursor = Cursor::Line;
                    let complete = self.element(kind, 1, payload, adapter)?;
                    pos += len + 2;
                    self.offset += (len + 2) as u64;
                    if complete {
                        return Ok(ParseStatus::Complete { consumed: pos });
                    }
                }
                Cursor::StreamedBody { len } => {
                    if buf.len() - pos < len + 2 {
                        return Ok(ParseStatus::NeedsMore { consumed: pos });
                    }
                    if &buf[pos + len..pos + len + 2] != b"\r\n" {
                        return Err(Error::protocol(
                            self.offset + len as u64,
                            "missing CRLF after streamed chunk",
                        ));
                    }
                    match self.streamed.as_mut() {
                        Some(payload) => payload.extend_from_slice(&buf[pos..pos + len]),
                        None => {
                            return Err(Error::protocol(
                                self.offset,
                                "streamed chunk outside a streamed string",
                            ));
                        }
                    }
                    self.cursor = Cursor::Line;
                    pos += len + 2;
                    self.offset += (len + 2) as u64;
                }
            }
        }
    }

    /// Dispatches one complete type line.  Returns true when the reply tree
    /// closed with this line.
    fn on_line<A: Adapter>(&mut self, line: &[u8], adapter: &mut A) -> Result<bool, Error> {
        let Some((&code, rest)) = line.split_first() else {
            return Err(Error::protocol(self.offset, "empty type line"));
        };
        let kind = DataKind::from_code(code);
        if self.streamed.is_some() && kind != DataKind::StreamedStringPart {
            return Err(Error::protocol(
                self.offset,
                "expected a streamed-string chunk",
            ));
        }
        match kind {
            DataKind::Array | DataKind::Push | DataKind::Set | DataKind::Map => {
                let n = self.parse_length(rest)?;
                self.aggregate(kind, n, adapter)
            }
            DataKind::Attribute => {
                let n = self.parse_length(rest)?;
                if self.attr_stack.is_empty() {
                    // Starts a side-collected subtree; contributes nothing
                    // to the primary reply.
                    self.attributes
                        .push(Node::aggregate(DataKind::Attribute, n, 0));
                    if n > 0 {
                        self.attr_stack.push(Frame { remaining: n * 2 });
                    }
                    Ok(false)
                } else {
                    self.aggregate(kind, n, adapter)
                }
            }
            DataKind::SimpleString
            | DataKind::SimpleError
            | DataKind::Number
            | DataKind::Double
            | DataKind::Boolean
            | DataKind::BigNumber => self.element(kind, 1, rest, adapter),
            DataKind::Null => {
                if !rest.is_empty() {
                    return Err(Error::protocol(self.offset, "unexpected payload after null"));
                }
                self.element(DataKind::Null, 1, b"", adapter)
            }
            DataKind::BlobString if rest == b"?" => {
                if self.streamed.is_some() {
                    return Err(Error::protocol(self.offset, "nested streamed string"));
                }
                self.streamed = Some(Vec::new());
                Ok(false)
            }
            DataKind::BlobString | DataKind::BlobError | DataKind::VerbatimString => {
                let len = self.parse_length(rest)?;
                self.cursor = Cursor::BulkBody { kind, len };
                Ok(false)
            }
            DataKind::StreamedStringPart => {
                if self.streamed.is_none() {
                    return Err(Error::protocol(
                        self.offset,
                        "streamed chunk outside a streamed string",
                    ));
                }
                let len = self.parse_length(rest)?;
                if len == 0 {
                    // Terminator: the accumulated chunks form one logical
                    // payload.
                    let payload = self.streamed.take().unwrap_or_default();
                    self.element(DataKind::StreamedStringPart, 1, &payload, adapter)
                } else {
                    self.cursor = Cursor::StreamedBody { len };
                    Ok(false)
                }
            }
            DataKind::Invalid => Err(Error::protocol(
                self.offset,
                format!("invalid type discriminant {:#04x}", code),
            )),
        }
    }

    /// Emits an aggregate header and opens its frame.
    fn aggregate<A: Adapter>(
        &mut self,
        kind: DataKind,
        n: usize,
        adapter: &mut A,
    ) -> Result<bool, Error> {
        let children = n * kind.element_multiplicity();
        if self.attr_stack.is_empty() {
            adapter.on_event(Event {
                kind,
                aggregate_size: n,
                depth: self.stack.len(),
                payload: b"",
            })?;
            if children > 0 {
                self.stack.push(Frame {
                    remaining: children,
                });
                Ok(false)
            } else {
                Ok(self.commit())
            }
        } else {
            self.attributes
                .push(Node::aggregate(kind, n, self.attr_stack.len()));
            if children > 0 {
                self.attr_stack.push(Frame {
                    remaining: children,
                });
            } else {
                self.commit_attr();
            }
            Ok(false)
        }
    }

    /// Emits a completed leaf element and closes finished frames.
    fn element<A: Adapter>(
        &mut self,
        kind: DataKind,
        aggregate_size: usize,
        payload: &[u8],
        adapter: &mut A,
    ) -> Result<bool, Error> {
        if self.attr_stack.is_empty() {
            adapter.on_event(Event {
                kind,
                aggregate_size,
                depth: self.stack.len(),
                payload,
            })?;
            Ok(self.commit())
        } else {
            self.attributes
                .push(Node::simple(kind, self.attr_stack.len(), payload));
            self.commit_attr();
            Ok(false)
        }
    }

    /// One element finished: decrement the enclosing frame, popping frames
    /// as they drain.  True when the reply tree is closed.
    fn commit(&mut self) -> bool {
        while let Some(top) = self.stack.last_mut() {
            top.remaining -= 1;
            if top.remaining == 0 {
                self.stack.pop();
            } else {
                return false;
            }
        }
        true
    }

    fn commit_attr(&mut self) {
        while let Some(top) = self.attr_stack.last_mut() {
            top.remaining -= 1;
            if top.remaining == 0 {
                self.attr_stack.pop();
            } else {
                return;
            }
        }
    }

    fn parse_length(&self, digits: &[u8]) -> Result<usize, Error> {
        if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
            return Err(Error::protocol(
                self.offset,
                format!("invalid length field {:?}", String::from_utf8_lossy(digits)),
            ));
        }
        // All-digit input; only overflow can fail.
        std::str::from_utf8(digits)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| Error::protocol(self.offset, "length field overflow"))
    }
}

/// Index of the first `\r\n` in `buf`, i.e. the line length without its
/// terminator.
fn find_line(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}
