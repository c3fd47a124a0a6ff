use crate::kind::DataKind;

/// Wire-level and projection errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Malformed framing.  `offset` is the absolute position in the byte
    /// stream at which the violation was detected.
    #[error("protocol violation at byte {offset}: {message}")]
    Protocol { offset: u64, message: String },
    /// The reply element cannot be projected into the requested type.
    #[error("unexpected type: {0}")]
    UnexpectedType(String),
    /// A scalar projection received an aggregate element.
    #[error("expected a simple element, got {0}")]
    ExpectsSimple(DataKind),
    /// A flat projection received a nested aggregate.
    #[error("nested aggregates are not supported by this response type")]
    NestedUnsupported,
    /// `push_range` was called with an empty range.
    #[error("empty range")]
    EmptyRange,
    /// The server answered the command with an error reply.  The payload is
    /// carried verbatim.
    #[error("server error: {}", String::from_utf8_lossy(.0))]
    Server(Vec<u8>),
}

impl Error {
    pub(crate) fn protocol(offset: u64, message: impl Into<String>) -> Error {
        Error::Protocol {
            offset,
            message: message.into(),
        }
    }
}
