//! RESP3 data kinds as they appear on the wire.
//!
//! Every protocol element starts with a one-byte discriminant that selects
//! its kind.  Aggregates carry a child count and are followed by that many
//! elements (times the element multiplicity); simples carry a payload.

use std::fmt;

/// The closed set of RESP3 element kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DataKind {
    // Aggregates
    Array,
    Push,
    Set,
    Map,
    Attribute,
    // Simples
    SimpleString,
    SimpleError,
    Number,
    Double,
    Boolean,
    BigNumber,
    Null,
    BlobError,
    VerbatimString,
    BlobString,
    StreamedStringPart,
    /// An unrecognized wire discriminant.
    #[default]
    Invalid,
}

impl DataKind {
    /// True for kinds whose body is a sequence of child elements.
    pub fn is_aggregate(self) -> bool {
        matches!(
            self,
            DataKind::Array | DataKind::Push | DataKind::Set | DataKind::Map | DataKind::Attribute
        )
    }

    /// Number of wire elements each logical child contributes.
    ///
    /// Maps and attributes carry key/value pairs, so each declared child is
    /// two elements on the wire; everything else is one.
    pub fn element_multiplicity(self) -> usize {
        match self {
            DataKind::Map | DataKind::Attribute => 2,
            _ => 1,
        }
    }

    /// The wire discriminant byte for this kind.
    pub fn to_code(self) -> u8 {
        match self {
            DataKind::Array => b'*',
            DataKind::Push => b'>',
            DataKind::Set => b'~',
            DataKind::Map => b'%',
            DataKind::Attribute => b'|',
            DataKind::SimpleString => b'+',
            DataKind::SimpleError => b'-',
            DataKind::Number => b':',
            DataKind::Double => b',',
            DataKind::Boolean => b'#',
            DataKind::BigNumber => b'(',
            DataKind::Null => b'_',
            DataKind::BlobError => b'!',
            DataKind::VerbatimString => b'=',
            DataKind::BlobString => b'$',
            DataKind::StreamedStringPart => b';',
            DataKind::Invalid => b' ',
        }
    }

    /// Maps a wire discriminant byte to its kind; unknown bytes yield
    /// [`DataKind::Invalid`].
    pub fn from_code(code: u8) -> DataKind {
        match code {
            b'*' => DataKind::Array,
            b'>' => DataKind::Push,
            b'~' => DataKind::Set,
            b'%' => DataKind::Map,
            b'|' => DataKind::Attribute,
            b'+' => DataKind::SimpleString,
            b'-' => DataKind::SimpleError,
            b':' => DataKind::Number,
            b',' => DataKind::Double,
            b'#' => DataKind::Boolean,
            b'(' => DataKind::BigNumber,
            b'_' => DataKind::Null,
            b'!' => DataKind::BlobError,
            b'=' => DataKind::VerbatimString,
            b'$' => DataKind::BlobString,
            b';' => DataKind::StreamedStringPart,
            _ => DataKind::Invalid,
        }
    }
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataKind::Array => "array",
            DataKind::Push => "push",
            DataKind::Set => "set",
            DataKind::Map => "map",
            DataKind::Attribute => "attribute",
            DataKind::SimpleString => "simple-string",
            DataKind::SimpleError => "simple-error",
            DataKind::Number => "number",
            DataKind::Double => "double",
            DataKind::Boolean => "boolean",
            DataKind::BigNumber => "big-number",
            DataKind::Null => "null",
            DataKind::BlobError => "blob-error",
            DataKind::VerbatimString => "verbatim-string",
            DataKind::BlobString => "blob-string",
            DataKind::StreamedStringPart => "streamed-string-part",
            DataKind::Invalid => "invalid",
        };
        f.write_str(name)
    }
}
