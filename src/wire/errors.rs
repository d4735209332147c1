//! Wire codec errors

use thiserror::Error;

use crate::identity::ErrorKind;

/// Result type for wire operations
pub type WireResult<T> = Result<T, WireError>;

/// Wire codec errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    /// Input ended before a field was complete
    #[error("truncated input: needed {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },

    /// Bytes left over after the last field
    #[error("{0} trailing bytes after message")]
    TrailingBytes(usize),

    /// Enum discriminant out of range
    #[error("invalid value {value} for {field}")]
    InvalidEnum { field: &'static str, value: u8 },

    /// int64 field carried a negative value where only non-negative ones exist
    #[error("negative value {value} for {field}")]
    Negative { field: &'static str, value: i64 },

    /// Value does not fit the wire representation
    #[error("value for {0} exceeds wire range")]
    OutOfRange(&'static str),

    /// String field was not UTF-8
    #[error("invalid UTF-8 in {0}")]
    InvalidUtf8(&'static str),

    /// Frame checksum did not match
    #[error("checksum mismatch: expected {expected:#010x}, computed {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    /// Frame announced a different message than the caller expected
    #[error("unexpected message kind: expected {expected}, found {found}")]
    UnexpectedKind { expected: u8, found: u8 },

    /// Frame message kind unknown
    #[error("unknown message kind {0}")]
    UnknownKind(u8),
}

impl WireError {
    /// Taxonomy kind of this error.
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Codec
    }
}
