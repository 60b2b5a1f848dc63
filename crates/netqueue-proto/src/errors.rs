//! Protocol error types.

use thiserror::Error;

use crate::MsgType;

/// Result alias for codec operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors produced while encoding or decoding frames.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// The type field does not name a known message type.
    #[error("unknown message type: {0}")]
    UnknownMessageType(u16),

    /// Fewer bytes than a complete length field or header.
    #[error("truncated frame: need {needed} bytes, have {available}")]
    Truncated {
        /// Bytes required
        needed: usize,
        /// Bytes supplied
        available: usize,
    },

    /// The declared length cannot hold the 2-byte type field.
    #[error("frame too short: declared length {length} leaves no room for the type field")]
    FrameTooShort {
        /// Declared length
        length: u32,
    },

    /// The declared or encoded frame exceeds the size cap.
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge {
        /// Offending size in bytes
        size: usize,
        /// Configured maximum
        max: usize,
    },

    /// The declared length disagrees with the bytes supplied.
    #[error("length mismatch: header declares {declared} bytes, got {actual}")]
    LengthMismatch {
        /// Length from the header
        declared: usize,
        /// Bytes actually present after the length field
        actual: usize,
    },

    /// An ENQUEUE item contains the item delimiter.
    #[error("enqueue item {index} contains the '\\n' delimiter")]
    DelimiterInItem {
        /// Position of the offending item
        index: usize,
    },

    /// An ENQUEUE must carry at least one item.
    #[error("enqueue requires at least one item")]
    EmptyEnqueue,

    /// A string payload is not valid UTF-8.
    #[error("invalid UTF-8 in {msg_type} payload")]
    InvalidUtf8 {
        /// Message being decoded
        msg_type: MsgType,
    },
}
