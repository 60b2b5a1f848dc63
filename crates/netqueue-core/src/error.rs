//! Error types for queue nodes.

use std::{io, path::PathBuf};

use netqueue_proto::ProtocolError;
use thiserror::Error;

/// Result alias for node operations.
pub type Result<T> = std::result::Result<T, QueueError>;

/// Errors from client, server and dispatch operations.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Operation not valid in the node's current lifecycle state.
    #[error("cannot {operation} while {state}")]
    StateMismatch {
        /// Operation attempted
        operation: &'static str,
        /// State the node was in
        state: &'static str,
    },

    /// No item arrived within the requested wait.
    #[error("queue has no available items")]
    Empty,

    /// No ready dispatch target within the requested wait.
    #[error("no available target: {reason}")]
    Full {
        /// Why no target could take the message
        reason: String,
    },

    /// Peer closed the socket part way through a frame.
    #[error("connection lost with {missing} bytes of a frame outstanding")]
    ConnectionLost {
        /// Bytes still expected for the partial frame
        missing: usize,
    },

    /// Frame carried a type outside the protocol.
    #[error("unrecognized message type {0}")]
    UnrecognizedMessageType(u16),

    /// A signal interrupted the multiplexer wait.
    #[error("wait interrupted")]
    Interrupted,

    /// Codec error.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Socket error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl QueueError {
    /// `Empty` and `Full` are expected outcomes of bounded waits; callers
    /// usually retry rather than give up.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Empty | Self::Full { .. })
    }

    pub(crate) fn full(reason: impl Into<String>) -> Self {
        Self::Full { reason: reason.into() }
    }
}

/// Errors loading node configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file unreadable.
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        /// File that failed
        path: PathBuf,
        /// Underlying error
        source: io::Error,
    },

    /// Config file is not valid TOML for [`crate::NodeConfig`].
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Values parse but make no sense together.
    #[error("invalid config: {0}")]
    Invalid(String),
}
