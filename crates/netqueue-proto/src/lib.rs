//! Wire format for the netqueue protocol.
//!
//! Every frame on a socket is a 4-byte big-endian length, a 2-byte big-endian
//! message type and a type-specific payload:
//!
//! ```text
//! ┌──────────────┬────────────┬──────────────────────┐
//! │ length (u32) │ type (u16) │ payload (length - 2) │
//! └──────────────┴────────────┴──────────────────────┘
//! ```
//!
//! `length` counts the type field plus the payload, never itself. The header
//! is parsed with `zerocopy`, so reading a frame boundary never copies.
//!
//! Payloads are deliberately simple: STATUS carries one UTF-8 string and
//! ENQUEUE carries UTF-8 items joined by `\n`. There is no escaping, so an
//! item containing `\n` cannot be encoded and is rejected.
//!
//! This crate holds no connection state. Reassembly of partial reads lives
//! with the connection that owns the socket.
#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod errors;
pub mod frame;
pub mod header;
pub mod message;
pub mod opcodes;

pub use errors::{ProtocolError, Result};
pub use frame::Frame;
pub use header::FrameHeader;
pub use message::{ENQUEUE_DELIMITER, Message};
pub use opcodes::MsgType;
