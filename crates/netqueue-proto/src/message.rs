//! Decoded message payloads.
//!
//! | Type    | Payload                                  |
//! |---------|------------------------------------------|
//! | CONN    | none                                     |
//! | DISCONN | none                                     |
//! | STATUS  | one UTF-8 string                         |
//! | PING    | none                                     |
//! | PONG    | none                                     |
//! | ENQUEUE | UTF-8 items joined by [`ENQUEUE_DELIMITER`] |
//!
//! Payload bytes on the empty types are ignored when decoding.

use bytes::{BufMut, Bytes, BytesMut};

use crate::{Frame, MsgType, ProtocolError, Result};

/// Separator between ENQUEUE items. Items may not contain it.
pub const ENQUEUE_DELIMITER: u8 = b'\n';

/// In-process form of a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Presence announcement
    Conn,
    /// Disconnect notice
    Disconn,
    /// Status string
    Status(String),
    /// Health check request
    Ping,
    /// Health check response
    Pong,
    /// Ordered work items
    Enqueue(Vec<String>),
}

impl Message {
    /// Build an ENQUEUE from anything yielding strings.
    pub fn enqueue<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Enqueue(items.into_iter().map(Into::into).collect())
    }

    /// Message type.
    pub fn msg_type(&self) -> MsgType {
        match self {
            Self::Conn => MsgType::Conn,
            Self::Disconn => MsgType::Disconn,
            Self::Status(_) => MsgType::Status,
            Self::Ping => MsgType::Ping,
            Self::Pong => MsgType::Pong,
            Self::Enqueue(_) => MsgType::Enqueue,
        }
    }

    /// Convert into a frame.
    ///
    /// # Errors
    ///
    /// - `EmptyEnqueue` for an ENQUEUE without items
    /// - `DelimiterInItem` if an item contains `\n`
    pub fn into_frame(self) -> Result<Frame> {
        let msg_type = self.msg_type();
        let frame = match self {
            Self::Status(status) => Frame::new(msg_type, status),
            Self::Enqueue(items) => Frame::new(msg_type, encode_items(&items)?),
            Self::Conn | Self::Disconn | Self::Ping | Self::Pong => Frame::empty(msg_type),
        };
        Ok(frame)
    }

    /// Interpret a frame's payload.
    pub fn from_frame(frame: &Frame) -> Result<Self> {
        let msg_type = frame.msg_type();
        let message = match msg_type {
            MsgType::Conn => Self::Conn,
            MsgType::Disconn => Self::Disconn,
            MsgType::Ping => Self::Ping,
            MsgType::Pong => Self::Pong,
            MsgType::Status => Self::Status(decode_str(frame.payload(), msg_type)?.to_owned()),
            MsgType::Enqueue => Self::Enqueue(decode_items(frame.payload())?),
        };
        Ok(message)
    }

    /// Encode straight to wire bytes.
    pub fn encode(self) -> Result<Bytes> {
        self.into_frame()?.to_bytes()
    }

    /// Decode one complete frame from wire bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Self::from_frame(&Frame::decode(bytes)?)
    }
}

fn encode_items(items: &[String]) -> Result<Bytes> {
    if items.is_empty() {
        return Err(ProtocolError::EmptyEnqueue);
    }

    if let Some(index) = items.iter().position(|item| item.as_bytes().contains(&ENQUEUE_DELIMITER))
    {
        return Err(ProtocolError::DelimiterInItem { index });
    }

    // items.len() - 1 delimiters
    let size = items.iter().map(String::len).sum::<usize>() + items.len() - 1;
    let mut buf = BytesMut::with_capacity(size);
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            buf.put_u8(ENQUEUE_DELIMITER);
        }
        buf.put_slice(item.as_bytes());
    }
    Ok(buf.freeze())
}

fn decode_items(payload: &[u8]) -> Result<Vec<String>> {
    payload
        .split(|byte| *byte == ENQUEUE_DELIMITER)
        .map(|item| decode_str(item, MsgType::Enqueue).map(str::to_owned))
        .collect()
}

fn decode_str(bytes: &[u8], msg_type: MsgType) -> Result<&str> {
    std::str::from_utf8(bytes).map_err(|_| ProtocolError::InvalidUtf8 { msg_type })
}
