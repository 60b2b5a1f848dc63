//! Frame type: header plus raw payload.

use bytes::{BufMut, Bytes, BytesMut};

use crate::{FrameHeader, MsgType, ProtocolError, Result};

/// One length-prefixed, typed unit on the wire.
///
/// The payload is kept as raw bytes; [`crate::Message`] gives it meaning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    msg_type: MsgType,
    payload: Bytes,
}

impl Frame {
    /// Create a frame from a type and payload.
    pub fn new(msg_type: MsgType, payload: impl Into<Bytes>) -> Self {
        Self { msg_type, payload: payload.into() }
    }

    /// Create a frame with no payload.
    pub fn empty(msg_type: MsgType) -> Self {
        Self { msg_type, payload: Bytes::new() }
    }

    /// Message type.
    pub fn msg_type(&self) -> MsgType {
        self.msg_type
    }

    /// Raw payload bytes.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Header describing this frame.
    pub fn header(&self) -> Result<FrameHeader> {
        FrameHeader::new(self.msg_type, self.payload.len())
    }

    /// Bytes this frame occupies on the wire.
    pub fn encoded_len(&self) -> usize {
        FrameHeader::SIZE + self.payload.len()
    }

    /// Append `length || type || payload` to `dst`.
    pub fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        let header = self.header()?;
        dst.reserve(self.encoded_len());
        dst.put_slice(&header.to_bytes());
        dst.put_slice(&self.payload);
        Ok(())
    }

    /// Encode into a fresh buffer.
    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode(&mut buf)?;
        Ok(buf.freeze())
    }

    /// Decode exactly one complete frame, copying the payload.
    ///
    /// `bytes` must start at the length field and contain nothing after the
    /// payload.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let msg_type = Self::check(bytes)?;
        Ok(Self { msg_type, payload: Bytes::copy_from_slice(&bytes[FrameHeader::SIZE..]) })
    }

    /// Decode exactly one complete frame without copying the payload.
    pub fn decode_owned(bytes: Bytes) -> Result<Self> {
        let msg_type = Self::check(&bytes)?;
        Ok(Self { msg_type, payload: bytes.slice(FrameHeader::SIZE..) })
    }

    fn check(bytes: &[u8]) -> Result<MsgType> {
        let length = FrameHeader::declared_length(bytes).ok_or(ProtocolError::Truncated {
            needed: FrameHeader::LENGTH_SIZE,
            available: bytes.len(),
        })?;

        if (length as usize) < FrameHeader::TYPE_SIZE {
            return Err(ProtocolError::FrameTooShort { length });
        }

        let actual = bytes.len() - FrameHeader::LENGTH_SIZE;
        if actual != length as usize {
            return Err(ProtocolError::LengthMismatch { declared: length as usize, actual });
        }

        let header = FrameHeader::peek(bytes).ok_or(ProtocolError::Truncated {
            needed: FrameHeader::SIZE,
            available: bytes.len(),
        })?;
        header.msg_type()
    }
}
