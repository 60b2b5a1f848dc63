//! Frame header (length + type).
//!
//! The header is six bytes of big-endian binary, cast directly from network
//! bytes via `zerocopy`. No unsafe code, no copying on the read path.

use zerocopy::{
    FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned,
    byteorder::{BigEndian, U16, U32},
};

use crate::{MsgType, ProtocolError, Result};

/// On-wire frame header.
///
/// `length` counts the type field plus the payload that follows it.
#[repr(C)]
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned,
)]
pub struct FrameHeader {
    length: U32<BigEndian>,
    msg_type: U16<BigEndian>,
}

impl FrameHeader {
    /// Size of the length field.
    pub const LENGTH_SIZE: usize = 4;
    /// Size of the type field.
    pub const TYPE_SIZE: usize = 2;
    /// Total header size.
    pub const SIZE: usize = Self::LENGTH_SIZE + Self::TYPE_SIZE;

    /// Build the header for a payload of `payload_len` bytes.
    pub fn new(msg_type: MsgType, payload_len: usize) -> Result<Self> {
        let length = payload_len
            .checked_add(Self::TYPE_SIZE)
            .and_then(|len| u32::try_from(len).ok())
            .ok_or(ProtocolError::FrameTooLarge {
                size: payload_len.saturating_add(Self::SIZE),
                max: u32::MAX as usize,
            })?;

        Ok(Self { length: U32::new(length), msg_type: U16::new(msg_type.to_u16()) })
    }

    /// Read the length field from the front of `buf`.
    ///
    /// Returns `None` until four bytes are available.
    pub fn declared_length(buf: &[u8]) -> Option<u32> {
        let (length, _) = U32::<BigEndian>::read_from_prefix(buf).ok()?;
        Some(length.get())
    }

    /// Parse a header from the front of `buf` without consuming it.
    pub fn peek(buf: &[u8]) -> Option<Self> {
        Self::read_from_prefix(buf).ok().map(|(header, _)| header)
    }

    /// Declared length (type + payload).
    pub fn length(&self) -> u32 {
        self.length.get()
    }

    /// Raw type value, possibly unknown.
    pub fn raw_type(&self) -> u16 {
        self.msg_type.get()
    }

    /// Typed message type.
    pub fn msg_type(&self) -> Result<MsgType> {
        MsgType::from_u16(self.raw_type()).ok_or(ProtocolError::UnknownMessageType(self.raw_type()))
    }

    /// Payload size implied by the length field.
    pub fn payload_len(&self) -> usize {
        (self.length() as usize).saturating_sub(Self::TYPE_SIZE)
    }

    /// Total bytes on the wire, including the length field.
    pub fn frame_len(&self) -> usize {
        Self::LENGTH_SIZE + self.length() as usize
    }

    /// Header bytes as sent on the wire.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out.copy_from_slice(self.as_bytes());
        out
    }

    /// Check a declared length against the type field and a size cap.
    ///
    /// `max_frame_size` bounds the bytes following the length field.
    pub fn validate_length(length: u32, max_frame_size: usize) -> Result<()> {
        if (length as usize) < Self::TYPE_SIZE {
            return Err(ProtocolError::FrameTooShort { length });
        }
        if length as usize > max_frame_size {
            return Err(ProtocolError::FrameTooLarge { size: length as usize, max: max_frame_size });
        }
        Ok(())
    }
}
