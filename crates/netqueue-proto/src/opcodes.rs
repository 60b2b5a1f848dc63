//! Message type codes.

use std::fmt;

/// The six message types of the protocol.
///
/// Discriminants are the on-wire values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum MsgType {
    /// Peer announces itself. A server answers with its own CONN.
    Conn = 1,
    /// Peer is going away.
    Disconn = 2,
    /// Free-form status string describing the sender.
    Status = 3,
    /// Health check request.
    Ping = 4,
    /// Health check response.
    Pong = 5,
    /// One or more work items.
    Enqueue = 6,
}

impl MsgType {
    /// All message types, in wire order.
    pub const ALL: [Self; 6] =
        [Self::Conn, Self::Disconn, Self::Status, Self::Ping, Self::Pong, Self::Enqueue];

    /// Wire value.
    pub fn to_u16(self) -> u16 {
        self as u16
    }

    /// Parse a wire value, `None` if unknown.
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(Self::Conn),
            2 => Some(Self::Disconn),
            3 => Some(Self::Status),
            4 => Some(Self::Ping),
            5 => Some(Self::Pong),
            6 => Some(Self::Enqueue),
            _ => None,
        }
    }

    /// Upper-case protocol name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Conn => "CONN",
            Self::Disconn => "DISCONN",
            Self::Status => "STATUS",
            Self::Ping => "PING",
            Self::Pong => "PONG",
            Self::Enqueue => "ENQUEUE",
        }
    }
}

impl fmt::Display for MsgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
