//! Values accepted by `put`.
//!
//! Raw bytes pass through untouched, so callers can hand over frames they
//! encoded themselves. Everything else becomes a message: a list of strings is
//! one ENQUEUE with that many items and a single string is a one-item ENQUEUE.

use bytes::Bytes;
use netqueue_proto::{Message, ProtocolError};

/// Something that can be written to a peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgoing {
    /// Pre-encoded wire bytes
    Raw(Bytes),
    /// A message to encode
    Message(Message),
}

impl Outgoing {
    /// Wire bytes for this value.
    pub fn into_wire(self) -> Result<Bytes, ProtocolError> {
        match self {
            Self::Raw(bytes) => Ok(bytes),
            Self::Message(message) => message.encode(),
        }
    }
}

impl From<Bytes> for Outgoing {
    fn from(bytes: Bytes) -> Self {
        Self::Raw(bytes)
    }
}

impl From<Message> for Outgoing {
    fn from(message: Message) -> Self {
        Self::Message(message)
    }
}

impl From<String> for Outgoing {
    fn from(item: String) -> Self {
        Self::Message(Message::Enqueue(vec![item]))
    }
}

impl From<&str> for Outgoing {
    fn from(item: &str) -> Self {
        Self::from(item.to_owned())
    }
}

impl From<Vec<String>> for Outgoing {
    fn from(items: Vec<String>) -> Self {
        Self::Message(Message::Enqueue(items))
    }
}

impl From<Vec<&str>> for Outgoing {
    fn from(items: Vec<&str>) -> Self {
        Self::Message(Message::enqueue(items))
    }
}

impl From<&[String]> for Outgoing {
    fn from(items: &[String]) -> Self {
        Self::Message(Message::Enqueue(items.to_vec()))
    }
}

impl<const N: usize> From<[&str; N]> for Outgoing {
    fn from(items: [&str; N]) -> Self {
        Self::Message(Message::enqueue(items))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_string_is_one_item() {
        assert_eq!(Outgoing::from("job"), Outgoing::Message(Message::enqueue(["job"])));
    }

    #[test]
    fn sequences_keep_every_item() {
        let expected = Outgoing::Message(Message::enqueue(["a", "b", "c"]));
        assert_eq!(Outgoing::from(vec!["a", "b", "c"]), expected);
        assert_eq!(Outgoing::from(["a", "b", "c"]), expected);
    }

    #[test]
    fn raw_bytes_pass_through() {
        let wire = Message::Disconn.encode().unwrap();
        assert_eq!(Outgoing::from(wire.clone()).into_wire().unwrap(), wire);
    }

    #[test]
    fn invalid_items_fail_to_encode() {
        let result = Outgoing::from("a\nb").into_wire();
        assert_eq!(result, Err(ProtocolError::DelimiterInItem { index: 0 }));
    }
}
