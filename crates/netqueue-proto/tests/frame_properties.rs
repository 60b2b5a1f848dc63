//! Property tests for the codec.
//!
//! - Every encodable message decodes back to itself.
//! - The length field always equals the bytes that follow it.

use netqueue_proto::{Frame, FrameHeader, Message, MsgType};
use proptest::prelude::*;

/// Items the protocol can carry: any string without the delimiter.
fn item() -> impl Strategy<Value = String> {
    "[^\n]{0,32}"
}

fn message() -> impl Strategy<Value = Message> {
    prop_oneof![
        Just(Message::Conn),
        Just(Message::Disconn),
        Just(Message::Ping),
        Just(Message::Pong),
        any::<String>().prop_map(Message::Status),
        prop::collection::vec(item(), 1..8).prop_map(Message::Enqueue),
    ]
}

fn msg_type() -> impl Strategy<Value = MsgType> {
    prop::sample::select(MsgType::ALL.to_vec())
}

proptest! {
    #[test]
    fn message_roundtrip(message in message()) {
        let bytes = message.clone().encode().unwrap();
        prop_assert_eq!(Message::decode(&bytes).unwrap(), message);
    }

    #[test]
    fn length_field_counts_type_and_payload(
        ty in msg_type(),
        payload in prop::collection::vec(any::<u8>(), 0..512),
    ) {
        let bytes = Frame::new(ty, payload.clone()).to_bytes().unwrap();
        let declared = FrameHeader::declared_length(&bytes).unwrap() as usize;

        prop_assert_eq!(declared, bytes.len() - FrameHeader::LENGTH_SIZE);
        prop_assert_eq!(declared, FrameHeader::TYPE_SIZE + payload.len());
    }

    #[test]
    fn decode_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..64)) {
        let _ = Frame::decode(&bytes);
        let _ = Message::decode(&bytes);
    }
}
