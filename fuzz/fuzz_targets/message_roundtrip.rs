//! Any ENQUEUE the encoder accepts decodes back to the same items.

#![no_main]

use libfuzzer_sys::fuzz_target;
use netqueue_proto::Message;

fuzz_target!(|items: Vec<String>| {
    let message = Message::Enqueue(items);
    if let Ok(wire) = message.clone().encode() {
        assert_eq!(Message::decode(&wire), Ok(message));
    }
});
