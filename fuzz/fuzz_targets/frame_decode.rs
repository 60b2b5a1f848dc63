//! Arbitrary bytes must never panic the frame or message decoders.

#![no_main]

use libfuzzer_sys::fuzz_target;
use netqueue_proto::{Frame, FrameHeader, Message};

fuzz_target!(|data: &[u8]| {
    let _ = FrameHeader::peek(data);

    if let Ok(frame) = Frame::decode(data) {
        let header = frame.header().expect("decoded frame has a valid header");
        assert_eq!(header.frame_len(), data.len());
        let _ = Message::from_frame(&frame);
    }
});
