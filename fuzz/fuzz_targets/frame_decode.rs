//! Fuzz target for Frame::decode
//!
//! Arbitrary text must never panic the decoder. Anything it accepts must
//! encode and decode back to the same frame.

#![no_main]

use coinboard_proto::Frame;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(Some(frame)) = Frame::decode(text) {
        let wire = frame.encode().expect("decoded frame must encode");
        let again = Frame::decode(&wire).expect("re-encoded frame must decode");
        assert_eq!(again, Some(frame));
    }
});
