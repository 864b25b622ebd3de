//! Fuzz target for line framing and message classification.
//!
//! Run with: cargo +nightly fuzz run fuzz_frame_decoder
//!
//! Every decoded message must survive a re-encode and decode unchanged.

#![no_main]

use jsc_core::protocol::{decode, encode};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut rest = data;
    while let Ok((Some(msg), tail)) = decode(rest) {
        if let Ok(line) = encode(&msg)
            && let Ok((Some(again), _)) = decode(&line)
        {
            assert_eq!(again, msg);
        }
        rest = tail;
    }
});
