//! Fuzz test for the header-file decoder
//!
//! This fuzz target feeds arbitrary byte sequences to the header decoder to
//! find:
//! - Panics or crashes
//! - Infinite loops
//! - Non-roundtripping decodes
//!
//! Run with: cargo +nightly fuzz run header_fuzz -- -max_total_time=60

#![no_main]

use libfuzzer_sys::fuzz_target;
use std::path::Path;
use syndes_storage::header::{decode_header, encode_header};

fuzz_target!(|data: &[u8]| {
    let path = Path::new("fuzz.hdr");

    // Decoding must never panic; corrupt input is a typed error.
    if let Ok((meta, events, special)) = decode_header(data, path) {
        // One decode normalizes the numeric fields (cost is integral in
        // memory); from there encode/decode must be a bit-exact fixpoint.
        let encoded = encode_header(&meta, &events, &special);
        let (meta2, events2, special2) =
            decode_header(&encoded, path).expect("re-encoded header must decode");
        let encoded2 = encode_header(&meta2, &events2, &special2);
        assert_eq!(encoded, encoded2, "encode must be a fixpoint after one decode");
    }
});
