//! Fuzz test for the label-vector algebra
//!
//! This fuzz target checks the vector parser and the compatibility/join laws
//! on arbitrary input:
//! - Parsing never panics
//! - Join is defined exactly for compatible pairs and is commutative
//!
//! Run with: cargo +nightly fuzz run label_fuzz -- -max_total_time=60

#![no_main]

use libfuzzer_sys::fuzz_target;
use syndes_core::LabelVector;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let Some(midpoint) = text.char_indices().map(|(i, _)| i).nth(text.len() / 2) else {
        return;
    };
    let (left, right) = text.split_at(midpoint);

    let a = LabelVector::parse(left);
    let b = LabelVector::parse(right);

    if let (Some(a), Some(b)) = (a, b) {
        let ab = a.join(&b);
        let ba = b.join(&a);
        assert_eq!(ab.is_some(), a.compatible(&b));
        assert_eq!(ab, ba, "join must be commutative");
        if let Some(joined) = ab {
            // A join of same-length vectors preserves the length.
            assert_eq!(joined.len(), a.len());
        }
    }
});
