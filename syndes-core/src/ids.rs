//! Identity types for automaton records and the composite-ID packing algebra.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

// ============================================================================
// RECORD ID TYPE SYSTEM
// ============================================================================

/// Macro to define a dense, store-assigned numeric ID newtype.
///
/// IDs are assigned by the store in insertion order; `0` is reserved as the
/// null sentinel ("no event" padding in the body file, "unspecified" for the
/// initial-state pointer). The newtypes keep event and state IDs from being
/// mixed up at compile time.
macro_rules! define_record_id {
    ($name:ident, $repr:ty, $doc:literal) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name($repr);

        impl $name {
            /// The reserved null sentinel.
            pub const NULL: $name = $name(0);

            pub const fn new(raw: $repr) -> Self {
                Self(raw)
            }

            /// The raw numeric value.
            pub const fn get(self) -> $repr {
                self.0
            }

            /// True for the reserved `0` sentinel.
            pub const fn is_null(self) -> bool {
                self.0 == 0
            }

            /// Zero-based position of this ID in a dense table.
            ///
            /// Must not be called on the null sentinel.
            pub fn index(self) -> usize {
                debug_assert!(self.0 != 0, "null id has no table index");
                (self.0 - 1) as usize
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.parse::<$repr>().map(Self::new)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::NULL
            }
        }
    };
}

define_record_id!(
    EventId,
    u32,
    "ID of an event in an automaton's event set, assigned in insertion order."
);
define_record_id!(
    StateId,
    u64,
    "ID of a state slot in an automaton's body file."
);

// ============================================================================
// COMPOSITE-ID PACKING
// ============================================================================

/// Pack a tuple of IDs into a single value, base `max_id + 1`, slot 0 most
/// significant.
///
/// Every entry must lie in `[0, max_id]`. Returns `None` when the packed
/// value does not fit in 64 bits; callers treat that as a capacity failure.
///
/// Law: `separate_ids(combine_ids(v, m)?, m, v.len()) == v`.
pub fn combine_ids(ids: &[u64], max_id: u64) -> Option<u64> {
    let base = max_id.checked_add(1)?;
    let mut combined: u64 = 0;
    for &id in ids {
        debug_assert!(id <= max_id, "id {id} exceeds max_id {max_id}");
        combined = combined.checked_mul(base)?.checked_add(id)?;
    }
    Some(combined)
}

/// Unpack a combined value produced by [`combine_ids`] into `n_slots` IDs
/// by repeated division.
pub fn separate_ids(combined: u64, max_id: u64, n_slots: usize) -> Vec<u64> {
    let base = max_id + 1;
    let mut ids = vec![0u64; n_slots];
    let mut rest = combined;
    for slot in ids.iter_mut().rev() {
        *slot = rest % base;
        rest /= base;
    }
    ids
}

/// Two-slot packing used by the product operations:
/// `(id2 - 1) * n1 + id1` where `n1` is the state count of the first operand.
pub fn combine_pair(id1: StateId, id2: StateId, n1: u64) -> StateId {
    StateId::new((id2.get() - 1) * n1 + id1.get())
}

/// Inverse of [`combine_pair`].
pub fn separate_pair(combined: StateId, n1: u64) -> (StateId, StateId) {
    let zero_based = combined.get() - 1;
    (
        StateId::new(zero_based % n1 + 1),
        StateId::new(zero_based / n1 + 1),
    )
}

// ============================================================================
// TESTS
// ============================================================================
