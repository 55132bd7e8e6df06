//! Capacity limits and on-disk byte-width computation.
//!
//! Store capacities are always of the form `256^k - 1` so that a `k`-byte
//! big-endian integer can address every slot and `0` stays free as the null
//! sentinel.

/// Largest event capacity the header's 4-byte field can describe.
pub const MAX_EVENT_CAPACITY: u32 = u32::MAX;

/// Largest state capacity: `256^8 - 1`, one full 8-byte ID.
pub const MAX_STATE_CAPACITY: u64 = u64::MAX;

/// Largest number of outgoing transitions a single state may hold.
pub const MAX_TRANSITION_CAPACITY: u32 = i32::MAX as u32;

/// Largest state label length in bytes.
pub const MAX_LABEL_LENGTH: u32 = 100_000;

/// Upper validation bound on the controller count of a single automaton.
pub const MAX_CONTROLLERS: u32 = 10;

/// `256^k - 1` for `k` in `1..=8`.
pub fn capacity_for_width(k: u8) -> u64 {
    debug_assert!((1..=8).contains(&k));
    if k >= 8 {
        u64::MAX
    } else {
        (1u64 << (8 * k as u32)) - 1
    }
}

/// Minimum `k` with `256^k - 1 >= capacity`.
pub fn bytes_per_state_id(state_capacity: u64) -> u8 {
    for k in 1..8u8 {
        if capacity_for_width(k) >= state_capacity {
            return k;
        }
    }
    8
}

/// Minimum `k` with `256^k - 1 >= capacity`, for the 4-byte event space.
pub fn bytes_per_event_id(event_capacity: u32) -> u8 {
    bytes_per_state_id(event_capacity as u64)
}

/// Smallest capacity of the form `256^k - 1` that can hold `n`.
pub fn round_up_capacity(n: u64) -> u64 {
    capacity_for_width(bytes_per_state_id(n.max(1)))
}
