//! Fixed-width state records.
//!
//! The body file is an array of records addressed by `StateId * record_size`;
//! slot 0 is never used. A record is a flag byte, a zero-padded label, and up
//! to `transition_capacity` `(event_id, target_id)` pairs; an event ID of 0
//! terminates the transition list early.

use crate::codec::{read_uint, write_uint};
use crate::flags::StateFlags;
use serde::{Deserialize, Serialize};
use syndes_core::{EventId, StateId, Transition};

/// A fully decoded state record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    pub id: StateId,
    pub label: String,
    pub marked: bool,
    pub enablement: bool,
    pub disablement: bool,
    pub transitions: Vec<Transition>,
}

impl State {
    /// Whether this state has a transition on `event` to `target`.
    pub fn has_transition(&self, event: EventId, target: StateId) -> bool {
        self.transitions
            .iter()
            .any(|t| t.event == event && t.target == target)
    }

    /// Targets reachable from this state on `event`.
    pub fn targets_on<'a>(&'a self, event: EventId) -> impl Iterator<Item = StateId> + 'a {
        self.transitions
            .iter()
            .filter(move |t| t.event == event)
            .map(|t| t.target)
    }
}

/// Byte layout of one body record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BodyLayout {
    pub label_length: u32,
    pub transition_capacity: u32,
    pub n_bytes_per_event_id: u8,
    pub n_bytes_per_state_id: u8,
}

impl BodyLayout {
    /// `1 + labelLength + transitionCapacity * (nBytesPerEventId + nBytesPerStateId)`.
    pub fn record_size(&self) -> u64 {
        1 + self.label_length as u64
            + self.transition_capacity as u64
                * (self.n_bytes_per_event_id as u64 + self.n_bytes_per_state_id as u64)
    }

    /// Byte offset of a state's record.
    pub fn offset_of(&self, id: StateId) -> u64 {
        id.get() * self.record_size()
    }

    /// Encode a record into a buffer of exactly `record_size` bytes.
    ///
    /// The label is written as UTF-8 and must fit `label_length`; the
    /// transition count must fit `transition_capacity`. Callers grow
    /// capacities before encoding.
    pub fn encode_record(&self, state: &State, buf: &mut [u8]) {
        debug_assert_eq!(buf.len() as u64, self.record_size());
        buf.fill(0);

        let mut flags = StateFlags::EXISTS;
        flags.set(StateFlags::MARKED, state.marked);
        flags.set(StateFlags::ENABLEMENT, state.enablement);
        flags.set(StateFlags::DISABLEMENT, state.disablement);
        buf[0] = flags.bits();

        let label = state.label.as_bytes();
        debug_assert!(label.len() <= self.label_length as usize);
        buf[1..1 + label.len()].copy_from_slice(label);

        debug_assert!(state.transitions.len() <= self.transition_capacity as usize);
        let ev = self.n_bytes_per_event_id as usize;
        let st = self.n_bytes_per_state_id as usize;
        let mut offset = 1 + self.label_length as usize;
        for transition in &state.transitions {
            write_uint(buf, offset, transition.event.get() as u64, ev);
            write_uint(buf, offset + ev, transition.target.get(), st);
            offset += ev + st;
        }
    }

    /// Decode the record at slot `id`. Returns `None` when the slot is
    /// padding (`EXISTS` clear).
    pub fn decode_record(&self, id: StateId, buf: &[u8]) -> Option<State> {
        debug_assert_eq!(buf.len() as u64, self.record_size());
        let flags = StateFlags::from_bits_truncate(buf[0]);
        if !flags.contains(StateFlags::EXISTS) {
            return None;
        }

        // A 0 byte terminates the label early. Legacy files may hold raw
        // 8-bit labels, so decode lossily.
        let label_bytes = &buf[1..1 + self.label_length as usize];
        let label_end = label_bytes
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(label_bytes.len());
        let label = String::from_utf8_lossy(&label_bytes[..label_end]).into_owned();

        let ev = self.n_bytes_per_event_id as usize;
        let st = self.n_bytes_per_state_id as usize;
        let mut transitions = Vec::new();
        let mut offset = 1 + self.label_length as usize;
        for _ in 0..self.transition_capacity {
            let event = read_uint(buf, offset, ev);
            if event == 0 {
                break;
            }
            let target = read_uint(buf, offset + ev, st);
            transitions.push(Transition::new(
                EventId::new(event as u32),
                StateId::new(target),
            ));
            offset += ev + st;
        }

        Some(State {
            id,
            label,
            marked: flags.contains(StateFlags::MARKED),
            enablement: flags.contains(StateFlags::ENABLEMENT),
            disablement: flags.contains(StateFlags::DISABLEMENT),
            transitions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> BodyLayout {
        BodyLayout {
            label_length: 6,
            transition_capacity: 3,
            n_bytes_per_event_id: 1,
            n_bytes_per_state_id: 2,
        }
    }

    fn sample_state() -> State {
        State {
            id: StateId::new(4),
            label: "idle".to_owned(),
            marked: true,
            enablement: false,
            disablement: false,
            transitions: vec![
                Transition::new(EventId::new(1), StateId::new(2)),
                Transition::new(EventId::new(3), StateId::new(300)),
            ],
        }
    }

    #[test]
    fn test_record_size_formula() {
        assert_eq!(layout().record_size(), 1 + 6 + 3 * (1 + 2));
    }

    #[test]
    fn test_offset_indexed_by_id() {
        let l = layout();
        assert_eq!(l.offset_of(StateId::new(3)), 3 * l.record_size());
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let l = layout();
        let state = sample_state();
        let mut buf = vec![0u8; l.record_size() as usize];
        l.encode_record(&state, &mut buf);
        let decoded = l.decode_record(state.id, &buf).expect("record exists");
        assert_eq!(decoded, state);
    }

    #[test]
    fn test_padding_slot_decodes_to_none() {
        let l = layout();
        let buf = vec![0u8; l.record_size() as usize];
        assert!(l.decode_record(StateId::new(1), &buf).is_none());
    }

    #[test]
    fn test_zero_event_id_terminates_transition_list() {
        let l = layout();
        let state = sample_state();
        let mut buf = vec![0u8; l.record_size() as usize];
        l.encode_record(&state, &mut buf);
        // Zero out the second transition's event ID; the third slot was
        // already padding.
        let second = 1 + l.label_length as usize + 3;
        buf[second] = 0;
        let decoded = l.decode_record(state.id, &buf).expect("record exists");
        assert_eq!(decoded.transitions.len(), 1);
    }

    #[test]
    fn test_label_zero_terminated_early() {
        let l = layout();
        let mut state = sample_state();
        state.label = "ab".to_owned();
        let mut buf = vec![0u8; l.record_size() as usize];
        l.encode_record(&state, &mut buf);
        let decoded = l.decode_record(state.id, &buf).expect("record exists");
        assert_eq!(decoded.label, "ab");
    }

    #[test]
    fn test_legacy_non_utf8_label_read_lossily() {
        let l = layout();
        let state = sample_state();
        let mut buf = vec![0u8; l.record_size() as usize];
        l.encode_record(&state, &mut buf);
        buf[1] = 0xE9; // latin-1 'é' from an old writer
        let decoded = l.decode_record(state.id, &buf).expect("record exists");
        assert_eq!(decoded.label.chars().next(), Some('\u{FFFD}'));
    }

    #[test]
    fn test_full_transition_list() {
        let l = layout();
        let mut state = sample_state();
        state.transitions = (1..=3)
            .map(|i| Transition::new(EventId::new(i), StateId::new(i as u64)))
            .collect();
        let mut buf = vec![0u8; l.record_size() as usize];
        l.encode_record(&state, &mut buf);
        let decoded = l.decode_record(state.id, &buf).expect("record exists");
        assert_eq!(decoded.transitions.len(), 3);
    }
}
