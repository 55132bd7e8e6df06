//! Header file layout.
//!
//! A header is a 45-byte fixed prefix, followed by the event records, followed
//! by the kind-dependent special-transition tables. The whole file is
//! rewritten on every metadata change; readers validate as they go and
//! surface a corrupt-header error naming the reason.

use crate::codec::{read_uint, write_uint};
use std::path::Path;
use syndes_core::{
    AutomatonKind, CommunicationData, CommunicationRole, ControllerFlags, DisablementData,
    EventId, EventSet, NashCommunicationData, RoleVector, SpecialTable, StateId, StoreError,
    SyndesResult, TransitionData, MAX_CONTROLLERS,
};

/// Size of the fixed header prefix.
pub const FIXED_PREFIX_SIZE: usize = 45;

/// Size of a detached transition record: 8 + 4 + 8.
const TRANSITION_DATA_SIZE: usize = 20;

/// The fixed metadata fields of a header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderMeta {
    pub kind: AutomatonKind,
    pub n_states: u64,
    pub event_capacity: u32,
    pub state_capacity: u64,
    pub transition_capacity: u32,
    pub label_length: u32,
    pub initial_state: StateId,
    pub n_controllers: u32,
}

/// The special-transition annotation lists carried by a header.
///
/// Which lists are written depends on the automaton kind; iteration order is
/// insertion order and is preserved on rewrite so files round-trip
/// bit-exactly.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpecialTables {
    pub bad_transitions: Vec<TransitionData>,
    pub unconditional_violations: Vec<TransitionData>,
    pub conditional_violations: Vec<TransitionData>,
    pub potential_communications: Vec<CommunicationData>,
    pub invalid_communications: Vec<TransitionData>,
    pub nash_communications: Vec<NashCommunicationData>,
    pub disablement_decisions: Vec<DisablementData>,
    pub suppressed_transitions: Vec<TransitionData>,
}

impl SpecialTables {
    /// Remap every state endpoint. Entries whose endpoints no longer map are
    /// dropped.
    pub fn remap_states<F>(&mut self, map: F)
    where
        F: FnMut(StateId) -> Option<StateId>,
    {
        self.remap_states_and_events(map, Some);
    }

    /// Remap every event reference. Entries referencing a dropped event are
    /// removed.
    pub fn remap_events<F>(&mut self, map: F)
    where
        F: FnMut(EventId) -> Option<EventId>,
    {
        self.remap_states_and_events(Some, map);
    }

    fn remap_states_and_events<S, E>(&mut self, mut state_map: S, mut event_map: E)
    where
        S: FnMut(StateId) -> Option<StateId>,
        E: FnMut(EventId) -> Option<EventId>,
    {
        let mut remap_one = |data: &TransitionData| -> Option<TransitionData> {
            Some(TransitionData::new(
                state_map(data.initial)?,
                event_map(data.event)?,
                state_map(data.target)?,
            ))
        };
        for list in [
            &mut self.bad_transitions,
            &mut self.unconditional_violations,
            &mut self.conditional_violations,
            &mut self.invalid_communications,
            &mut self.suppressed_transitions,
        ] {
            *list = list.iter().filter_map(&mut remap_one).collect();
        }
        self.potential_communications = self
            .potential_communications
            .iter()
            .filter_map(|c| {
                Some(CommunicationData::new(
                    remap_one(&c.transition)?,
                    c.roles.clone(),
                ))
            })
            .collect();
        self.nash_communications = self
            .nash_communications
            .iter()
            .filter_map(|n| {
                Some(NashCommunicationData::new(
                    remap_one(&n.transition)?,
                    n.roles.clone(),
                    n.cost(),
                    n.probability(),
                ))
            })
            .collect();
        self.disablement_decisions = self
            .disablement_decisions
            .iter()
            .filter_map(|d| {
                Some(DisablementData::new(
                    remap_one(&d.transition)?,
                    d.controllers.clone(),
                ))
            })
            .collect();
    }
}

// ============================================================================
// ENCODING
// ============================================================================

fn push_transition_data(out: &mut Vec<u8>, data: &TransitionData) {
    let mut buf = [0u8; TRANSITION_DATA_SIZE];
    write_uint(&mut buf, 0, data.initial.get(), 8);
    write_uint(&mut buf, 8, data.event.get() as u64, 4);
    write_uint(&mut buf, 12, data.target.get(), 8);
    out.extend_from_slice(&buf);
}

fn push_roles(out: &mut Vec<u8>, roles: &[CommunicationRole]) {
    out.extend(roles.iter().map(|r| r.to_byte()));
}

/// Encode a complete header file image.
pub fn encode_header(meta: &HeaderMeta, events: &EventSet, special: &SpecialTables) -> Vec<u8> {
    let mut out = Vec::with_capacity(FIXED_PREFIX_SIZE);

    let mut prefix = [0u8; FIXED_PREFIX_SIZE];
    prefix[0] = meta.kind.to_byte();
    write_uint(&mut prefix, 1, meta.n_states, 8);
    write_uint(&mut prefix, 9, meta.event_capacity as u64, 4);
    write_uint(&mut prefix, 13, meta.state_capacity, 8);
    write_uint(&mut prefix, 21, meta.transition_capacity as u64, 4);
    write_uint(&mut prefix, 25, meta.label_length as u64, 4);
    write_uint(&mut prefix, 29, meta.initial_state.get(), 8);
    write_uint(&mut prefix, 37, meta.n_controllers as u64, 4);
    write_uint(&mut prefix, 41, events.len() as u64, 4);
    out.extend_from_slice(&prefix);

    for event in events.iter() {
        for i in 0..meta.n_controllers as usize {
            out.push(event.observable().get(i).copied().unwrap_or(false) as u8);
            out.push(event.controllable().get(i).copied().unwrap_or(false) as u8);
        }
        let label = event.label().as_bytes();
        let mut len = [0u8; 4];
        write_uint(&mut len, 0, label.len() as u64, 4);
        out.extend_from_slice(&len);
        out.extend_from_slice(label);
    }

    for table in meta.kind.special_tables() {
        let mut count = [0u8; 4];
        match table {
            SpecialTable::BadTransitions
            | SpecialTable::UnconditionalViolations
            | SpecialTable::ConditionalViolations
            | SpecialTable::InvalidCommunications
            | SpecialTable::SuppressedTransitions => {
                let list = match table {
                    SpecialTable::BadTransitions => &special.bad_transitions,
                    SpecialTable::UnconditionalViolations => &special.unconditional_violations,
                    SpecialTable::ConditionalViolations => &special.conditional_violations,
                    SpecialTable::InvalidCommunications => &special.invalid_communications,
                    _ => &special.suppressed_transitions,
                };
                write_uint(&mut count, 0, list.len() as u64, 4);
                out.extend_from_slice(&count);
                for data in list {
                    push_transition_data(&mut out, data);
                }
            }
            SpecialTable::PotentialCommunications => {
                write_uint(
                    &mut count,
                    0,
                    special.potential_communications.len() as u64,
                    4,
                );
                out.extend_from_slice(&count);
                for comm in &special.potential_communications {
                    push_transition_data(&mut out, &comm.transition);
                    push_roles(&mut out, &comm.roles);
                }
            }
            SpecialTable::NashCommunications => {
                write_uint(&mut count, 0, special.nash_communications.len() as u64, 4);
                out.extend_from_slice(&count);
                for nash in &special.nash_communications {
                    push_transition_data(&mut out, &nash.transition);
                    let mut weights = [0u8; 16];
                    write_uint(&mut weights, 0, (nash.cost() as f64).to_bits(), 8);
                    write_uint(&mut weights, 8, nash.probability().to_bits(), 8);
                    out.extend_from_slice(&weights);
                    push_roles(&mut out, &nash.roles);
                }
            }
            SpecialTable::DisablementDecisions => {
                write_uint(&mut count, 0, special.disablement_decisions.len() as u64, 4);
                out.extend_from_slice(&count);
                for decision in &special.disablement_decisions {
                    push_transition_data(&mut out, &decision.transition);
                    out.extend(decision.controllers.iter().map(|&c| c as u8));
                }
            }
        }
    }

    out
}

// ============================================================================
// DECODING
// ============================================================================

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
    path: &'a Path,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize, what: &str) -> SyndesResult<&'a [u8]> {
        if self.pos + n > self.buf.len() {
            return Err(StoreError::corrupt_header(
                self.path,
                format!("truncated while reading {what}"),
            )
            .into());
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn uint(&mut self, n: usize, what: &str) -> SyndesResult<u64> {
        Ok(read_uint(self.take(n, what)?, 0, n))
    }

    fn transition_data(&mut self, what: &str) -> SyndesResult<TransitionData> {
        let buf = self.take(TRANSITION_DATA_SIZE, what)?;
        Ok(TransitionData::new(
            StateId::new(read_uint(buf, 0, 8)),
            EventId::new(read_uint(buf, 8, 4) as u32),
            StateId::new(read_uint(buf, 12, 8)),
        ))
    }

    fn roles(&mut self, k: usize) -> SyndesResult<RoleVector> {
        let bytes = self.take(k, "communication roles")?;
        bytes
            .iter()
            .map(|&b| {
                CommunicationRole::from_byte(b).ok_or_else(|| {
                    StoreError::corrupt_header(self.path, format!("invalid role byte {b}")).into()
                })
            })
            .collect()
    }
}

/// Decode a header file image.
pub fn decode_header(
    bytes: &[u8],
    path: &Path,
) -> SyndesResult<(HeaderMeta, EventSet, SpecialTables)> {
    let mut reader = Reader {
        buf: bytes,
        pos: 0,
        path,
    };

    let kind_byte = reader.uint(1, "automaton type")? as u8;
    let kind = AutomatonKind::from_byte(kind_byte).ok_or_else(|| {
        StoreError::corrupt_header(path, format!("unknown automaton type {kind_byte}"))
    })?;
    let n_states = reader.uint(8, "nStates")?;
    let event_capacity = reader.uint(4, "eventCapacity")? as u32;
    let state_capacity = reader.uint(8, "stateCapacity")?;
    let transition_capacity = reader.uint(4, "transitionCapacity")? as u32;
    let label_length = reader.uint(4, "labelLength")? as u32;
    let initial_state = StateId::new(reader.uint(8, "initialState")?);
    let n_controllers = reader.uint(4, "nControllers")? as u32;
    let n_events = reader.uint(4, "nEvents")? as u32;

    if n_controllers == 0 || n_controllers > MAX_CONTROLLERS {
        return Err(
            StoreError::corrupt_header(path, format!("controller count {n_controllers}")).into(),
        );
    }
    if initial_state.get() > state_capacity {
        return Err(StoreError::corrupt_header(
            path,
            format!(
                "initial state {initial_state} exceeds state capacity {state_capacity}"
            ),
        )
        .into());
    }

    let meta = HeaderMeta {
        kind,
        n_states,
        event_capacity,
        state_capacity,
        transition_capacity,
        label_length,
        initial_state,
        n_controllers,
    };

    let k = n_controllers as usize;
    let mut events = EventSet::new();
    for ordinal in 0..n_events {
        let mut observable = ControllerFlags::new();
        let mut controllable = ControllerFlags::new();
        for _ in 0..k {
            let pair = reader.take(2, "event flags")?;
            observable.push(pair[0] != 0);
            controllable.push(pair[1] != 0);
        }
        let label_len = reader.uint(4, "event label length")? as usize;
        let label_bytes = reader.take(label_len, "event label")?;
        let label = std::str::from_utf8(label_bytes).map_err(|_| {
            StoreError::corrupt_header(path, format!("event {} label is not UTF-8", ordinal + 1))
        })?;
        if events.insert(label, observable, controllable).is_null() {
            return Err(
                StoreError::corrupt_header(path, format!("duplicate event label {label:?}")).into(),
            );
        }
    }

    let mut special = SpecialTables::default();
    for table in kind.special_tables() {
        let count = reader.uint(4, "special-transition count")? as usize;
        match table {
            SpecialTable::BadTransitions
            | SpecialTable::UnconditionalViolations
            | SpecialTable::ConditionalViolations
            | SpecialTable::InvalidCommunications
            | SpecialTable::SuppressedTransitions => {
                let mut list = Vec::with_capacity(count);
                for _ in 0..count {
                    list.push(reader.transition_data("special transition")?);
                }
                match table {
                    SpecialTable::BadTransitions => special.bad_transitions = list,
                    SpecialTable::UnconditionalViolations => {
                        special.unconditional_violations = list
                    }
                    SpecialTable::ConditionalViolations => special.conditional_violations = list,
                    SpecialTable::InvalidCommunications => special.invalid_communications = list,
                    _ => special.suppressed_transitions = list,
                }
            }
            SpecialTable::PotentialCommunications => {
                for _ in 0..count {
                    let transition = reader.transition_data("potential communication")?;
                    let roles = reader.roles(k)?;
                    special
                        .potential_communications
                        .push(CommunicationData::new(transition, roles));
                }
            }
            SpecialTable::NashCommunications => {
                for _ in 0..count {
                    let transition = reader.transition_data("nash communication")?;
                    let cost = f64::from_bits(reader.uint(8, "nash cost")?);
                    let probability = f64::from_bits(reader.uint(8, "nash probability")?);
                    let roles = reader.roles(k)?;
                    special.nash_communications.push(NashCommunicationData::new(
                        transition,
                        roles,
                        cost.round() as i64,
                        probability,
                    ));
                }
            }
            SpecialTable::DisablementDecisions => {
                for _ in 0..count {
                    let transition = reader.transition_data("disablement decision")?;
                    let flags = reader.take(k, "disablement flags")?;
                    special.disablement_decisions.push(DisablementData::new(
                        transition,
                        flags.iter().map(|&b| b != 0).collect(),
                    ));
                }
            }
        }
    }

    if reader.pos != bytes.len() {
        return Err(StoreError::corrupt_header(
            path,
            format!("{} trailing bytes", bytes.len() - reader.pos),
        )
        .into());
    }

    Ok((meta, events, special))
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;
    use std::path::PathBuf;

    fn meta(kind: AutomatonKind) -> HeaderMeta {
        HeaderMeta {
            kind,
            n_states: 3,
            event_capacity: 255,
            state_capacity: 255,
            transition_capacity: 4,
            label_length: 8,
            initial_state: StateId::new(1),
            n_controllers: 2,
        }
    }

    fn events() -> EventSet {
        let mut set = EventSet::new();
        set.insert("a", smallvec![true, false], smallvec![true, false]);
        set.insert("b", smallvec![false, true], smallvec![false, true]);
        set
    }

    fn data(initial: u64, event: u32, target: u64) -> TransitionData {
        TransitionData::new(
            StateId::new(initial),
            EventId::new(event),
            StateId::new(target),
        )
    }

    fn path() -> PathBuf {
        PathBuf::from("test.hdr")
    }

    #[test]
    fn test_fixed_prefix_is_45_bytes() {
        let encoded = encode_header(
            &meta(AutomatonKind::Automaton),
            &EventSet::new(),
            &SpecialTables::default(),
        );
        // No events, one empty bad-transition table.
        assert_eq!(encoded.len(), FIXED_PREFIX_SIZE + 4);
        assert_eq!(encoded[0], 0);
    }

    #[test]
    fn test_roundtrip_automaton_header() {
        let meta_in = meta(AutomatonKind::Automaton);
        let events_in = events();
        let special_in = SpecialTables {
            bad_transitions: vec![data(1, 2, 3), data(2, 1, 1)],
            ..Default::default()
        };
        let encoded = encode_header(&meta_in, &events_in, &special_in);
        let (meta_out, events_out, special_out) =
            decode_header(&encoded, &path()).expect("decodes");
        assert_eq!(meta_out, meta_in);
        assert_eq!(events_out.len(), 2);
        assert_eq!(events_out.id_of("b"), Some(EventId::new(2)));
        assert_eq!(special_out, special_in);
        // Bit-exact rewrite.
        assert_eq!(encode_header(&meta_out, &events_out, &special_out), encoded);
    }

    #[test]
    fn test_roundtrip_ustructure_header() {
        let meta_in = meta(AutomatonKind::UStructure);
        let events_in = events();
        let special_in = SpecialTables {
            bad_transitions: vec![data(1, 1, 2)],
            unconditional_violations: vec![data(3, 2, 1)],
            conditional_violations: vec![data(2, 2, 2)],
            potential_communications: vec![CommunicationData::new(
                data(1, 2, 3),
                smallvec![CommunicationRole::Sender, CommunicationRole::Receiver],
            )],
            invalid_communications: vec![],
            nash_communications: vec![NashCommunicationData::new(
                data(2, 1, 3),
                smallvec![CommunicationRole::Sender, CommunicationRole::None],
                7,
                0.5,
            )],
            disablement_decisions: vec![DisablementData::new(
                data(1, 1, 1),
                smallvec![true, false],
            )],
            suppressed_transitions: vec![data(3, 1, 3)],
        };
        let encoded = encode_header(&meta_in, &events_in, &special_in);
        let (meta_out, events_out, special_out) =
            decode_header(&encoded, &path()).expect("decodes");
        assert_eq!(meta_out, meta_in);
        assert_eq!(special_out, special_in);
        assert_eq!(encode_header(&meta_out, &events_out, &special_out), encoded);
    }

    #[test]
    fn test_communication_record_width() {
        // CommunicationData is 20 + K bytes.
        let meta_in = meta(AutomatonKind::UStructure);
        let empty = encode_header(&meta_in, &EventSet::new(), &SpecialTables::default());
        let with_comm = encode_header(
            &meta_in,
            &EventSet::new(),
            &SpecialTables {
                potential_communications: vec![CommunicationData::new(
                    data(1, 1, 1),
                    smallvec![CommunicationRole::Sender, CommunicationRole::None],
                )],
                ..Default::default()
            },
        );
        assert_eq!(with_comm.len() - empty.len(), 20 + 2);
    }

    #[test]
    fn test_nash_record_width() {
        // NashCommunicationData is 20 + 8 + 8 + K bytes.
        let meta_in = meta(AutomatonKind::UStructure);
        let empty = encode_header(&meta_in, &EventSet::new(), &SpecialTables::default());
        let with_nash = encode_header(
            &meta_in,
            &EventSet::new(),
            &SpecialTables {
                nash_communications: vec![NashCommunicationData::new(
                    data(1, 1, 1),
                    smallvec![CommunicationRole::Sender, CommunicationRole::None],
                    1,
                    1.0,
                )],
                ..Default::default()
            },
        );
        assert_eq!(with_nash.len() - empty.len(), 20 + 16 + 2);
    }

    #[test]
    fn test_truncated_header_is_corrupt() {
        let encoded = encode_header(
            &meta(AutomatonKind::Automaton),
            &events(),
            &SpecialTables::default(),
        );
        let err = decode_header(&encoded[..encoded.len() - 1], &path()).unwrap_err();
        assert!(err.to_string().contains("corrupt header"));
    }

    #[test]
    fn test_unknown_kind_byte_is_corrupt() {
        let mut encoded = encode_header(
            &meta(AutomatonKind::Automaton),
            &events(),
            &SpecialTables::default(),
        );
        encoded[0] = 9;
        let err = decode_header(&encoded, &path()).unwrap_err();
        assert!(err.to_string().contains("unknown automaton type"));
    }

    #[test]
    fn test_trailing_bytes_are_corrupt() {
        let mut encoded = encode_header(
            &meta(AutomatonKind::Automaton),
            &events(),
            &SpecialTables::default(),
        );
        encoded.push(0);
        let err = decode_header(&encoded, &path()).unwrap_err();
        assert!(err.to_string().contains("trailing"));
    }

    #[test]
    fn test_remap_states_drops_unmapped_entries() {
        let mut special = SpecialTables {
            bad_transitions: vec![data(1, 1, 2), data(2, 1, 3)],
            ..Default::default()
        };
        // State 3 has no new ID.
        special.remap_states(|s| match s.get() {
            1 => Some(StateId::new(1)),
            2 => Some(StateId::new(2)),
            _ => None,
        });
        assert_eq!(special.bad_transitions, vec![data(1, 1, 2)]);
    }

    #[test]
    fn test_remap_events() {
        let mut special = SpecialTables {
            bad_transitions: vec![data(1, 2, 2)],
            suppressed_transitions: vec![data(1, 1, 1)],
            ..Default::default()
        };
        special.remap_events(|e| match e.get() {
            2 => Some(EventId::new(1)),
            _ => None,
        });
        assert_eq!(special.bad_transitions, vec![data(1, 1, 2)]);
        assert!(special.suppressed_transitions.is_empty());
    }
}
