//! Binary products: intersection (synchronous product on the common
//! alphabet) and union (parallel composition).
//!
//! Combined state IDs use the pair form `(id2 - 1) * n1 + id1`; results are
//! renumbered densely before they are returned.

use rustc_hash::FxHashSet;
use std::path::Path;
use syndes_core::{combine_pair, EventId, StateId, SyndesResult, TransitionData};
use syndes_storage::{Automaton, StoreConfig};
use tracing::debug;

fn product_config(first: &Automaton, second: &Automaton) -> StoreConfig {
    StoreConfig {
        state_capacity: 255,
        transition_capacity: first
            .transition_capacity()
            .max(second.transition_capacity()),
        label_length: (first.label_length() + 1 + second.label_length())
            .min(syndes_core::MAX_LABEL_LENGTH),
        n_controllers: first.number_of_controllers(),
    }
}

fn bad_set(automaton: &Automaton) -> FxHashSet<TransitionData> {
    automaton.bad_transitions().iter().copied().collect()
}

/// A pair of component states together with the ID of their combined state.
struct PairFrontier {
    n1: u64,
    visited: FxHashSet<StateId>,
    stack: Vec<(StateId, StateId)>,
}

impl PairFrontier {
    fn new(n1: u64) -> Self {
        Self {
            n1,
            visited: FxHashSet::default(),
            stack: Vec::new(),
        }
    }

    fn combined(&self, id1: StateId, id2: StateId) -> StateId {
        combine_pair(id1, id2, self.n1)
    }

    /// Add the combined state for `(id1, id2)` if it is new, reading the
    /// component records for its label and marking.
    fn discover(
        &mut self,
        first: &Automaton,
        second: &Automaton,
        result: &mut Automaton,
        id1: StateId,
        id2: StateId,
        is_initial: bool,
    ) -> SyndesResult<StateId> {
        let combined = self.combined(id1, id2);
        if !self.visited.insert(combined) {
            return Ok(combined);
        }
        let (Some(s1), Some(s2)) = (
            first.get_state_shallow(id1)?,
            second.get_state_shallow(id2)?,
        ) else {
            return Ok(combined);
        };
        result.add_state_at(
            &format!("{}_{}", s1.label, s2.label),
            s1.marked && s2.marked,
            &[],
            is_initial,
            combined,
        )?;
        self.stack.push((id1, id2));
        Ok(combined)
    }
}

/// Synchronous product on the common alphabet.
///
/// Event identity is by label. Returns `Ok(None)` when the controller counts
/// disagree or either operand lacks an initial state. A combined state is
/// marked iff both components are marked; a combined transition is tagged bad
/// iff either component transition was.
pub fn intersection(
    first: &Automaton,
    second: &Automaton,
    header_path: impl AsRef<Path>,
    body_path: impl AsRef<Path>,
) -> SyndesResult<Option<Automaton>> {
    if first.number_of_controllers() != second.number_of_controllers() {
        return Ok(None);
    }
    if first.initial_state().is_null() || second.initial_state().is_null() {
        return Ok(None);
    }

    let mut result = Automaton::create(
        first.kind(),
        header_path.as_ref(),
        body_path.as_ref(),
        &product_config(first, second),
    )?;

    // Common alphabet, in the first operand's insertion order, with the
    // first operand's flags.
    let mut shared: Vec<(EventId, EventId, EventId)> = Vec::new();
    for event in first.events().iter() {
        if let Some(id2) = second.events().id_of(event.label()) {
            let id = result.add_event(event.label(), event.observable(), event.controllable())?;
            shared.push((id, event.id(), id2));
        }
    }

    let bad1 = bad_set(first);
    let bad2 = bad_set(second);
    let mut bad_out: Vec<TransitionData> = Vec::new();

    let mut frontier = PairFrontier::new(first.number_of_states());
    frontier.discover(
        first,
        second,
        &mut result,
        first.initial_state(),
        second.initial_state(),
        true,
    )?;
    while let Some((id1, id2)) = frontier.stack.pop() {
        let combined = frontier.combined(id1, id2);
        let (Some(s1), Some(s2)) = (first.get_state(id1)?, second.get_state(id2)?) else {
            continue;
        };
        for &(event, event1, event2) in &shared {
            for t1 in s1.targets_on(event1) {
                for t2 in s2.targets_on(event2) {
                    let target =
                        frontier.discover(first, second, &mut result, t1, t2, false)?;
                    result.add_transition(combined, event, target)?;
                    if bad1.contains(&TransitionData::new(id1, event1, t1))
                        || bad2.contains(&TransitionData::new(id2, event2, t2))
                    {
                        bad_out.push(TransitionData::new(combined, event, target));
                    }
                }
            }
        }
    }
    debug!(states = frontier.visited.len(), "intersection walk complete");

    let special = syndes_storage::SpecialTables {
        bad_transitions: bad_out,
        ..Default::default()
    };
    result.import_special(special)?;
    result.renumber_states()?;
    Ok(Some(result))
}

/// Parallel composition.
///
/// Shared events synchronize both operands; an event private to one operand
/// moves that slot alone. The result's event set is the union of the
/// operands'. Returns `Ok(None)` when the controller counts disagree or
/// either operand lacks an initial state.
pub fn union(
    first: &Automaton,
    second: &Automaton,
    header_path: impl AsRef<Path>,
    body_path: impl AsRef<Path>,
) -> SyndesResult<Option<Automaton>> {
    if first.number_of_controllers() != second.number_of_controllers() {
        return Ok(None);
    }
    if first.initial_state().is_null() || second.initial_state().is_null() {
        return Ok(None);
    }

    let mut result = Automaton::create(
        first.kind(),
        header_path.as_ref(),
        body_path.as_ref(),
        &product_config(first, second),
    )?;

    // Union of the event sets: the first operand's events in order, then the
    // second's additions. Each entry records where the event exists.
    struct UnionEvent {
        id: EventId,
        in_first: Option<EventId>,
        in_second: Option<EventId>,
    }
    let mut events: Vec<UnionEvent> = Vec::new();
    for event in first.events().iter() {
        let id = result.add_event(event.label(), event.observable(), event.controllable())?;
        events.push(UnionEvent {
            id,
            in_first: Some(event.id()),
            in_second: second.events().id_of(event.label()),
        });
    }
    for event in second.events().iter() {
        if first.events().id_of(event.label()).is_none() {
            let id = result.add_event(event.label(), event.observable(), event.controllable())?;
            events.push(UnionEvent {
                id,
                in_first: None,
                in_second: Some(event.id()),
            });
        }
    }

    let bad1 = bad_set(first);
    let bad2 = bad_set(second);
    let mut bad_out: Vec<TransitionData> = Vec::new();

    let mut frontier = PairFrontier::new(first.number_of_states());
    frontier.discover(
        first,
        second,
        &mut result,
        first.initial_state(),
        second.initial_state(),
        true,
    )?;
    while let Some((id1, id2)) = frontier.stack.pop() {
        let combined = frontier.combined(id1, id2);
        let (Some(s1), Some(s2)) = (first.get_state(id1)?, second.get_state(id2)?) else {
            continue;
        };
        for entry in &events {
            let mut moves: Vec<(StateId, StateId, bool)> = Vec::new();
            match (entry.in_first, entry.in_second) {
                (Some(e1), Some(e2)) => {
                    // Shared event: both operands must move.
                    for t1 in s1.targets_on(e1) {
                        for t2 in s2.targets_on(e2) {
                            let bad = bad1.contains(&TransitionData::new(id1, e1, t1))
                                || bad2.contains(&TransitionData::new(id2, e2, t2));
                            moves.push((t1, t2, bad));
                        }
                    }
                }
                (Some(e1), None) => {
                    // Private to the first operand: the second stays put.
                    for t1 in s1.targets_on(e1) {
                        let bad = bad1.contains(&TransitionData::new(id1, e1, t1));
                        moves.push((t1, id2, bad));
                    }
                }
                (None, Some(e2)) => {
                    for t2 in s2.targets_on(e2) {
                        let bad = bad2.contains(&TransitionData::new(id2, e2, t2));
                        moves.push((id1, t2, bad));
                    }
                }
                (None, None) => {}
            }
            for (t1, t2, bad) in moves {
                let target = frontier.discover(first, second, &mut result, t1, t2, false)?;
                result.add_transition(combined, entry.id, target)?;
                if bad {
                    bad_out.push(TransitionData::new(combined, entry.id, target));
                }
            }
        }
    }
    debug!(states = frontier.visited.len(), "union walk complete");

    let special = syndes_storage::SpecialTables {
        bad_transitions: bad_out,
        ..Default::default()
    };
    result.import_special(special)?;
    result.renumber_states()?;
    Ok(Some(result))
}
