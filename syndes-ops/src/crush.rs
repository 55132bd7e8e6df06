//! Crush: subset construction over one controller's indistinguishability.
//!
//! States a controller cannot tell apart (connected by transitions it does
//! not observe) collapse into one crush state. Nash communication weights on
//! merged transitions are combined under a caller-chosen cost policy;
//! probabilities accumulate.

use fixedbitset::FixedBitSet;
use rustc_hash::FxHashMap;
use std::path::Path;
use syndes_core::{
    CombineCosts, EventId, NashCommunicationData, StateId, SyndesResult, TransitionData,
};
use syndes_storage::{Automaton, StoreConfig};
use tracing::{debug, warn};

/// Member sets are kept sorted; the sorted ID list is the canonical identity
/// of a crush state.
type MemberSet = Vec<u64>;

/// The closure of `start` under transitions unobservable to `controller`.
fn unobservable_closure(
    source: &Automaton,
    observable: &FxHashMap<EventId, bool>,
    start: StateId,
) -> SyndesResult<MemberSet> {
    let mut members = FixedBitSet::with_capacity(start.get() as usize + 1);
    members.insert(start.get() as usize);
    let mut stack = vec![start];
    while let Some(id) = stack.pop() {
        let Some(state) = source.get_state(id)? else {
            continue;
        };
        for transition in &state.transitions {
            if observable.get(&transition.event).copied().unwrap_or(true) {
                continue;
            }
            let raw = transition.target.get() as usize;
            if raw >= members.len() {
                members.grow(raw + 1);
            }
            if !members.put(raw) {
                stack.push(transition.target);
            }
        }
    }
    Ok(members.ones().map(|raw| raw as u64).collect())
}

/// Crush a U-Structure with respect to one controller (1-based).
///
/// Returns `Ok(None)` when the source is not a U-Structure kind, the
/// controller index is out of range, or there is no initial state.
pub fn crush(
    source: &Automaton,
    controller: usize,
    combine: CombineCosts,
    header_path: impl AsRef<Path>,
    body_path: impl AsRef<Path>,
) -> SyndesResult<Option<Automaton>> {
    let k = source.number_of_controllers() as usize;
    if !source.kind().is_ustructure() || controller == 0 || controller > k {
        return Ok(None);
    }
    let initial = source.initial_state();
    if initial.is_null() {
        return Ok(None);
    }
    if !source.potential_communications().is_empty() {
        warn!(
            count = source.potential_communications().len(),
            "crushing a U-Structure that still carries non-Nash potential communications"
        );
    }

    // Per-event observability for the chosen controller: a vectorized event
    // is observed only when the plant slot and the controller's slot are
    // both active.
    let mut observable: FxHashMap<EventId, bool> = FxHashMap::default();
    for event in source.events().iter() {
        let visible = match event.vector() {
            Some(vector) if vector.len() == k + 1 => !vector.unobservable_to(controller),
            Some(_) => true,
            None => event.is_observable_to(controller),
        };
        observable.insert(event.id(), visible);
    }

    let mut result = Automaton::create(
        source.kind(),
        header_path.as_ref(),
        body_path.as_ref(),
        &StoreConfig {
            state_capacity: 255,
            transition_capacity: source.transition_capacity(),
            label_length: source.label_length() + 2,
            n_controllers: source.number_of_controllers(),
        },
    )?;
    for event in source.events().iter() {
        result.add_event(event.label(), event.observable(), event.controllable())?;
    }

    // Nash annotations indexed by the member transition they sit on.
    let mut nash_index: FxHashMap<(u64, u32, u64), Vec<NashCommunicationData>> =
        FxHashMap::default();
    for nash in source.nash_communications() {
        nash_index
            .entry((
                nash.transition.initial.get(),
                nash.transition.event.get(),
                nash.transition.target.get(),
            ))
            .or_default()
            .push(nash.clone());
    }

    // Subset construction. Crush IDs are assigned in discovery order, so the
    // result is dense without a renumbering pass.
    let mut interned: FxHashMap<MemberSet, StateId> = FxHashMap::default();
    let mut stack: Vec<(StateId, MemberSet)> = Vec::new();

    let mut discover =
        |result: &mut Automaton,
         stack: &mut Vec<(StateId, MemberSet)>,
         interned: &mut FxHashMap<MemberSet, StateId>,
         members: MemberSet,
         is_initial: bool|
         -> SyndesResult<StateId> {
            if let Some(&id) = interned.get(&members) {
                return Ok(id);
            }
            let id = StateId::new(interned.len() as u64 + 1);
            let mut labels = Vec::with_capacity(members.len());
            let mut marked = false;
            for &member in &members {
                if let Some(state) = source.get_state_shallow(StateId::new(member))? {
                    marked |= state.marked;
                    labels.push(state.label);
                }
            }
            result.add_state_at(&format!("<{}>", labels.join(",")), marked, &[], is_initial, id)?;
            interned.insert(members.clone(), id);
            stack.push((id, members));
            Ok(id)
        };

    let start = unobservable_closure(source, &observable, initial)?;
    discover(&mut result, &mut stack, &mut interned, start, true)?;

    let event_ids: Vec<EventId> = source.events().iter().map(|e| e.id()).collect();
    while let Some((crush_id, members)) = stack.pop() {
        for &event in &event_ids {
            if !observable.get(&event).copied().unwrap_or(true) {
                continue;
            }
            let mut reached = FixedBitSet::with_capacity(1);
            let mut merged_nash: Vec<NashCommunicationData> = Vec::new();
            for &member in &members {
                let Some(state) = source.get_state(StateId::new(member))? else {
                    continue;
                };
                for target in state.targets_on(event) {
                    for reachable in unobservable_closure(source, &observable, target)? {
                        let raw = reachable as usize;
                        if raw >= reached.len() {
                            reached.grow(raw + 1);
                        }
                        reached.insert(raw);
                    }
                    if let Some(entries) =
                        nash_index.get(&(member, event.get(), target.get()))
                    {
                        merged_nash.extend(entries.iter().cloned());
                    }
                }
            }
            if reached.is_clear() {
                continue;
            }
            let targets: MemberSet = reached.ones().map(|raw| raw as u64).collect();
            let target_id = discover(&mut result, &mut stack, &mut interned, targets, false)?;
            result.add_transition(crush_id, event, target_id)?;

            if !merged_nash.is_empty() {
                let costs: Vec<i64> = merged_nash.iter().map(|n| n.cost()).collect();
                let probability: f64 = merged_nash.iter().map(|n| n.probability()).sum();
                let roles = merged_nash[0].roles.clone();
                result.add_nash_communication(NashCommunicationData::new(
                    TransitionData::new(crush_id, event, target_id),
                    roles,
                    combine.combine(&costs),
                    probability,
                ))?;
            }
        }
    }
    debug!(
        crush_states = interned.len(),
        from = source.number_of_states(),
        "crush subset construction complete"
    );
    Ok(Some(result))
}
