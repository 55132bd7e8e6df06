//! Protocol pruning of a U-Structure.
//!
//! Pruning removes the transitions a chosen communication overrides: once a
//! controller is told what happened, the branches where it stayed ignorant
//! no longer occur. The walk claims each controller slot of the
//! communication vector at most once along a path and is bounded by the
//! controller count.

use rustc_hash::FxHashSet;
use smallvec::SmallVec;
use std::path::Path;
use syndes_core::{
    AutomatonKind, CommunicationData, LabelVector, StateId, SyndesResult, TransitionData,
};
use syndes_storage::Automaton;
use tracing::debug;

type FoundMask = SmallVec<[bool; 10]>;
type TransitionKey = (u64, u32, u64);

fn transition_key(data: &TransitionData) -> TransitionKey {
    (data.initial.get(), data.event.get(), data.target.get())
}

/// A transition's vector is followable when it is compatible with the
/// communication vector and touches no controller slot that an earlier step
/// already claimed.
fn compatible_under_found(vector: &LabelVector, communication: &LabelVector, found: &[bool]) -> bool {
    if !vector.compatible(communication) {
        return false;
    }
    (1..vector.len()).all(|slot| vector.is_silent(slot) || !found[slot - 1])
}

/// The removal walk along one communication, on an already-duplicated
/// automaton. Returns how many transitions were removed.
fn prune_walk(
    pruned: &mut Automaton,
    protected: &FxHashSet<TransitionKey>,
    communication: &LabelVector,
    start: StateId,
) -> SyndesResult<usize> {
    let k = pruned.number_of_controllers() as usize;
    let mut removed = 0usize;
    let mut stack: Vec<(StateId, FoundMask, usize)> =
        vec![(start, smallvec::smallvec![false; k], 0)];
    while let Some((state_id, found, depth)) = stack.pop() {
        let Some(state) = pruned.get_state(state_id)? else {
            continue;
        };
        for transition in &state.transitions {
            let Some(vector) = pruned
                .event(transition.event)
                .and_then(|event| event.vector())
            else {
                continue;
            };
            if vector.len() != k + 1 || !compatible_under_found(&vector, communication, &found) {
                continue;
            }
            let data = TransitionData::new(state_id, transition.event, transition.target);
            // The protocol's own communications survive.
            if depth == 0 && protected.contains(&transition_key(&data)) {
                continue;
            }
            let mut claimed = found.clone();
            for slot in 1..vector.len() {
                if !vector.is_silent(slot) {
                    claimed[slot - 1] = true;
                }
            }
            pruned.remove_transition(state_id, transition.event, transition.target)?;
            pruned.add_suppressed_transition(data)?;
            removed += 1;
            if depth + 1 < k {
                stack.push((transition.target, claimed, depth + 1));
            }
        }
    }
    Ok(removed)
}

/// Prune a U-Structure along one chosen communication.
///
/// `protocol` is the set of communications the caller decided to keep;
/// `communication` is the vector being applied and `start` the state it
/// occurs at. The result is a Pruned U-Structure written to fresh files with
/// its inactive events removed and its states renumbered; removed
/// transitions are recorded as suppressed. Returns `Ok(None)` when the
/// source is not a U-Structure kind.
pub fn prune(
    source: &Automaton,
    protocol: &[CommunicationData],
    communication: &LabelVector,
    start: StateId,
    header_path: impl AsRef<Path>,
    body_path: impl AsRef<Path>,
) -> SyndesResult<Option<Automaton>> {
    if !source.kind().is_ustructure() {
        return Ok(None);
    }
    let mut pruned = source.duplicate_to(
        AutomatonKind::PrunedUStructure,
        header_path.as_ref(),
        body_path.as_ref(),
    )?;
    let protected: FxHashSet<TransitionKey> = protocol
        .iter()
        .map(|c| transition_key(&c.transition))
        .collect();

    let removed = prune_walk(&mut pruned, &protected, communication, start)?;
    debug!(removed, "pruning walk complete");

    pruned.remove_inactive_events()?;
    pruned.renumber_states()?;
    Ok(Some(pruned))
}

/// Prune along every communication of a protocol in one pass.
///
/// All removal walks run on the same duplicate before inactive events are
/// dropped and states renumbered, so the protocol's IDs stay valid
/// throughout. Communications whose event carries no vector label are
/// skipped.
pub fn apply_protocol(
    source: &Automaton,
    protocol: &[CommunicationData],
    header_path: impl AsRef<Path>,
    body_path: impl AsRef<Path>,
) -> SyndesResult<Option<Automaton>> {
    if !source.kind().is_ustructure() {
        return Ok(None);
    }
    let mut pruned = source.duplicate_to(
        AutomatonKind::PrunedUStructure,
        header_path.as_ref(),
        body_path.as_ref(),
    )?;
    let protected: FxHashSet<TransitionKey> = protocol
        .iter()
        .map(|c| transition_key(&c.transition))
        .collect();

    let mut removed = 0usize;
    for communication in protocol {
        let Some(vector) = pruned
            .event(communication.transition.event)
            .and_then(|event| event.vector())
        else {
            continue;
        };
        removed += prune_walk(
            &mut pruned,
            &protected,
            &vector,
            communication.transition.initial,
        )?;
    }
    debug!(
        removed,
        communications = protocol.len(),
        "protocol application complete"
    );

    pruned.remove_inactive_events()?;
    pruned.renumber_states()?;
    Ok(Some(pruned))
}
