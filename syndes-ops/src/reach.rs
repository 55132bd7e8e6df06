//! Accessibility, co-accessibility, and trim.

use rustc_hash::FxHashSet;
use std::path::Path;
use syndes_core::{StateId, StoreError, SyndesResult};
use syndes_storage::{Automaton, StoreConfig};
use tracing::debug;

/// Capacities for an operation result derived from one source automaton.
/// Carried-over transitions may reference any source ID, so the result
/// starts at the source's state capacity.
pub(crate) fn derived_config(source: &Automaton) -> StoreConfig {
    StoreConfig {
        state_capacity: source.state_capacity(),
        transition_capacity: source.transition_capacity(),
        label_length: source.label_length(),
        n_controllers: source.number_of_controllers(),
    }
}

/// Copy the full event set, preserving insertion order and therefore IDs.
pub(crate) fn copy_events(source: &Automaton, target: &mut Automaton) -> SyndesResult<()> {
    for event in source.events().iter() {
        target.add_event(event.label(), event.observable(), event.controllable())?;
    }
    Ok(())
}

/// The sub-automaton forward-reachable from the initial state.
///
/// Returns `Ok(None)` when the source has no initial state. The result keeps
/// the source's full event set, the states a forward walk touches with their
/// outgoing transitions, and the special transitions whose endpoints
/// survive; state IDs are renumbered densely.
pub fn accessible(
    source: &Automaton,
    header_path: impl AsRef<Path>,
    body_path: impl AsRef<Path>,
) -> SyndesResult<Option<Automaton>> {
    let initial = source.initial_state();
    if initial.is_null() {
        return Ok(None);
    }

    let mut result = Automaton::create(
        source.kind(),
        header_path.as_ref(),
        body_path.as_ref(),
        &derived_config(source),
    )?;
    copy_events(source, &mut result)?;

    let mut visited: FxHashSet<StateId> = FxHashSet::default();
    let mut stack = vec![initial];
    visited.insert(initial);
    while let Some(id) = stack.pop() {
        let Some(state) = source.get_state(id)? else {
            continue;
        };
        result.add_state_at(
            &state.label,
            state.marked,
            &state.transitions,
            id == initial,
            id,
        )?;
        for transition in &state.transitions {
            if visited.insert(transition.target) {
                stack.push(transition.target);
            }
        }
    }
    debug!(
        reached = visited.len(),
        total = source.number_of_states(),
        "forward reachability complete"
    );

    let mut special = source.special().clone();
    special.remap_states(|id| visited.contains(&id).then_some(id));
    result.import_special(special)?;
    result.renumber_states()?;
    Ok(Some(result))
}

/// The sub-automaton from which a marked state remains reachable.
///
/// Builds an inverted-direction copy in auto-cleaned scratch files, forward
/// walks it from every marked state, then materializes the surviving states
/// with the direct transitions whose endpoints both survive.
pub fn coaccessible(
    source: &Automaton,
    header_path: impl AsRef<Path>,
    body_path: impl AsRef<Path>,
) -> SyndesResult<Automaton> {
    let scratch = tempfile::tempdir()
        .map_err(|e| StoreError::io(header_path.as_ref(), e))?;
    let mut inverted = Automaton::create(
        source.kind(),
        scratch.path().join("inverted.hdr"),
        scratch.path().join("inverted.bdy"),
        &derived_config(source),
    )?;
    copy_events(source, &mut inverted)?;

    // First pass: mirror the state set and remember the marked states.
    let mut marked = Vec::new();
    for state in source.scan_states()? {
        let state = state?;
        inverted.add_state_at(&state.label, state.marked, &[], false, state.id)?;
        if state.marked {
            marked.push(state.id);
        }
    }
    // Second pass: reverse every transition.
    for state in source.scan_states()? {
        let state = state?;
        for transition in &state.transitions {
            inverted.add_transition(transition.target, transition.event, state.id)?;
        }
    }

    // Forward walk of the inverted copy from the marked set.
    let mut survivors: FxHashSet<StateId> = marked.iter().copied().collect();
    let mut stack = marked;
    while let Some(id) = stack.pop() {
        let Some(state) = inverted.get_state(id)? else {
            continue;
        };
        for transition in &state.transitions {
            if survivors.insert(transition.target) {
                stack.push(transition.target);
            }
        }
    }
    debug!(
        survivors = survivors.len(),
        total = source.number_of_states(),
        "co-accessible walk complete"
    );

    // Translate back into the original direction.
    let mut result = Automaton::create(
        source.kind(),
        header_path.as_ref(),
        body_path.as_ref(),
        &derived_config(source),
    )?;
    copy_events(source, &mut result)?;
    let initial = source.initial_state();
    for state in source.scan_states()? {
        let state = state?;
        if !survivors.contains(&state.id) {
            continue;
        }
        let kept: Vec<_> = state
            .transitions
            .iter()
            .copied()
            .filter(|t| survivors.contains(&t.target))
            .collect();
        result.add_state_at(&state.label, state.marked, &kept, state.id == initial, state.id)?;
    }

    let mut special = source.special().clone();
    special.remap_states(|id| survivors.contains(&id).then_some(id));
    result.import_special(special)?;
    result.renumber_states()?;
    inverted.close()?;
    Ok(result)
}

/// `accessible` then `coaccessible`. The accessible pass runs first because
/// it is the cheaper of the two.
pub fn trim(
    source: &Automaton,
    header_path: impl AsRef<Path>,
    body_path: impl AsRef<Path>,
) -> SyndesResult<Option<Automaton>> {
    let scratch = tempfile::tempdir()
        .map_err(|e| StoreError::io(header_path.as_ref(), e))?;
    let Some(reachable) = accessible(
        source,
        scratch.path().join("accessible.hdr"),
        scratch.path().join("accessible.bdy"),
    )?
    else {
        return Ok(None);
    };
    let trimmed = coaccessible(&reachable, header_path, body_path)?;
    reachable.close()?;
    Ok(Some(trimmed))
}
