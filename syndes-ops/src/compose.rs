//! Synchronized composition of a plant with one copy per controller,
//! producing a U-Structure.
//!
//! A U-State is a `(K+1)`-tuple of plant states: slot 0 is the plant's view,
//! slots `1..=K` each controller's estimate. Tuples are packed into state IDs
//! with the positional encoding over base `n + 1`; events become label
//! vectors recording which slots took part in a step.

use rustc_hash::FxHashSet;
use smallvec::smallvec;
use std::path::Path;
use syndes_core::{
    combine_ids, separate_ids, AutomatonKind, CommunicationData, CommunicationRole, EventId,
    LabelVector, OperationError, RoleVector, StateId, SyndesResult, TransitionData,
    MAX_LABEL_LENGTH, SILENT,
};
use syndes_storage::{Automaton, StoreConfig};
use tracing::debug;

/// A `(K+1)`-tuple of plant state IDs.
type Tuple = Vec<u64>;

struct Composer<'a> {
    source: &'a Automaton,
    /// Plant state count; tuple packing runs over base `n + 1`.
    n: u64,
    k: usize,
    bad: FxHashSet<(u64, u32, u64)>,
    seen: FxHashSet<u64>,
    /// Discovery order, walked again by the communications pass.
    order: Vec<u64>,
    stack: Vec<Tuple>,
}

impl<'a> Composer<'a> {
    fn combined(&self, tuple: &[u64]) -> SyndesResult<StateId> {
        combine_ids(tuple, self.n)
            .map(StateId::new)
            .ok_or_else(|| {
                OperationError::CompositeOverflow {
                    n_states: self.n,
                    slots: self.k + 1,
                }
                .into()
            })
    }

    /// Combined label `L0_L1_..._LK` from the component labels.
    fn tuple_label(&self, tuple: &[u64]) -> SyndesResult<String> {
        let mut parts = Vec::with_capacity(tuple.len());
        for &slot in tuple {
            let label = self
                .source
                .get_state_shallow(StateId::new(slot))?
                .map(|s| s.label)
                .unwrap_or_default();
            parts.push(label);
        }
        Ok(parts.join("_"))
    }

    /// Add the combined state for `tuple` if it is new, and queue it for
    /// expansion.
    fn discover(
        &mut self,
        u: &mut Automaton,
        tuple: Tuple,
        is_initial: bool,
    ) -> SyndesResult<StateId> {
        let id = self.combined(&tuple)?;
        if self.seen.insert(id.get()) {
            let label = self.tuple_label(&tuple)?;
            u.add_state_at(&label, false, &[], is_initial, id)?;
            self.order.push(id.get());
            self.stack.push(tuple);
        }
        Ok(id)
    }
}

/// Look up or create the event for a label vector. Combined events carry
/// all-true flag vectors; the U-Structure treats them opaquely.
fn intern_event(u: &mut Automaton, vector: &LabelVector) -> SyndesResult<EventId> {
    let label = vector.to_string();
    if let Some(id) = u.events().id_of(&label) {
        return Ok(id);
    }
    let k = u.number_of_controllers() as usize;
    u.add_event(&label, &vec![true; k], &vec![true; k])
}

/// Synchronized composition of `source` with one copy per controller.
///
/// Returns `Ok(None)` when the source has no initial state. The composite
/// state space is packed over base `n + 1`; a plant with too many states for
/// the 64-bit packing is a composite-overflow error.
pub fn synchronized_composition(
    source: &Automaton,
    header_path: impl AsRef<Path>,
    body_path: impl AsRef<Path>,
) -> SyndesResult<Option<Automaton>> {
    let initial = source.initial_state();
    if initial.is_null() {
        return Ok(None);
    }
    let k = source.number_of_controllers() as usize;
    let n = source.number_of_states();
    let Some(max_combined) = combine_ids(&vec![n; k + 1], n) else {
        return Err(OperationError::CompositeOverflow {
            n_states: n,
            slots: k + 1,
        }
        .into());
    };

    let mut u = Automaton::create(
        AutomatonKind::UStructure,
        header_path.as_ref(),
        body_path.as_ref(),
        &StoreConfig {
            state_capacity: max_combined,
            transition_capacity: source.transition_capacity(),
            label_length: ((source.label_length() + 1) * (k as u32 + 1)).min(MAX_LABEL_LENGTH),
            n_controllers: source.number_of_controllers(),
        },
    )?;

    let mut composer = Composer {
        source,
        n,
        k,
        bad: source
            .bad_transitions()
            .iter()
            .map(|d| (d.initial.get(), d.event.get(), d.target.get()))
            .collect(),
        seen: FxHashSet::default(),
        order: Vec::new(),
        stack: Vec::new(),
    };

    composer.discover(&mut u, vec![initial.get(); k + 1], true)?;
    while let Some(tuple) = composer.stack.pop() {
        let current = composer.combined(&tuple)?;
        let mut slots = Vec::with_capacity(k + 1);
        for &slot in &tuple {
            let Some(state) = source.get_state(StateId::new(slot))? else {
                break;
            };
            slots.push(state);
        }
        if slots.len() != k + 1 {
            continue;
        }

        // Plant-driven moves: slot 0 takes a transition; every controller
        // that observes the event must match it, everyone else holds still.
        for plant_move in &slots[0].transitions {
            let Some(event) = source.event(plant_move.event) else {
                continue;
            };
            let mut target = tuple.clone();
            target[0] = plant_move.target.get();
            let mut vector_slots = Vec::with_capacity(k + 1);
            vector_slots.push(event.label().to_owned());
            let mut matched = true;
            for i in 1..=k {
                if event.is_observable_to(i) {
                    match slots[i].targets_on(plant_move.event).next() {
                        Some(next) => {
                            target[i] = next.get();
                            vector_slots.push(event.label().to_owned());
                        }
                        None => {
                            matched = false;
                            break;
                        }
                    }
                } else {
                    vector_slots.push(SILENT.to_owned());
                }
            }
            if !matched {
                continue;
            }

            // Violation flags. A controller refuses when it sees the event,
            // can disable it, and its own local step is bad.
            let plant_bad = composer.bad.contains(&(
                tuple[0],
                plant_move.event.get(),
                plant_move.target.get(),
            ));
            let mut any_controller_refuses = false;
            let mut every_controllable_step_bad = true;
            for i in 1..=k {
                if !event.is_controllable_by(i) {
                    continue;
                }
                let local_bad = event.is_observable_to(i)
                    && composer
                        .bad
                        .contains(&(tuple[i], plant_move.event.get(), target[i]));
                if local_bad {
                    any_controller_refuses = true;
                } else {
                    every_controllable_step_bad = false;
                }
            }
            let unconditional = plant_bad && !any_controller_refuses;
            let conditional =
                !plant_bad && event.controllable_count() >= 2 && every_controllable_step_bad;

            let vector = LabelVector::from_slots(vector_slots);
            let event_id = intern_event(&mut u, &vector)?;
            let target_id = composer.discover(&mut u, target, false)?;
            u.add_transition(current, event_id, target_id)?;
            let data = TransitionData::new(current, event_id, target_id);
            if unconditional {
                u.add_unconditional_violation(data)?;
            } else if conditional {
                u.add_conditional_violation(data)?;
            }
        }

        // Controller-private moves: a single estimate slot advances on an
        // event its controller cannot observe.
        for i in 1..=k {
            for private_move in &slots[i].transitions {
                let Some(event) = source.event(private_move.event) else {
                    continue;
                };
                if event.is_observable_to(i) {
                    continue;
                }
                let mut target = tuple.clone();
                target[i] = private_move.target.get();
                let mut vector_slots = vec![SILENT.to_owned(); k + 1];
                vector_slots[i] = event.label().to_owned();
                let vector = LabelVector::from_slots(vector_slots);
                let event_id = intern_event(&mut u, &vector)?;
                let target_id = composer.discover(&mut u, target, false)?;
                u.add_transition(current, event_id, target_id)?;
            }
        }
    }
    debug!(
        states = composer.order.len(),
        events = u.events().len(),
        "synchronized composition walk complete"
    );

    find_potential_communications(&mut u, &composer)?;
    u.renumber_states()?;
    Ok(Some(u))
}

/// Enumerate potential communications over the produced event set.
///
/// A plant-observable event joined with a controller-private event that is
/// compatible with it yields a communication: the private slot's controller
/// is told what a watching controller observed. At every state where both
/// events are enabled, the join labels a new transition whose target merges
/// the two moves.
fn find_potential_communications(u: &mut Automaton, composer: &Composer<'_>) -> SyndesResult<()> {
    let k = composer.k;

    struct Candidate {
        observable: EventId,
        private: EventId,
        join: LabelVector,
        receiver: usize,
        senders: Vec<usize>,
    }

    let mut observable_events: Vec<(EventId, LabelVector)> = Vec::new();
    let mut private_events: Vec<(EventId, LabelVector, usize)> = Vec::new();
    for event in u.events().iter() {
        let Some(vector) = event.vector() else {
            continue;
        };
        if !vector.is_silent(0) {
            observable_events.push((event.id(), vector));
        } else {
            let active: Vec<usize> = vector.active_slots().collect();
            if let [slot] = active[..] {
                private_events.push((event.id(), vector, slot));
            }
        }
    }

    let mut candidates = Vec::new();
    for (observable, ov) in &observable_events {
        for (private, pv, receiver) in &private_events {
            // The told controller must have been silent in the observable
            // event, and somebody must have seen it.
            if !ov.is_silent(*receiver) || !ov.compatible(pv) {
                continue;
            }
            let senders: Vec<usize> = (1..=k).filter(|&i| !ov.is_silent(i)).collect();
            if senders.is_empty() {
                continue;
            }
            let Some(join) = ov.join(pv) else {
                continue;
            };
            candidates.push(Candidate {
                observable: *observable,
                private: *private,
                join,
                receiver: *receiver,
                senders,
            });
        }
    }
    if candidates.is_empty() {
        return Ok(());
    }

    let mut added: FxHashSet<(u64, u32, u64)> = FxHashSet::default();
    for &raw_id in &composer.order {
        let state_id = StateId::new(raw_id);
        let Some(state) = u.get_state(state_id)? else {
            continue;
        };
        for candidate in &candidates {
            let observable_targets: Vec<StateId> = state.targets_on(candidate.observable).collect();
            if observable_targets.is_empty() {
                continue;
            }
            let private_targets: Vec<StateId> = state.targets_on(candidate.private).collect();
            for &observed in &observable_targets {
                for &told in &private_targets {
                    let mut target = separate_ids(observed.get(), composer.n, k + 1);
                    let told_tuple = separate_ids(told.get(), composer.n, k + 1);
                    target[candidate.receiver] = told_tuple[candidate.receiver];
                    let target_id = combine_ids(&target, composer.n)
                        .map(StateId::new)
                        .ok_or_else(|| OperationError::CompositeOverflow {
                            n_states: composer.n,
                            slots: k + 1,
                        })?;
                    let join_event = intern_event(u, &candidate.join)?;
                    if !added.insert((raw_id, join_event.get(), target_id.get())) {
                        continue;
                    }
                    if !u.state_exists(target_id)? {
                        let label = composer.tuple_label(&target)?;
                        u.add_state_at(&label, false, &[], false, target_id)?;
                    }
                    u.add_transition(state_id, join_event, target_id)?;
                    let data = TransitionData::new(state_id, join_event, target_id);
                    for &sender in &candidate.senders {
                        let mut roles: RoleVector = smallvec![CommunicationRole::None; k];
                        roles[sender - 1] = CommunicationRole::Sender;
                        roles[candidate.receiver - 1] = CommunicationRole::Receiver;
                        u.add_potential_communication(CommunicationData::new(data, roles))?;
                    }
                }
            }
        }
    }
    debug!(
        communications = u.potential_communications().len(),
        "potential-communication discovery complete"
    );
    Ok(())
}
