//! Synchronized-composition scenario: a 2-controller plant and its
//! U-Structure, violation flags included.

use syndes_core::{AutomatonKind, TransitionData};
use syndes_ops::synchronized_composition;
use syndes_test_utils::{
    has_transition, state_by_label, transition_ids, two_controller_plant, TestDir,
};

#[test]
fn initial_state_is_the_diagonal_tuple() {
    let dir = TestDir::new();
    let plant = two_controller_plant(&dir);
    let (hdr, bdy) = dir.paths("ustructure");
    let u = synchronized_composition(&plant, hdr, bdy)
        .expect("compose")
        .expect("has initial");

    assert_eq!(u.kind(), AutomatonKind::UStructure);
    assert_eq!(u.number_of_controllers(), 2);
    let initial = state_by_label(&u, "1_1_1").expect("diagonal initial state");
    assert_eq!(u.initial_state(), initial.id);
    assert!(!initial.marked);

    // Every state is a (K+1)-tuple label.
    for state in u.scan_states().expect("scan") {
        let state = state.expect("state");
        assert_eq!(state.label.split('_').count(), 3, "label {}", state.label);
    }
}

#[test]
fn vectorized_moves_from_the_initial_state() {
    let dir = TestDir::new();
    let plant = two_controller_plant(&dir);
    let (hdr, bdy) = dir.paths("ustructure-moves");
    let u = synchronized_composition(&plant, hdr, bdy)
        .expect("compose")
        .expect("has initial");

    // Plant-driven moves carry each observing controller along.
    assert!(has_transition(&u, "1_1_1", "<a_a_*>", "2_2_1"));
    assert!(has_transition(&u, "1_1_1", "<b_*_b>", "3_1_3"));
    // Estimate-only moves advance a single controller slot.
    assert!(has_transition(&u, "1_1_1", "<*_b_*>", "1_3_1"));
    assert!(has_transition(&u, "1_1_1", "<*_*_a>", "1_1_2"));
}

#[test]
fn violation_flags_follow_the_bad_transition() {
    let dir = TestDir::new();
    let plant = two_controller_plant(&dir);
    let (hdr, bdy) = dir.paths("ustructure-violations");
    let u = synchronized_composition(&plant, hdr, bdy)
        .expect("compose")
        .expect("has initial");

    // The plant's bad `o` step with no controller able to refuse.
    let (from, event, to) = transition_ids(&u, "5_4_4", "<o_o_o>", "7_6_6").expect("transition");
    assert!(
        u.unconditional_violations()
            .contains(&TransitionData::new(from, event, to)),
        "5_4_4 -o-> 7_6_6 should be an unconditional violation"
    );

    // The good `o` step that every controller would locally refuse.
    let (from, event, to) = transition_ids(&u, "4_5_5", "<o_o_o>", "6_7_7").expect("transition");
    assert!(
        u.conditional_violations()
            .contains(&TransitionData::new(from, event, to)),
        "4_5_5 -o-> 6_7_7 should be a conditional violation"
    );
    // And neither is in the other list.
    assert!(!u
        .unconditional_violations()
        .contains(&TransitionData::new(from, event, to)));
}

#[test]
fn potential_communications_join_observation_and_estimate() {
    let dir = TestDir::new();
    let plant = two_controller_plant(&dir);
    let (hdr, bdy) = dir.paths("ustructure-comms");
    let u = synchronized_composition(&plant, hdr, bdy)
        .expect("compose")
        .expect("has initial");

    // Controller 1 can tell controller 2 about `a`: the join of <a_a_*> and
    // <*_*_a> labels a transition into the fully synchronized estimate.
    let (from, event, to) = transition_ids(&u, "1_1_1", "<a_a_a>", "2_2_2").expect("transition");
    let comm = u
        .potential_communications()
        .iter()
        .find(|c| c.transition == TransitionData::new(from, event, to))
        .expect("communication recorded");
    assert_eq!(comm.sender(), Some(1));
    assert_eq!(comm.receivers().collect::<Vec<_>>(), vec![2]);

    // Symmetrically for `b`.
    let (from, event, to) = transition_ids(&u, "1_1_1", "<b_b_b>", "3_3_3").expect("transition");
    let comm = u
        .potential_communications()
        .iter()
        .find(|c| c.transition == TransitionData::new(from, event, to))
        .expect("communication recorded");
    assert_eq!(comm.sender(), Some(2));
    assert_eq!(comm.receivers().collect::<Vec<_>>(), vec![1]);
}

#[test]
fn composition_without_initial_state_is_none() {
    let dir = TestDir::new();
    let mut plant = dir.automaton("no-initial", 2);
    plant
        .add_event("a", &[true, false], &[true, false])
        .expect("event");
    plant.add_state("1", true, false).expect("state");

    let (hdr, bdy) = dir.paths("no-initial-u");
    assert!(synchronized_composition(&plant, hdr, bdy)
        .expect("compose")
        .is_none());
}

#[test]
fn ustructure_ids_are_dense_after_composition() {
    let dir = TestDir::new();
    let plant = two_controller_plant(&dir);
    let (hdr, bdy) = dir.paths("ustructure-dense");
    let u = synchronized_composition(&plant, hdr, bdy)
        .expect("compose")
        .expect("has initial");

    for id in 1..=u.number_of_states() {
        assert!(u
            .state_exists(syndes_core::StateId::new(id))
            .expect("exists"));
    }
}
