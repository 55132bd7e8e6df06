//! Crush: subset construction over one controller's view.

use syndes_core::{
    AutomatonKind, CombineCosts, CommunicationRole, NashCommunicationData, StateId, TransitionData,
};
use syndes_ops::crush;
use syndes_storage::{Automaton, StoreConfig};
use syndes_test_utils::{has_transition, state_by_label, state_labels, TestDir};

/// A one-controller U-Structure built by hand: vectorized events over
/// `(plant, controller)` slots.
fn small_ustructure(dir: &TestDir, name: &str) -> Automaton {
    let (hdr, bdy) = dir.paths(name);
    let mut u = Automaton::create(
        AutomatonKind::UStructure,
        hdr,
        bdy,
        &StoreConfig {
            n_controllers: 1,
            ..Default::default()
        },
    )
    .expect("create");
    // `<*_a>` is silent to the plant, hence unobservable; `<b_b>` is seen.
    u.add_event("<*_a>", &[true], &[true]).expect("event");
    u.add_event("<b_b>", &[true], &[true]).expect("event");
    u
}

#[test]
fn crush_is_identity_when_everything_is_observable() {
    let dir = TestDir::new();
    let (hdr, bdy) = dir.paths("all-observable");
    let mut u = Automaton::create(
        AutomatonKind::UStructure,
        hdr,
        bdy,
        &StoreConfig {
            n_controllers: 1,
            ..Default::default()
        },
    )
    .expect("create");
    let e = u.add_event("<b_b>", &[true], &[true]).expect("event");
    let s1 = u.add_state("P", false, true).expect("state");
    let s2 = u.add_state("Q", true, false).expect("state");
    u.add_transition(s1, e, s2).expect("transition");
    u.add_transition(s2, e, s2).expect("transition");

    let (hdr, bdy) = dir.paths("all-observable-crush");
    let crushed = crush(&u, 1, CombineCosts::Sum, hdr, bdy)
        .expect("crush")
        .expect("valid input");

    // Identity up to relabeling: singleton closures.
    let mut labels = state_labels(&crushed);
    labels.sort();
    assert_eq!(labels, vec!["<P>", "<Q>"]);
    assert!(has_transition(&crushed, "<P>", "<b_b>", "<Q>"));
    assert!(has_transition(&crushed, "<Q>", "<b_b>", "<Q>"));
    assert_eq!(
        crushed.initial_state(),
        state_by_label(&crushed, "<P>").expect("initial").id
    );
}

#[test]
fn crush_merges_states_the_controller_cannot_distinguish() {
    let dir = TestDir::new();
    let mut u = small_ustructure(&dir, "merging");
    let silent = u.events().id_of("<*_a>").expect("event");
    let seen = u.events().id_of("<b_b>").expect("event");
    let a = u.add_state("A", false, true).expect("state");
    let b = u.add_state("B", false, false).expect("state");
    let c = u.add_state("C", true, false).expect("state");
    u.add_transition(a, silent, b).expect("transition");
    u.add_transition(b, seen, c).expect("transition");

    let (hdr, bdy) = dir.paths("merging-crush");
    let crushed = crush(&u, 1, CombineCosts::Sum, hdr, bdy)
        .expect("crush")
        .expect("valid input");

    let mut labels = state_labels(&crushed);
    labels.sort();
    assert_eq!(labels, vec!["<A,B>", "<C>"]);
    assert!(has_transition(&crushed, "<A,B>", "<b_b>", "<C>"));
    // The silent event labels no crush transition.
    assert!(state_by_label(&crushed, "<C>").expect("state").marked);
}

#[test]
fn crush_combines_nash_costs_under_the_chosen_policy() {
    let dir = TestDir::new();

    for (policy, expected_cost) in [
        (CombineCosts::Sum, 8),
        (CombineCosts::Max, 5),
        (CombineCosts::Average, 4),
    ] {
        let mut u = small_ustructure(&dir, &format!("nash-{policy:?}"));
        let silent = u.events().id_of("<*_a>").expect("event");
        let seen = u.events().id_of("<b_b>").expect("event");
        let a = u.add_state("A", false, true).expect("state");
        let b = u.add_state("B", false, false).expect("state");
        let c = u.add_state("C", false, false).expect("state");
        let d = u.add_state("D", true, false).expect("state");
        u.add_transition(a, silent, b).expect("transition");
        u.add_transition(c, silent, d).expect("transition");
        u.add_transition(a, seen, c).expect("transition");
        u.add_transition(b, seen, d).expect("transition");
        let roles = [CommunicationRole::Sender].into_iter().collect();
        assert!(u
            .add_nash_communication(NashCommunicationData::new(
                TransitionData::new(a, seen, c),
                roles,
                3,
                0.25,
            ))
            .expect("nash"));
        let roles = [CommunicationRole::Sender].into_iter().collect();
        assert!(u
            .add_nash_communication(NashCommunicationData::new(
                TransitionData::new(b, seen, d),
                roles,
                5,
                0.5,
            ))
            .expect("nash"));

        let (hdr, bdy) = dir.paths(&format!("nash-{policy:?}-crush"));
        let crushed = crush(&u, 1, policy, hdr, bdy)
            .expect("crush")
            .expect("valid input");

        // Both member transitions merge into <A,B> -<b_b>-> <C,D>.
        let mut labels = state_labels(&crushed);
        labels.sort();
        assert_eq!(labels, vec!["<A,B>", "<C,D>"]);
        assert_eq!(crushed.nash_communications().len(), 1);
        let nash = &crushed.nash_communications()[0];
        assert_eq!(nash.cost(), expected_cost, "policy {policy:?}");
        assert_eq!(nash.probability(), 0.75);
    }
}

#[test]
fn crush_rejects_bad_inputs() {
    let dir = TestDir::new();
    let u = small_ustructure(&dir, "rejects");

    // Controller index out of range.
    let (hdr, bdy) = dir.paths("rejects-out-of-range");
    assert!(crush(&u, 2, CombineCosts::Sum, hdr, bdy)
        .expect("crush")
        .is_none());
    // No initial state.
    let (hdr, bdy) = dir.paths("rejects-no-initial");
    assert!(crush(&u, 1, CombineCosts::Sum, hdr, bdy)
        .expect("crush")
        .is_none());

    // Plain automata are not crushable.
    let plain = dir.automaton("plain", 1);
    let (hdr, bdy) = dir.paths("rejects-plain");
    assert!(crush(&plain, 1, CombineCosts::Sum, hdr, bdy)
        .expect("crush")
        .is_none());
}
