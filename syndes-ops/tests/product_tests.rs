//! Intersection and union scenarios over the Figure 2.1 / 2.2 machines.

use syndes_ops::{intersection, union};
use syndes_test_utils::{fig_2_1, fig_2_2, has_transition, state_by_label, state_labels, TestDir};

#[test]
fn intersection_on_the_common_alphabet() {
    let dir = TestDir::new();
    let first = fig_2_1(&dir);
    let second = fig_2_2(&dir);
    let (hdr, bdy) = dir.paths("intersection");
    let result = intersection(&first, &second, hdr, bdy)
        .expect("intersection")
        .expect("compatible operands");

    // Result alphabet is the common one.
    let labels: Vec<&str> = result.events().iter().map(|e| e.label()).collect();
    assert_eq!(labels, vec!["a", "b"]);

    let mut states = state_labels(&result);
    states.sort();
    assert_eq!(states, vec!["x_one", "x_zero"]);
    assert!(has_transition(&result, "x_zero", "a", "x_one"));
    assert!(has_transition(&result, "x_one", "a", "x_one"));

    let initial = state_by_label(&result, "x_zero").expect("initial pair");
    assert_eq!(result.initial_state(), initial.id);
    assert!(!initial.marked);
    assert!(state_by_label(&result, "x_one").expect("marked pair").marked);
}

#[test]
fn intersection_is_commutative_up_to_label_order() {
    let dir = TestDir::new();
    let first = fig_2_1(&dir);
    let second = fig_2_2(&dir);

    let (hdr, bdy) = dir.paths("ab");
    let ab = intersection(&first, &second, hdr, bdy)
        .expect("intersection")
        .expect("compatible");
    let (hdr, bdy) = dir.paths("ba");
    let ba = intersection(&second, &first, hdr, bdy)
        .expect("intersection")
        .expect("compatible");

    assert_eq!(ab.number_of_states(), ba.number_of_states());
    let swap = |label: &str| -> String {
        let mut parts: Vec<&str> = label.split('_').collect();
        parts.reverse();
        parts.join("_")
    };
    for state in ab.scan_states().expect("scan") {
        let state = state.expect("state");
        for transition in &state.transitions {
            let event = ab.event(transition.event).expect("event").label().to_owned();
            let target = ab
                .get_state(transition.target)
                .expect("read")
                .expect("present");
            assert!(
                has_transition(&ba, &swap(&state.label), &event, &swap(&target.label)),
                "{} -{event}-> {} has no mirror",
                state.label,
                target.label
            );
        }
    }
}

#[test]
fn intersection_rejects_mismatched_controller_counts() {
    let dir = TestDir::new();
    let first = fig_2_1(&dir);
    let mut second = dir.automaton("two-controllers", 2);
    second
        .add_event("a", &[true, true], &[true, true])
        .expect("event");
    second.add_state("s", false, true).expect("state");

    let (hdr, bdy) = dir.paths("mismatch");
    assert!(intersection(&first, &second, hdr, bdy)
        .expect("intersection")
        .is_none());
}

#[test]
fn union_is_parallel_composition() {
    let dir = TestDir::new();
    let first = fig_2_1(&dir);
    let second = fig_2_2(&dir);
    let (hdr, bdy) = dir.paths("union");
    let result = union(&first, &second, hdr, bdy)
        .expect("union")
        .expect("compatible operands");

    // Result alphabet is the union.
    let labels: Vec<&str> = result.events().iter().map(|e| e.label()).collect();
    assert_eq!(labels, vec!["a", "b", "g"]);

    let mut states = state_labels(&result);
    states.sort();
    assert_eq!(
        states,
        vec!["x_one", "x_zero", "y_one", "y_zero", "z_one", "z_zero"]
    );

    // Shared events synchronize.
    assert!(has_transition(&result, "x_zero", "a", "x_one"));
    assert!(has_transition(&result, "z_zero", "a", "y_one"));
    // `g` is private to the first operand, so the second slot stays put.
    assert!(has_transition(&result, "x_zero", "g", "z_zero"));
    assert!(has_transition(&result, "x_one", "g", "z_one"));
    assert!(has_transition(&result, "z_one", "g", "y_one"));
    // `b` requires both to move; `zero` has no `b`.
    assert!(!has_transition(&result, "z_zero", "b", "z_zero"));
    assert!(has_transition(&result, "z_one", "b", "z_zero"));

    // Marked iff both components are marked.
    for (label, marked) in [
        ("x_zero", false),
        ("x_one", true),
        ("y_one", false),
        ("z_one", true),
        ("z_zero", false),
    ] {
        assert_eq!(
            state_by_label(&result, label).expect("state").marked,
            marked,
            "marking of {label}"
        );
    }
}

#[test]
fn union_reduces_to_intersection_on_equal_alphabets() {
    let dir = TestDir::new();
    let first = fig_2_2(&dir);
    let mut second = dir.automaton("fig-2-2-copy", 1);
    for event in ["a", "b"] {
        second.add_event(event, &[true], &[true]).expect("event");
    }
    second.add_state("zero", false, true).expect("state");
    second.add_state("one", true, false).expect("state");
    let a = second.events().id_of("a").expect("a");
    let b = second.events().id_of("b").expect("b");
    second
        .add_transition(syndes_core::StateId::new(1), a, syndes_core::StateId::new(2))
        .expect("transition");
    second
        .add_transition(syndes_core::StateId::new(2), a, syndes_core::StateId::new(2))
        .expect("transition");
    second
        .add_transition(syndes_core::StateId::new(2), b, syndes_core::StateId::new(1))
        .expect("transition");

    let (hdr, bdy) = dir.paths("union-eq");
    let unioned = union(&first, &second, hdr, bdy).expect("union").expect("ok");
    let (hdr, bdy) = dir.paths("intersection-eq");
    let intersected = intersection(&first, &second, hdr, bdy)
        .expect("intersection")
        .expect("ok");

    let mut union_states = state_labels(&unioned);
    let mut intersection_states = state_labels(&intersected);
    union_states.sort();
    intersection_states.sort();
    assert_eq!(union_states, intersection_states);
    for state in unioned.scan_states().expect("scan") {
        let state = state.expect("state");
        for transition in &state.transitions {
            let event = unioned
                .event(transition.event)
                .expect("event")
                .label()
                .to_owned();
            let target = unioned
                .get_state(transition.target)
                .expect("read")
                .expect("present");
            assert!(has_transition(&intersected, &state.label, &event, &target.label));
        }
    }
}

#[test]
fn intersection_carries_bad_transitions_from_either_operand() {
    let dir = TestDir::new();
    let mut first = dir.automaton("bad-left", 1);
    first.add_event("a", &[true], &[true]).expect("event");
    first.add_state("p", false, true).expect("state");
    first.add_state("q", true, false).expect("state");
    let a = first.events().id_of("a").expect("a");
    first
        .add_transition(syndes_core::StateId::new(1), a, syndes_core::StateId::new(2))
        .expect("transition");
    first
        .mark_transition_as_bad(
            syndes_core::StateId::new(1),
            a,
            syndes_core::StateId::new(2),
        )
        .expect("mark");

    let mut second = dir.automaton("bad-right", 1);
    second.add_event("a", &[true], &[true]).expect("event");
    second.add_state("r", false, true).expect("state");
    second.add_state("s", true, false).expect("state");
    let a2 = second.events().id_of("a").expect("a");
    second
        .add_transition(syndes_core::StateId::new(1), a2, syndes_core::StateId::new(2))
        .expect("transition");

    let (hdr, bdy) = dir.paths("bad-product");
    let result = intersection(&first, &second, hdr, bdy)
        .expect("intersection")
        .expect("ok");
    let ids = syndes_test_utils::transition_ids(&result, "p_r", "a", "q_s").expect("triple");
    assert_eq!(
        result.bad_transitions(),
        &[syndes_core::TransitionData::new(ids.0, ids.1, ids.2)]
    );
}
