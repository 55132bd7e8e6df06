//! syndes Test Utilities
//!
//! Centralized fixtures for the workspace test suites: temp-dir automaton
//! construction, the textbook machines the seed scenarios use, and label-based
//! assertions (operation results are renumbered, so tests address states by
//! label rather than by ID).

use std::path::PathBuf;
use syndes_core::{AutomatonKind, EventId, StateId};
use syndes_storage::{Automaton, State, StoreConfig};
use tempfile::TempDir;

/// A temp directory for store files, cleaned up on drop.
pub struct TestDir {
    dir: TempDir,
}

impl TestDir {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("create temp dir"),
        }
    }

    /// Header/body paths for a named automaton inside this directory.
    pub fn paths(&self, name: &str) -> (PathBuf, PathBuf) {
        (
            self.dir.path().join(format!("{name}.hdr")),
            self.dir.path().join(format!("{name}.bdy")),
        )
    }

    /// Create an empty automaton with `n_controllers` controllers.
    pub fn automaton(&self, name: &str, n_controllers: u32) -> Automaton {
        let (hdr, bdy) = self.paths(name);
        Automaton::create(
            AutomatonKind::Automaton,
            hdr,
            bdy,
            &StoreConfig {
                n_controllers,
                ..Default::default()
            },
        )
        .expect("create automaton")
    }
}

impl Default for TestDir {
    fn default() -> Self {
        Self::new()
    }
}

/// Declarative single-controller fixture: all events observable and
/// controllable, states listed as `(label, marked, initial)`, transitions as
/// `(from, event, to)` labels.
pub fn build_automaton(
    dir: &TestDir,
    name: &str,
    events: &[&str],
    states: &[(&str, bool, bool)],
    transitions: &[(&str, &str, &str)],
) -> Automaton {
    let mut automaton = dir.automaton(name, 1);
    for &label in events {
        let id = automaton
            .add_event(label, &[true], &[true])
            .expect("add event");
        assert!(!id.is_null(), "duplicate event {label}");
    }
    for &(label, marked, initial) in states {
        let id = automaton
            .add_state(label, marked, initial)
            .expect("add state");
        assert!(!id.is_null(), "state {label} rejected");
    }
    for &(from, event, to) in transitions {
        add_transition_by_labels(&mut automaton, from, event, to);
    }
    automaton
}

/// Figure 2.1: three states over `{a, b, g}`, `x` initial, `x` and `z`
/// marked.
pub fn fig_2_1(dir: &TestDir) -> Automaton {
    build_automaton(
        dir,
        "fig-2-1",
        &["a", "b", "g"],
        &[("x", true, true), ("y", false, false), ("z", true, false)],
        &[
            ("x", "a", "x"),
            ("x", "g", "z"),
            ("y", "a", "x"),
            ("y", "b", "y"),
            ("z", "b", "z"),
            ("z", "a", "y"),
            ("z", "g", "y"),
        ],
    )
}

/// Figure 2.2: two states over `{a, b}`, `zero` initial, `one` marked.
pub fn fig_2_2(dir: &TestDir) -> Automaton {
    build_automaton(
        dir,
        "fig-2-2",
        &["a", "b"],
        &[("zero", false, true), ("one", true, false)],
        &[
            ("zero", "a", "one"),
            ("one", "a", "one"),
            ("one", "b", "zero"),
        ],
    )
}

/// Figure 2.12: seven states over `{a, b, g}`, `zero` initial, `two` marked.
pub fn fig_2_12(dir: &TestDir) -> Automaton {
    build_automaton(
        dir,
        "fig-2-12",
        &["a", "b", "g"],
        &[
            ("zero", false, true),
            ("one", false, false),
            ("two", true, false),
            ("three", false, false),
            ("four", false, false),
            ("five", false, false),
            ("six", false, false),
        ],
        &[
            ("zero", "a", "one"),
            ("one", "a", "three"),
            ("one", "b", "two"),
            ("one", "g", "five"),
            ("two", "g", "zero"),
            ("three", "b", "four"),
            ("four", "g", "four"),
            ("four", "a", "three"),
            ("six", "a", "three"),
            ("six", "b", "two"),
        ],
    )
}

/// The two-controller plant of the synchronized-composition scenario:
/// events `a` (seen and controlled by controller 1 alone), `b` (controller 2
/// alone), `o` (both); seven marked states with `5 -o-> 7` tagged bad.
pub fn two_controller_plant(dir: &TestDir) -> Automaton {
    let mut plant = dir.automaton("two-controller-plant", 2);
    plant
        .add_event("a", &[true, false], &[true, false])
        .expect("add event");
    plant
        .add_event("b", &[false, true], &[false, true])
        .expect("add event");
    plant
        .add_event("o", &[true, true], &[true, true])
        .expect("add event");
    for id in 1..=7u64 {
        plant
            .add_state(&id.to_string(), true, id == 1)
            .expect("add state");
    }
    for (from, event, to) in [
        ("1", "a", "2"),
        ("1", "b", "3"),
        ("2", "b", "4"),
        ("3", "a", "5"),
        ("4", "o", "6"),
        ("5", "o", "7"),
    ] {
        add_transition_by_labels(&mut plant, from, event, to);
    }
    let o = plant.events().id_of("o").expect("event o");
    assert!(plant
        .mark_transition_as_bad(StateId::new(5), o, StateId::new(7))
        .expect("mark bad"));
    plant
}

// ============================================================================
// LABEL-BASED ASSERTIONS
// ============================================================================

/// Find a state by its label, scanning the body.
pub fn state_by_label(automaton: &Automaton, label: &str) -> Option<State> {
    automaton
        .scan_states()
        .expect("scan states")
        .map(|state| state.expect("read state"))
        .find(|state| state.label == label)
}

/// All state labels in ascending ID order.
pub fn state_labels(automaton: &Automaton) -> Vec<String> {
    automaton
        .scan_states()
        .expect("scan states")
        .map(|state| state.expect("read state").label)
        .collect()
}

/// Whether `from -event-> to` is present, addressed by labels.
pub fn has_transition(automaton: &Automaton, from: &str, event: &str, to: &str) -> bool {
    let Some(event_id) = automaton.events().id_of(event) else {
        return false;
    };
    let (Some(from_state), Some(to_state)) = (
        state_by_label(automaton, from),
        state_by_label(automaton, to),
    ) else {
        return false;
    };
    from_state.has_transition(event_id, to_state.id)
}

/// The `(StateId, EventId, StateId)` triple for a labeled transition, for
/// matching against special-transition lists.
pub fn transition_ids(
    automaton: &Automaton,
    from: &str,
    event: &str,
    to: &str,
) -> Option<(StateId, EventId, StateId)> {
    let event_id = automaton.events().id_of(event)?;
    let from_state = state_by_label(automaton, from)?;
    let to_state = state_by_label(automaton, to)?;
    Some((from_state.id, event_id, to_state.id))
}

fn add_transition_by_labels(automaton: &mut Automaton, from: &str, event: &str, to: &str) {
    let event_id = automaton
        .events()
        .id_of(event)
        .unwrap_or_else(|| panic!("unknown event {event}"));
    let from_state =
        state_by_label(automaton, from).unwrap_or_else(|| panic!("unknown state {from}"));
    let to_state = state_by_label(automaton, to).unwrap_or_else(|| panic!("unknown state {to}"));
    assert!(
        automaton
            .add_transition(from_state.id, event_id, to_state.id)
            .expect("add transition"),
        "transition {from} -{event}-> {to} rejected"
    );
}
