//! Events and the insertion-ordered event set.

use crate::{EventId, LabelVector};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::hash::{Hash, Hasher};

/// Per-controller flag vector. Controller counts are small (at most 10), so
/// the flags live inline.
pub type ControllerFlags = SmallVec<[bool; 10]>;

/// An event of a discrete-event system.
///
/// Identity is the label alone: two events with the same label are the same
/// event regardless of their IDs, which may be reassigned on renumbering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    id: EventId,
    label: String,
    observable: ControllerFlags,
    controllable: ControllerFlags,
}

impl Event {
    pub fn new(
        id: EventId,
        label: impl Into<String>,
        observable: ControllerFlags,
        controllable: ControllerFlags,
    ) -> Self {
        Self {
            id,
            label: label.into(),
            observable,
            controllable,
        }
    }

    pub fn id(&self) -> EventId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn observable(&self) -> &[bool] {
        &self.observable
    }

    pub fn controllable(&self) -> &[bool] {
        &self.controllable
    }

    /// Whether controller `i` (1-based) observes this event.
    pub fn is_observable_to(&self, controller: usize) -> bool {
        debug_assert!(controller >= 1);
        self.observable.get(controller - 1).copied().unwrap_or(false)
    }

    /// Whether controller `i` (1-based) can disable this event.
    pub fn is_controllable_by(&self, controller: usize) -> bool {
        debug_assert!(controller >= 1);
        self.controllable
            .get(controller - 1)
            .copied()
            .unwrap_or(false)
    }

    /// Number of controllers for which the event is controllable.
    pub fn controllable_count(&self) -> usize {
        self.controllable.iter().filter(|&&c| c).count()
    }

    /// The label parsed as a vector, for events produced by synchronized
    /// composition. Plain events return `None`.
    pub fn vector(&self) -> Option<LabelVector> {
        LabelVector::parse(&self.label)
    }
}

// Event equality is by label only.
impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.label == other.label
    }
}

impl Eq for Event {}

impl Hash for Event {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.label.hash(state);
    }
}

/// The event set of one automaton.
///
/// Iteration order is insertion order and is stable across header rewrites;
/// IDs are dense `1..=len` except transiently during inactive-event removal.
#[derive(Debug, Clone, Default)]
pub struct EventSet {
    events: Vec<Event>,
    by_label: FxHashMap<String, EventId>,
}

impl EventSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Insert a new event, assigning the next ID in insertion order.
    ///
    /// Returns [`EventId::NULL`] when the label is already present.
    pub fn insert(
        &mut self,
        label: impl Into<String>,
        observable: ControllerFlags,
        controllable: ControllerFlags,
    ) -> EventId {
        let label = label.into();
        if self.by_label.contains_key(&label) {
            return EventId::NULL;
        }
        let id = EventId::new(self.events.len() as u32 + 1);
        self.by_label.insert(label.clone(), id);
        self.events.push(Event::new(id, label, observable, controllable));
        id
    }

    pub fn get(&self, id: EventId) -> Option<&Event> {
        if id.is_null() {
            return None;
        }
        self.events.get(id.index())
    }

    pub fn id_of(&self, label: &str) -> Option<EventId> {
        self.by_label.get(label).copied()
    }

    pub fn contains_label(&self, label: &str) -> bool {
        self.by_label.contains_key(label)
    }

    /// Events in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter()
    }

    /// Drop every event not accepted by `keep` and compact the surviving IDs
    /// to `1..=m` in the preserved order. Returns the old-to-new ID mapping
    /// for the survivors.
    pub fn retain_remap<F>(&mut self, mut keep: F) -> FxHashMap<EventId, EventId>
    where
        F: FnMut(&Event) -> bool,
    {
        let mut mapping = FxHashMap::default();
        let mut survivors = Vec::with_capacity(self.events.len());
        self.by_label.clear();
        for event in self.events.drain(..) {
            if keep(&event) {
                let new_id = EventId::new(survivors.len() as u32 + 1);
                mapping.insert(event.id, new_id);
                self.by_label.insert(event.label.clone(), new_id);
                survivors.push(Event::new(
                    new_id,
                    event.label,
                    event.observable,
                    event.controllable,
                ));
            }
        }
        self.events = survivors;
        mapping
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    fn flags(values: &[bool]) -> ControllerFlags {
        values.iter().copied().collect()
    }

    #[test]
    fn test_insert_assigns_dense_ids() {
        let mut set = EventSet::new();
        let a = set.insert("a", flags(&[true]), flags(&[true]));
        let b = set.insert("b", flags(&[false]), flags(&[false]));
        assert_eq!(a, EventId::new(1));
        assert_eq!(b, EventId::new(2));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_insert_duplicate_label_is_null() {
        let mut set = EventSet::new();
        set.insert("a", flags(&[true]), flags(&[true]));
        let dup = set.insert("a", flags(&[false]), flags(&[false]));
        assert!(dup.is_null());
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_equality_is_by_label_only() {
        let left = Event::new(EventId::new(1), "a", smallvec![true], smallvec![true]);
        let right = Event::new(EventId::new(7), "a", smallvec![false], smallvec![false]);
        assert_eq!(left, right);
    }

    #[test]
    fn test_lookup_by_label_and_id() {
        let mut set = EventSet::new();
        let id = set.insert("sigma", flags(&[true, false]), flags(&[false, true]));
        assert_eq!(set.id_of("sigma"), Some(id));
        let event = set.get(id).expect("present");
        assert_eq!(event.label(), "sigma");
        assert!(event.is_observable_to(1));
        assert!(!event.is_observable_to(2));
        assert!(event.is_controllable_by(2));
        assert!(set.get(EventId::NULL).is_none());
    }

    #[test]
    fn test_iteration_preserves_insertion_order() {
        let mut set = EventSet::new();
        for label in ["g", "a", "b"] {
            set.insert(label, flags(&[true]), flags(&[true]));
        }
        let labels: Vec<&str> = set.iter().map(Event::label).collect();
        assert_eq!(labels, vec!["g", "a", "b"]);
    }

    #[test]
    fn test_retain_remap_compacts_ids() {
        let mut set = EventSet::new();
        for label in ["a", "b", "g", "d"] {
            set.insert(label, flags(&[true]), flags(&[true]));
        }
        let mapping = set.retain_remap(|e| e.label() != "b");
        assert_eq!(set.len(), 3);
        let labels: Vec<&str> = set.iter().map(Event::label).collect();
        assert_eq!(labels, vec!["a", "g", "d"]);
        assert_eq!(mapping[&EventId::new(1)], EventId::new(1));
        assert_eq!(mapping[&EventId::new(3)], EventId::new(2));
        assert_eq!(mapping[&EventId::new(4)], EventId::new(3));
        assert!(!mapping.contains_key(&EventId::new(2)));
        assert_eq!(set.id_of("g"), Some(EventId::new(2)));
    }
}
