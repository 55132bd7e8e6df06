//! Vectorized event labels.
//!
//! A label of the form `<a_b_*>` is a tuple of per-slot labels: slot 0 is the
//! plant's observation, slots `1..=K` are the controllers'. The element `*`
//! means "silent in this slot". Compatibility and join over these vectors are
//! the basis of synchronized composition, communication discovery, and crush.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;

/// The silent element.
pub const SILENT: &str = "*";

/// A parsed label vector.
///
/// Written with `_` separators; older files used `,`, which the parser still
/// accepts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LabelVector {
    slots: SmallVec<[String; 4]>,
}

impl LabelVector {
    /// Parse a vectorized label. Returns `None` for plain (scalar) labels.
    pub fn parse(label: &str) -> Option<Self> {
        let interior = label.strip_prefix('<')?.strip_suffix('>')?;
        let separator = if interior.contains('_') { '_' } else { ',' };
        Some(Self {
            slots: interior.split(separator).map(str::to_owned).collect(),
        })
    }

    pub fn from_slots<I, S>(slots: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            slots: slots.into_iter().map(Into::into).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slot(&self, index: usize) -> &str {
        &self.slots[index]
    }

    pub fn slots(&self) -> impl Iterator<Item = &str> {
        self.slots.iter().map(String::as_str)
    }

    /// True when the slot holds the silent element.
    pub fn is_silent(&self, index: usize) -> bool {
        self.slots[index] == SILENT
    }

    /// Slot indices holding a real (non-silent) element.
    pub fn active_slots(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.slots.len()).filter(|&i| !self.is_silent(i))
    }

    /// Two vectors are compatible iff they have the same size and at every
    /// position they agree or at least one side is silent.
    pub fn compatible(&self, other: &LabelVector) -> bool {
        self.slots.len() == other.slots.len()
            && self
                .slots
                .iter()
                .zip(&other.slots)
                .all(|(a, b)| a == SILENT || b == SILENT || a == b)
    }

    /// Positionwise join of two compatible vectors: pick the non-silent
    /// element, or silent when both sides are. `None` when incompatible.
    pub fn join(&self, other: &LabelVector) -> Option<LabelVector> {
        if !self.compatible(other) {
            return None;
        }
        Some(Self {
            slots: self
                .slots
                .iter()
                .zip(&other.slots)
                .map(|(a, b)| if a == SILENT { b.clone() } else { a.clone() })
                .collect(),
        })
    }

    /// An event is unobservable to controller `i` (1-based) when the plant
    /// slot or the controller's own slot is silent.
    pub fn unobservable_to(&self, controller: usize) -> bool {
        debug_assert!(controller >= 1 && controller < self.slots.len());
        self.is_silent(0) || self.is_silent(controller)
    }
}

impl fmt::Display for LabelVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.slots.join("_"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vector(label: &str) -> LabelVector {
        LabelVector::parse(label).expect("vector label")
    }

    #[test]
    fn test_parse_underscore_form() {
        let v = vector("<a_b_*>");
        assert_eq!(v.len(), 3);
        assert_eq!(v.slot(0), "a");
        assert_eq!(v.slot(1), "b");
        assert!(v.is_silent(2));
    }

    #[test]
    fn test_parse_comma_form() {
        // Older files wrote comma separators.
        let v = vector("<a,b,*>");
        assert_eq!(v.len(), 3);
        assert_eq!(v.slot(1), "b");
    }

    #[test]
    fn test_parse_rejects_plain_labels() {
        assert!(LabelVector::parse("a").is_none());
        assert!(LabelVector::parse("<a_b").is_none());
        assert!(LabelVector::parse("a_b>").is_none());
    }

    #[test]
    fn test_display_roundtrip() {
        let v = vector("<a_*_g>");
        assert_eq!(v.to_string(), "<a_*_g>");
        assert_eq!(LabelVector::parse(&v.to_string()), Some(v));
    }

    #[test]
    fn test_compatible() {
        assert!(vector("<a_a_*>").compatible(&vector("<a_*_a>")));
        assert!(vector("<*_*_*>").compatible(&vector("<a_b_g>")));
        assert!(!vector("<a_a_*>").compatible(&vector("<b_*_a>")));
        // Size mismatch is never compatible.
        assert!(!vector("<a_a>").compatible(&vector("<a_a_*>")));
    }

    #[test]
    fn test_join() {
        let joined = vector("<a_a_*>").join(&vector("<a_*_a>")).expect("compatible");
        assert_eq!(joined, vector("<a_a_a>"));
        assert_eq!(
            vector("<*_b_*>").join(&vector("<*_*_*>")).expect("compatible"),
            vector("<*_b_*>")
        );
        assert!(vector("<a_a_*>").join(&vector("<b_*_*>")).is_none());
    }

    #[test]
    fn test_unobservable_to() {
        let v = vector("<a_a_*>");
        assert!(!v.unobservable_to(1));
        assert!(v.unobservable_to(2));
        // Plant-silent events are unobservable to every controller.
        let private = vector("<*_b_*>");
        assert!(private.unobservable_to(1));
        assert!(private.unobservable_to(2));
    }
}
