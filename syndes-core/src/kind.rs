//! The automaton kind tag.
//!
//! There is a single concrete store type; the kind decides which
//! special-transition tables a file carries and the order they appear in the
//! header. Derived kinds extend the base list so a plain reader can always
//! decode the shared prefix.

use serde::{Deserialize, Serialize};

/// Which special-transition tables an automaton kind carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpecialTable {
    BadTransitions,
    UnconditionalViolations,
    ConditionalViolations,
    PotentialCommunications,
    InvalidCommunications,
    NashCommunications,
    DisablementDecisions,
    SuppressedTransitions,
}

const AUTOMATON_TABLES: &[SpecialTable] = &[SpecialTable::BadTransitions];

const USTRUCTURE_TABLES: &[SpecialTable] = &[
    SpecialTable::BadTransitions,
    SpecialTable::UnconditionalViolations,
    SpecialTable::ConditionalViolations,
    SpecialTable::PotentialCommunications,
    SpecialTable::InvalidCommunications,
    SpecialTable::NashCommunications,
    SpecialTable::DisablementDecisions,
    SpecialTable::SuppressedTransitions,
];

/// Kind tag stored in the first header byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AutomatonKind {
    Automaton,
    UStructure,
    PrunedUStructure,
}

impl AutomatonKind {
    pub fn to_byte(self) -> u8 {
        match self {
            AutomatonKind::Automaton => 0,
            AutomatonKind::UStructure => 1,
            AutomatonKind::PrunedUStructure => 2,
        }
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(AutomatonKind::Automaton),
            1 => Some(AutomatonKind::UStructure),
            2 => Some(AutomatonKind::PrunedUStructure),
            _ => None,
        }
    }

    /// The special-transition tables this kind reads and writes, in header
    /// order.
    pub fn special_tables(self) -> &'static [SpecialTable] {
        match self {
            AutomatonKind::Automaton => AUTOMATON_TABLES,
            AutomatonKind::UStructure | AutomatonKind::PrunedUStructure => USTRUCTURE_TABLES,
        }
    }

    pub fn has_table(self, table: SpecialTable) -> bool {
        self.special_tables().contains(&table)
    }

    /// Whether this kind is one of the U-Structure variants.
    pub fn is_ustructure(self) -> bool {
        matches!(
            self,
            AutomatonKind::UStructure | AutomatonKind::PrunedUStructure
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_byte_roundtrip() {
        for kind in [
            AutomatonKind::Automaton,
            AutomatonKind::UStructure,
            AutomatonKind::PrunedUStructure,
        ] {
            assert_eq!(AutomatonKind::from_byte(kind.to_byte()), Some(kind));
        }
        assert_eq!(AutomatonKind::from_byte(3), None);
    }

    #[test]
    fn test_automaton_carries_only_bad_transitions() {
        let tables = AutomatonKind::Automaton.special_tables();
        assert_eq!(tables, &[SpecialTable::BadTransitions]);
        assert!(!AutomatonKind::Automaton.has_table(SpecialTable::NashCommunications));
    }

    #[test]
    fn test_ustructure_tables_extend_the_base_list() {
        let tables = AutomatonKind::UStructure.special_tables();
        assert_eq!(tables[0], SpecialTable::BadTransitions);
        assert_eq!(tables.len(), 8);
        assert_eq!(*tables.last().expect("non-empty"), SpecialTable::SuppressedTransitions);
        // The pruned variant is wire-compatible with the U-Structure order.
        assert_eq!(
            AutomatonKind::PrunedUStructure.special_tables(),
            AutomatonKind::UStructure.special_tables()
        );
    }
}
