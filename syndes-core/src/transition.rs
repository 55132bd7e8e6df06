//! Transitions and the special-transition annotations carried in headers.

use crate::{EventId, StateId};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// An outgoing transition as stored inside a state's body record. The owning
/// state supplies the initial endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Transition {
    pub event: EventId,
    pub target: StateId,
}

impl Transition {
    pub fn new(event: EventId, target: StateId) -> Self {
        Self { event, target }
    }
}

/// A detached transition with all three endpoints, used by the header-level
/// special-transition lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransitionData {
    pub initial: StateId,
    pub event: EventId,
    pub target: StateId,
}

impl TransitionData {
    pub fn new(initial: StateId, event: EventId, target: StateId) -> Self {
        Self {
            initial,
            event,
            target,
        }
    }
}

/// A controller's part in a communication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommunicationRole {
    None,
    Sender,
    Receiver,
}

impl CommunicationRole {
    /// Wire byte for the header's communication records.
    pub fn to_byte(self) -> u8 {
        match self {
            CommunicationRole::None => 0,
            CommunicationRole::Sender => 1,
            CommunicationRole::Receiver => 2,
        }
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(CommunicationRole::None),
            1 => Some(CommunicationRole::Sender),
            2 => Some(CommunicationRole::Receiver),
            _ => None,
        }
    }
}

/// Per-controller role vector. Invariant: exactly one `Sender`.
pub type RoleVector = SmallVec<[CommunicationRole; 10]>;

/// A transition annotated as a communication: one controller tells another
/// what it observed. The roles vector length equals the controller count of
/// the automaton the U-Structure was composed from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommunicationData {
    pub transition: TransitionData,
    pub roles: RoleVector,
}

impl CommunicationData {
    pub fn new(transition: TransitionData, roles: RoleVector) -> Self {
        debug_assert_eq!(
            roles
                .iter()
                .filter(|r| **r == CommunicationRole::Sender)
                .count(),
            1,
            "a communication has exactly one sender"
        );
        Self { transition, roles }
    }

    /// 1-based index of the sending controller.
    pub fn sender(&self) -> Option<usize> {
        self.roles
            .iter()
            .position(|r| *r == CommunicationRole::Sender)
            .map(|i| i + 1)
    }

    /// 1-based indices of the receiving controllers.
    pub fn receivers(&self) -> impl Iterator<Item = usize> + '_ {
        self.roles
            .iter()
            .enumerate()
            .filter(|(_, r)| **r == CommunicationRole::Receiver)
            .map(|(i, _)| i + 1)
    }
}

/// A communication carrying Nash cost and probability weights.
///
/// Costs are non-negative and saturate instead of overflowing; probabilities
/// are clamped to `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NashCommunicationData {
    pub transition: TransitionData,
    pub roles: RoleVector,
    cost: i64,
    probability: f64,
}

impl NashCommunicationData {
    pub fn new(transition: TransitionData, roles: RoleVector, cost: i64, probability: f64) -> Self {
        Self {
            transition,
            roles,
            cost: cost.max(0),
            probability: probability.clamp(0.0, 1.0),
        }
    }

    pub fn cost(&self) -> i64 {
        self.cost
    }

    pub fn probability(&self) -> f64 {
        self.probability
    }
}

/// A disablement decision: which controllers disable the annotated
/// transition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DisablementData {
    pub transition: TransitionData,
    pub controllers: SmallVec<[bool; 10]>,
}

impl DisablementData {
    pub fn new(transition: TransitionData, controllers: SmallVec<[bool; 10]>) -> Self {
        Self {
            transition,
            controllers,
        }
    }
}

/// Policy for combining the costs of Nash communications merged by a crush.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CombineCosts {
    /// Keep the largest member cost.
    Max,
    /// Sum member costs, saturating at `i64::MAX`.
    Sum,
    /// Sum divided by the member count.
    Average,
}

impl CombineCosts {
    /// Combine the costs of the merged members under this policy.
    pub fn combine(self, costs: &[i64]) -> i64 {
        match self {
            CombineCosts::Max => costs.iter().copied().max().unwrap_or(0),
            CombineCosts::Sum => costs.iter().fold(0i64, |acc, &c| acc.saturating_add(c)),
            CombineCosts::Average => {
                if costs.is_empty() {
                    0
                } else {
                    costs.iter().fold(0i64, |acc, &c| acc.saturating_add(c)) / costs.len() as i64
                }
            }
        }
    }
}
