//! syndes Ops - Automata Operations Kernel
//!
//! Operations over disk-backed automata: accessibility trimming, the product
//! constructions, synchronized composition into a U-Structure, protocol
//! pruning, and the crush subset construction.
//!
//! Every operation writes its result to fresh store files named by the
//! caller; inputs are never modified. Missing required structure (no initial
//! state, mismatched controller counts, wrong automaton kind) yields
//! `Ok(None)`; only I/O and corruption produce errors.

pub mod compose;
pub mod crush;
pub mod product;
pub mod prune;
pub mod reach;

pub use compose::synchronized_composition;
pub use crush::crush;
pub use product::{intersection, union};
pub use prune::{apply_protocol, prune};
pub use reach::{accessible, coaccessible, trim};
