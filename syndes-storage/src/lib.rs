//! syndes Storage - Persistent Automaton Store
//!
//! Two files back every automaton: a header carrying metadata, the event
//! set, and the special-transition lists, and a body holding fixed-width
//! state records addressed by ID. The layouts are bit-exact and big-endian;
//! automata with tens of millions of states stay on disk and are touched
//! record by record.

pub mod automaton;
pub mod body;
pub mod codec;
pub mod flags;
pub mod header;

pub use automaton::{Automaton, StateScan, StoreConfig};
pub use body::{BodyLayout, State};
pub use flags::StateFlags;
pub use header::{HeaderMeta, SpecialTables};
