//! The body-record flag byte.

use bitflags::bitflags;

bitflags! {
    /// First byte of every state record. Bits 4..8 are reserved.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct StateFlags: u8 {
        /// The state is marked (accepting).
        const MARKED = 0b0001;
        /// The slot holds a real record rather than padding.
        const EXISTS = 0b0010;
        /// U-Structure variants: enablement annotation.
        const ENABLEMENT = 0b0100;
        /// U-Structure variants: disablement annotation.
        const DISABLEMENT = 0b1000;
    }
}
