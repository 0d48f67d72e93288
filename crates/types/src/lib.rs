//! Types shared across the ePDG throttling crates.

mod cause;
mod error;
mod events;

pub use cause::*;
pub use error::*;
pub use events::*;

/// SIM slot index a throttling instance is bound to.
pub type SlotId = u8;
