//! # MC Sim
//!
//! Host port of the motion-controller collaborator traits.
//!
//! Nothing here runs in real time. [`SimTimer`] is a counter that only moves
//! when told to, [`PinRecorder`] stamps every pin write with that counter, and
//! [`Simulation`] steps the counter from one compare match to the next and
//! calls the interrupt handler in between. Together they make interrupt-driven
//! code deterministic enough to assert on exact tick values.

pub mod pins;
pub mod simulation;
pub mod timer;

pub use pins::{PinRecorder, PinWrite};
pub use simulation::Simulation;
pub use timer::SimTimer;

/// Default simulated counter rate (1 tick = 1 µs)
pub const DEFAULT_TICKS_PER_SECOND: u32 = 1_000_000;
