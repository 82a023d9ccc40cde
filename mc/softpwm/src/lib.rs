#![cfg_attr(not(feature = "std"), no_std)]
#![forbid(unsafe_code)]

//! # MC Soft PWM
//!
//! Software PWM engine: many independent PWM outputs emulated on a single
//! hardware compare timer.
//!
//! - [`Scheduler`] owns a fixed table of slots and the compare interrupt
//!   handler that toggles every running pin and reprograms the timer for the
//!   nearest event.
//! - [`Channel`] maps a duty/frequency request onto a slot, or onto a static
//!   pin level when no interrupts are needed.
//! - [`SoftPwmOutputs`] is the pin-keyed front end used by control loops.
//!
//! ## Usage
//!
//! ```ignore
//! static PWM: Scheduler<BoardTimer, BoardPins> = Scheduler::new(BoardTimer, BoardPins);
//!
//! #[interrupt]
//! fn TIMER0() {
//!     PWM.on_interrupt();
//! }
//!
//! let mut outputs = SoftPwmOutputs::new(&PWM);
//! outputs.write(HEATER, 0.35, 10)?;
//! ```

pub mod channel;
pub mod diagnostics;
pub mod error;
pub mod outputs;
pub mod scheduler;
pub mod slot;

// Re-export commonly used types
pub use channel::{Channel, ChannelState};
pub use diagnostics::{Diagnostics, SlotSnapshot};
pub use error::{PwmError, PwmResult};
pub use outputs::SoftPwmOutputs;
pub use scheduler::Scheduler;
pub use slot::{Phase, SlotId};

/// Default number of scheduler slots
pub const MAX_CHANNELS: usize = 8;

/// Shortest high or low time that is reproduced, in microseconds
pub const MIN_PULSE_US: u32 = 100;

/// Shortest distance between two compare interrupts, in microseconds
pub const MIN_INTERRUPT_DELTA_US: u32 = 20;

/// Soft PWM crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
