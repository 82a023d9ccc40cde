#![cfg_attr(not(feature = "std"), no_std)]
#![forbid(unsafe_code)]

//! # MC HAL
//!
//! Vendor-agnostic collaborator interfaces for motion-controller boards.
//!
//! The software PWM engine and other interrupt-driven services are written
//! against these traits rather than chip registers:
//!
//! - [`timer`] – free-running tick counter with a compare interrupt.
//! - [`gpio`]  – single-pin set-high / set-low driver callable from ISRs.
//! - [`error`] – errors reported by collaborator implementations.

pub mod error;
pub mod gpio;
pub mod timer;

// Re-export commonly used types
pub use error::{HalError, HalResult};
pub use gpio::{Level, OutputPinBank, Pin, PinDriver};
pub use timer::{TickSource, Ticks};

/// HAL crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
