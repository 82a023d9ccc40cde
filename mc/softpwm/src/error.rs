//! Error types for software PWM operations

use core::fmt;

/// Software PWM errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PwmError {
    /// No free scheduler slot or channel entry is left
    CapacityExceeded,
    /// Pin has not been configured for software PWM
    NotConfigured,
    /// Slot handle does not belong to this scheduler
    InvalidSlot,
}

impl fmt::Display for PwmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PwmError::CapacityExceeded => write!(f, "software PWM capacity exceeded"),
            PwmError::NotConfigured => write!(f, "pin not configured for software PWM"),
            PwmError::InvalidSlot => write!(f, "invalid scheduler slot"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for PwmError {}

#[cfg(feature = "defmt")]
impl defmt::Format for PwmError {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            PwmError::CapacityExceeded => defmt::write!(fmt, "CapacityExceeded"),
            PwmError::NotConfigured => defmt::write!(fmt, "NotConfigured"),
            PwmError::InvalidSlot => defmt::write!(fmt, "InvalidSlot"),
        }
    }
}

/// Result type used throughout the software PWM engine
pub type PwmResult<T> = Result<T, PwmError>;
