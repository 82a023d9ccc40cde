//! Common error types for collaborator operations

use core::fmt;

/// HAL operation errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HalError {
    /// Pin is not managed by this driver
    UnknownPin(u16),
    /// Pin bank has no room for another pin
    BankFull,
    /// Underlying peripheral reported a failure
    HardwareError,
}

impl fmt::Display for HalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownPin(pin) => write!(f, "pin {} is not managed by this driver", pin),
            Self::BankFull => write!(f, "pin bank is full"),
            Self::HardwareError => write!(f, "hardware error"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for HalError {}

#[cfg(feature = "defmt")]
impl defmt::Format for HalError {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Self::UnknownPin(pin) => defmt::write!(fmt, "UnknownPin({})", pin),
            Self::BankFull => defmt::write!(fmt, "BankFull"),
            Self::HardwareError => defmt::write!(fmt, "HardwareError"),
        }
    }
}

/// Result type for HAL operations
pub type HalResult<T> = Result<T, HalError>;
