//! GPIO output abstraction

use core::cell::RefCell;
use core::fmt;
use core::sync::atomic::{AtomicU32, Ordering};

use critical_section::Mutex;
use embedded_hal::digital::OutputPin;
use heapless::Vec;

use crate::error::{HalError, HalResult};

/// Pins per GPIO port
const PINS_PER_PORT: u16 = 32;

/// Identity of a single GPIO pin, encoded as `port * 32 + bit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pin(u16);

impl Pin {
    /// Create a pin from its flat number
    pub const fn new(number: u16) -> Self {
        Self(number)
    }

    /// Create a pin from port and bit position
    pub const fn from_port_bit(port: u8, bit: u8) -> Self {
        Self(port as u16 * PINS_PER_PORT + (bit as u16 % PINS_PER_PORT))
    }

    /// Flat pin number
    pub const fn number(self) -> u16 {
        self.0
    }

    /// GPIO port index
    pub const fn port(self) -> u8 {
        (self.0 / PINS_PER_PORT) as u8
    }

    /// Bit position within the port
    pub const fn bit(self) -> u8 {
        (self.0 % PINS_PER_PORT) as u8
    }
}

impl fmt::Display for Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.port(), self.bit())
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Pin {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "{}.{}", self.port(), self.bit());
    }
}

/// GPIO pin levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    /// Low level (0V)
    Low,
    /// High level (VCC)
    High,
}

impl Level {
    /// Level for a boolean "on" state
    pub const fn from_bool(high: bool) -> Self {
        if high {
            Level::High
        } else {
            Level::Low
        }
    }

    /// Check if this is the high level
    pub const fn is_high(self) -> bool {
        matches!(self, Level::High)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Level {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Level::Low => defmt::write!(fmt, "Low"),
            Level::High => defmt::write!(fmt, "High"),
        }
    }
}

/// Drives output pins from any context, including interrupt handlers.
///
/// Each call is a single register write with no side effect beyond the pin
/// level. Implementations must not block.
pub trait PinDriver: Send + Sync {
    /// Drive `pin` high
    fn set_high(&self, pin: Pin);

    /// Drive `pin` low
    fn set_low(&self, pin: Pin);

    /// Drive `pin` to `level`
    fn set_level(&self, pin: Pin, level: Level) {
        match level {
            Level::High => self.set_high(pin),
            Level::Low => self.set_low(pin),
        }
    }
}

impl<D: PinDriver + ?Sized> PinDriver for &D {
    fn set_high(&self, pin: Pin) {
        (**self).set_high(pin)
    }

    fn set_low(&self, pin: Pin) {
        (**self).set_low(pin)
    }
}

/// Fixed-size set of `embedded-hal` output pins exposed as a [`PinDriver`].
///
/// Pins are registered once during board bring-up.
///
/// This adapter is not a single register write: each call enters a critical
/// section to borrow the owning `OutputPin` and searches the bank linearly.
/// When it backs an interrupt-driven user such as a PWM scheduler, that cost
/// lands in the interrupt handler. Boards that need the bare single-write path
/// should implement [`PinDriver`] directly on their GPIO registers.
///
/// Writes through [`PinDriver`] cannot report errors. Writes to unregistered
/// pins and driver failures are dropped and counted in
/// [`OutputPinBank::dropped_writes`].
pub struct OutputPinBank<P, const N: usize> {
    pins: Mutex<RefCell<Vec<(Pin, P), N>>>,
    dropped: AtomicU32,
}

impl<P: OutputPin, const N: usize> OutputPinBank<P, N> {
    /// Create an empty bank
    pub const fn new() -> Self {
        Self {
            pins: Mutex::new(RefCell::new(Vec::new())),
            dropped: AtomicU32::new(0),
        }
    }

    /// Hand `output` to the bank under the identity `pin`.
    ///
    /// Returns [`HalError::BankFull`] when the bank has no free entry. A pin
    /// that is already registered has its output replaced.
    pub fn register(&self, pin: Pin, output: P) -> HalResult<()> {
        critical_section::with(|cs| {
            let mut pins = self.pins.borrow_ref_mut(cs);
            if let Some(entry) = pins.iter_mut().find(|(id, _)| *id == pin) {
                entry.1 = output;
                return Ok(());
            }
            pins.push((pin, output)).map_err(|_| HalError::BankFull)
        })
    }

    /// Take the output back out of the bank
    pub fn unregister(&self, pin: Pin) -> HalResult<P> {
        critical_section::with(|cs| {
            let mut pins = self.pins.borrow_ref_mut(cs);
            let index = pins
                .iter()
                .position(|(id, _)| *id == pin)
                .ok_or(HalError::UnknownPin(pin.number()))?;
            Ok(pins.swap_remove(index).1)
        })
    }

    /// Check if `pin` is registered
    pub fn contains(&self, pin: Pin) -> bool {
        critical_section::with(|cs| self.pins.borrow_ref(cs).iter().any(|(id, _)| *id == pin))
    }

    /// Number of registered pins
    pub fn len(&self) -> usize {
        critical_section::with(|cs| self.pins.borrow_ref(cs).len())
    }

    /// Check if no pin is registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drive `pin` to `level`, reporting unknown pins and driver failures
    pub fn try_set_level(&self, pin: Pin, level: Level) -> HalResult<()> {
        critical_section::with(|cs| {
            let mut pins = self.pins.borrow_ref_mut(cs);
            let (_, output) = pins
                .iter_mut()
                .find(|(id, _)| *id == pin)
                .ok_or(HalError::UnknownPin(pin.number()))?;
            let result = match level {
                Level::High => output.set_high(),
                Level::Low => output.set_low(),
            };
            result.map_err(|_| HalError::HardwareError)
        })
    }

    /// [`PinDriver`] writes that were dropped because the pin is unknown or
    /// its driver failed
    pub fn dropped_writes(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn drive(&self, pin: Pin, level: Level) {
        if self.try_set_level(pin, level).is_err() {
            // Load/store pair; not every target has atomic read-modify-write
            critical_section::with(|_| {
                let dropped = self.dropped.load(Ordering::Relaxed);
                self.dropped.store(dropped.wrapping_add(1), Ordering::Relaxed);
            });
        }
    }
}

impl<P: OutputPin, const N: usize> Default for OutputPinBank<P, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: OutputPin + Send, const N: usize> PinDriver for OutputPinBank<P, N> {
    fn set_high(&self, pin: Pin) {
        self.drive(pin, Level::High);
    }

    fn set_low(&self, pin: Pin) {
        self.drive(pin, Level::Low);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pin_port_bit_round_trip() {
        let pin = Pin::from_port_bit(2, 7);
        assert_eq!(pin.number(), 71);
        assert_eq!(pin.port(), 2);
        assert_eq!(pin.bit(), 7);
    }

    #[test]
    fn level_from_bool() {
        assert_eq!(Level::from_bool(true), Level::High);
        assert_eq!(Level::from_bool(false), Level::Low);
        assert!(Level::High.is_high());
        assert!(!Level::Low.is_high());
    }
}
