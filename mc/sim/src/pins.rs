//! Pin driver that records every write with its tick stamp

use std::sync::{Mutex, MutexGuard, PoisonError};

use mc_hal::{Level, Pin, PinDriver, TickSource, Ticks};

use crate::SimTimer;

/// One pin write as seen by the recorder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinWrite {
    pub pin: Pin,
    pub level: Level,
    /// Counter value when the write happened
    pub at: Ticks,
}

/// [`PinDriver`] that logs writes instead of touching hardware.
///
/// Each write is stamped with the counter of `clock`, so the recorded
/// waveform is exactly what the interrupt handler produced in simulated time.
pub struct PinRecorder<'t, T: TickSource = SimTimer> {
    clock: &'t T,
    writes: Mutex<Vec<PinWrite>>,
}

impl<'t, T: TickSource> PinRecorder<'t, T> {
    /// Create an empty recorder stamping writes with `clock`
    pub fn new(clock: &'t T) -> Self {
        Self {
            clock,
            writes: Mutex::new(Vec::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<PinWrite>> {
        self.writes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every write so far, in order
    pub fn writes(&self) -> Vec<PinWrite> {
        self.lock().clone()
    }

    /// Writes to `pin` that changed its level
    pub fn edges(&self, pin: Pin) -> Vec<PinWrite> {
        let mut last = None;
        self.lock()
            .iter()
            .filter(|write| write.pin == pin)
            .filter(|write| {
                let changed = last != Some(write.level);
                last = Some(write.level);
                changed
            })
            .copied()
            .collect()
    }

    /// Tick stamps of the low-to-high edges of `pin`
    pub fn rising_edges(&self, pin: Pin) -> Vec<Ticks> {
        self.edges(pin)
            .into_iter()
            .filter(|write| write.level.is_high())
            .map(|write| write.at)
            .collect()
    }

    /// Tick stamps of the high-to-low edges of `pin`
    pub fn falling_edges(&self, pin: Pin) -> Vec<Ticks> {
        self.edges(pin)
            .into_iter()
            .filter(|write| !write.level.is_high())
            .map(|write| write.at)
            .collect()
    }

    /// Level `pin` was last driven to, `None` if it was never written
    pub fn level(&self, pin: Pin) -> Option<Level> {
        self.lock()
            .iter()
            .rev()
            .find(|write| write.pin == pin)
            .map(|write| write.level)
    }

    /// Number of writes to `pin`, including ones that repeated the level
    pub fn write_count(&self, pin: Pin) -> usize {
        self.lock().iter().filter(|write| write.pin == pin).count()
    }

    /// Forget everything recorded so far
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn record(&self, pin: Pin, level: Level) {
        let at = self.clock.counter();
        self.lock().push(PinWrite { pin, level, at });
    }
}

impl<T: TickSource> PinDriver for PinRecorder<'_, T> {
    fn set_high(&self, pin: Pin) {
        self.record(pin, Level::High);
    }

    fn set_low(&self, pin: Pin) {
        self.record(pin, Level::Low);
    }
}
