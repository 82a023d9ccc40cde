//! Free-running tick counter and compare-interrupt abstraction

use core::fmt;
use core::ops::{Add, AddAssign};

/// Microseconds per second
const MICROS_PER_SEC: u64 = 1_000_000;

/// Absolute value of a hardware tick counter.
///
/// The counter and the compare register share the same 32-bit width and both
/// wrap, so a `Ticks` value has no total order. Compare two instants with
/// [`Ticks::delta_from`], which interprets the distance modulo 2^32 as a
/// signed value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Ticks(u32);

impl Ticks {
    /// Counter origin
    pub const ZERO: Self = Self(0);

    /// Wrap a raw counter value
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw counter value
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Move forward by `ticks`, wrapping at the counter width
    pub const fn wrapping_add(self, ticks: u32) -> Self {
        Self(self.0.wrapping_add(ticks))
    }

    /// Move by a signed number of ticks, wrapping at the counter width
    pub const fn wrapping_add_signed(self, delta: i32) -> Self {
        Self(self.0.wrapping_add_signed(delta))
    }

    /// Signed distance from `now` to `self`.
    ///
    /// Positive when `self` lies in the future of `now`, zero or negative when
    /// it has been reached. Valid as long as the two instants are less than
    /// 2^31 ticks apart.
    pub const fn delta_from(self, now: Ticks) -> i32 {
        self.0.wrapping_sub(now.0) as i32
    }

    /// Ticks elapsed since an earlier instant
    pub const fn elapsed_since(self, earlier: Ticks) -> u32 {
        self.0.wrapping_sub(earlier.0)
    }

    /// Check if this instant is strictly after `other` (handles wraparound)
    pub const fn is_after(self, other: Ticks) -> bool {
        self.delta_from(other) > 0
    }
}

impl Add<u32> for Ticks {
    type Output = Ticks;

    fn add(self, ticks: u32) -> Ticks {
        self.wrapping_add(ticks)
    }
}

impl AddAssign<u32> for Ticks {
    fn add_assign(&mut self, ticks: u32) {
        *self = self.wrapping_add(ticks);
    }
}

impl fmt::Display for Ticks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tick:{}", self.0)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Ticks {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "tick:{}", self.0);
    }
}

/// Convert a duration in microseconds to ticks at `ticks_per_second`.
///
/// Never returns less than one tick for a non-zero duration, so derived
/// minimum intervals stay meaningful on slow counters.
pub const fn ticks_from_micros(ticks_per_second: u32, micros: u32) -> u32 {
    let ticks = (ticks_per_second as u64 * micros as u64) / MICROS_PER_SEC;
    if ticks == 0 && micros != 0 {
        1
    } else if ticks > u32::MAX as u64 {
        u32::MAX
    } else {
        ticks as u32
    }
}

/// Hardware timer with a free-running counter and one compare channel.
///
/// The compare interrupt fires once when the counter reaches the programmed
/// compare value. Every method is a single register access and must be
/// callable from the timer's own interrupt handler.
pub trait TickSource: Send + Sync {
    /// Counter rate, fixed by the board's clock tree
    const TICKS_PER_SECOND: u32;

    /// Read the free-running counter
    fn counter(&self) -> Ticks;

    /// Program the compare register
    fn set_compare(&self, at: Ticks);

    /// Read back the compare register
    fn compare(&self) -> Ticks;

    /// Unmask the compare interrupt
    fn enable_interrupt(&self);

    /// Mask the compare interrupt
    fn disable_interrupt(&self);

    /// Acknowledge a pending compare interrupt
    fn clear_interrupt(&self);
}

impl<T: TickSource + ?Sized> TickSource for &T {
    const TICKS_PER_SECOND: u32 = T::TICKS_PER_SECOND;

    fn counter(&self) -> Ticks {
        (**self).counter()
    }

    fn set_compare(&self, at: Ticks) {
        (**self).set_compare(at)
    }

    fn compare(&self) -> Ticks {
        (**self).compare()
    }

    fn enable_interrupt(&self) {
        (**self).enable_interrupt()
    }

    fn disable_interrupt(&self) {
        (**self).disable_interrupt()
    }

    fn clear_interrupt(&self) {
        (**self).clear_interrupt()
    }
}
