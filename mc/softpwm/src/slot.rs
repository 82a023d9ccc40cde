//! Scheduler slot: per-channel timing state shared with the interrupt handler
//!
//! A slot is written by foreground code and read by the timer interrupt
//! without any lock. The (on, off) durations are double buffered: the
//! interrupt path only reads the live buffer selected by `active_buffer`, and
//! it is the only code that flips the selector, which happens solely at the
//! start of an on-phase. Foreground code only ever writes the other buffer and
//! then raises `pending_swap`.
//!
//! Every field is an atomic accessed with plain loads and stores, so the
//! protocol also holds on cores without compare-and-swap.

use core::fmt;
use core::sync::atomic::{AtomicBool, AtomicU16, AtomicU32, AtomicU8, Ordering};

use mc_hal::{Pin, PinDriver, Ticks};

/// Handle to an allocated scheduler slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotId(usize);

impl SlotId {
    pub(crate) const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Index of the slot in the scheduler table
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot{}", self.0)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for SlotId {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "slot{}", self.0);
    }
}

/// Half of a PWM cycle currently being driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Phase {
    /// Pin high
    On = 0,
    /// Pin low
    Off = 1,
}

impl Phase {
    const fn from_raw(raw: u8) -> Self {
        if raw & 1 == 0 {
            Phase::On
        } else {
            Phase::Off
        }
    }

    /// The other half of the cycle
    pub const fn toggled(self) -> Self {
        match self {
            Phase::On => Phase::Off,
            Phase::Off => Phase::On,
        }
    }

    const fn index(self) -> usize {
        self as usize
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Phase {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Phase::On => defmt::write!(fmt, "On"),
            Phase::Off => defmt::write!(fmt, "Off"),
        }
    }
}

/// Outcome of servicing one slot inside the interrupt handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Service {
    /// Ticks until this slot needs the handler again
    pub delta: u32,
    /// The slot changed phase during this pass
    pub transitioned: bool,
    /// The new phase was already over and the lost time was dropped
    pub clamped: bool,
}

pub(crate) struct Slot {
    enabled: AtomicBool,
    pin: AtomicU16,
    next_event: AtomicU32,
    phase: AtomicU8,
    active_buffer: AtomicU8,
    pending_swap: AtomicBool,
    durations: [[AtomicU32; 2]; 2],
}

impl Slot {
    pub(crate) const fn new() -> Self {
        Self {
            enabled: AtomicBool::new(false),
            pin: AtomicU16::new(0),
            next_event: AtomicU32::new(0),
            phase: AtomicU8::new(Phase::On as u8),
            active_buffer: AtomicU8::new(0),
            pending_swap: AtomicBool::new(false),
            durations: [
                [AtomicU32::new(0), AtomicU32::new(0)],
                [AtomicU32::new(0), AtomicU32::new(0)],
            ],
        }
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Take a disabled slot into service, starting an on-phase at `now`.
    ///
    /// The interrupt handler ignores the slot until `enabled` is published,
    /// so every other field can be written freely first.
    pub(crate) fn claim(&self, pin: Pin, on_ticks: u32, off_ticks: u32, now: Ticks) {
        self.pin.store(pin.number(), Ordering::Relaxed);
        self.durations[0][Phase::On.index()].store(on_ticks, Ordering::Relaxed);
        self.durations[0][Phase::Off.index()].store(off_ticks, Ordering::Relaxed);
        self.active_buffer.store(0, Ordering::Relaxed);
        self.phase.store(Phase::On as u8, Ordering::Relaxed);
        self.pending_swap.store(false, Ordering::Relaxed);
        self.next_event.store((now + on_ticks).raw(), Ordering::Relaxed);
        self.enabled.store(true, Ordering::Release);
    }

    pub(crate) fn release(&self) {
        self.enabled.store(false, Ordering::Release);
    }

    /// Write new durations into the buffer the interrupt path is not reading.
    ///
    /// Must not race with a buffer swap: either no update is pending (so the
    /// handler cannot flip), or the caller holds a critical section.
    pub(crate) fn stage(&self, on_ticks: u32, off_ticks: u32) {
        let inactive = usize::from(self.active_buffer.load(Ordering::Acquire) ^ 1);
        self.durations[inactive][Phase::On.index()].store(on_ticks, Ordering::Relaxed);
        self.durations[inactive][Phase::Off.index()].store(off_ticks, Ordering::Relaxed);
        self.pending_swap.store(true, Ordering::Release);
    }

    pub(crate) fn is_pending(&self) -> bool {
        self.pending_swap.load(Ordering::Acquire)
    }

    /// Arrange for the next handler pass to start a fresh on-phase at `now`.
    pub(crate) fn force_resync(&self, now: Ticks) {
        self.phase.store(Phase::Off as u8, Ordering::Relaxed);
        self.next_event.store(now.raw(), Ordering::Relaxed);
    }

    pub(crate) fn pin(&self) -> Pin {
        Pin::new(self.pin.load(Ordering::Relaxed))
    }

    pub(crate) fn phase(&self) -> Phase {
        Phase::from_raw(self.phase.load(Ordering::Relaxed))
    }

    pub(crate) fn next_event(&self) -> Ticks {
        Ticks::new(self.next_event.load(Ordering::Relaxed))
    }

    pub(crate) fn active_buffer(&self) -> u8 {
        self.active_buffer.load(Ordering::Acquire)
    }

    /// (on, off) durations of the live buffer
    pub(crate) fn live_durations(&self) -> (u32, u32) {
        let live = usize::from(self.active_buffer());
        (
            self.durations[live][Phase::On.index()].load(Ordering::Relaxed),
            self.durations[live][Phase::Off.index()].load(Ordering::Relaxed),
        )
    }

    /// Advance the slot if its current phase has expired at `now`.
    ///
    /// Interrupt context only. The next event is scheduled relative to the
    /// stale deadline rather than `now`, so handler latency does not stretch
    /// the cycle.
    pub(crate) fn service<D: PinDriver>(&self, now: Ticks, driver: &D) -> Service {
        let mut delta = self.next_event().delta_from(now);
        if delta > 0 {
            return Service {
                delta: delta as u32,
                transitioned: false,
                clamped: false,
            };
        }

        let phase = self.phase().toggled();
        self.phase.store(phase as u8, Ordering::Relaxed);
        match phase {
            Phase::On => {
                driver.set_high(self.pin());
                if self.pending_swap.load(Ordering::Acquire) {
                    let flipped = self.active_buffer.load(Ordering::Relaxed) ^ 1;
                    self.active_buffer.store(flipped, Ordering::Release);
                    self.pending_swap.store(false, Ordering::Release);
                }
            }
            Phase::Off => driver.set_low(self.pin()),
        }

        let live = usize::from(self.active_buffer.load(Ordering::Relaxed));
        let duration = self.durations[live][phase.index()].load(Ordering::Relaxed);
        delta = delta.wrapping_add(duration as i32);

        let clamped = delta < 0;
        if clamped {
            delta = 0;
        }
        self.next_event
            .store(now.wrapping_add_signed(delta).raw(), Ordering::Relaxed);

        Service {
            delta: delta as u32,
            transitioned: true,
            clamped,
        }
    }
}
