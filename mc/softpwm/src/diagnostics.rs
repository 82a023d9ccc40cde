//! Interrupt handler statistics
//!
//! Counters are written only by the interrupt handler, using load/store
//! pairs, and read or reset from foreground code. They are reported, never
//! acted upon.

use core::fmt;
use core::sync::atomic::{AtomicU32, Ordering};

use mc_hal::Pin;

use crate::slot::{Phase, SlotId};

#[derive(Debug)]
pub(crate) struct Stats {
    interrupts: AtomicU32,
    transitions: AtomicU32,
    floor_adjustments: AtomicU32,
    compare_rechecks: AtomicU32,
    overruns: AtomicU32,
    min_handler_ticks: AtomicU32,
    max_handler_ticks: AtomicU32,
}

fn bump(counter: &AtomicU32) {
    counter.store(counter.load(Ordering::Relaxed).wrapping_add(1), Ordering::Relaxed);
}

impl Stats {
    pub(crate) const fn new() -> Self {
        Self {
            interrupts: AtomicU32::new(0),
            transitions: AtomicU32::new(0),
            floor_adjustments: AtomicU32::new(0),
            compare_rechecks: AtomicU32::new(0),
            overruns: AtomicU32::new(0),
            min_handler_ticks: AtomicU32::new(u32::MAX),
            max_handler_ticks: AtomicU32::new(0),
        }
    }

    pub(crate) fn record_interrupt(&self) {
        bump(&self.interrupts);
    }

    pub(crate) fn record_transition(&self) {
        bump(&self.transitions);
    }

    pub(crate) fn record_floor_adjustment(&self) {
        bump(&self.floor_adjustments);
    }

    pub(crate) fn record_compare_recheck(&self) {
        bump(&self.compare_rechecks);
    }

    pub(crate) fn record_overrun(&self) {
        bump(&self.overruns);
    }

    pub(crate) fn record_handler_ticks(&self, ticks: u32) {
        if ticks < self.min_handler_ticks.load(Ordering::Relaxed) {
            self.min_handler_ticks.store(ticks, Ordering::Relaxed);
        }
        if ticks > self.max_handler_ticks.load(Ordering::Relaxed) {
            self.max_handler_ticks.store(ticks, Ordering::Relaxed);
        }
    }

    pub(crate) fn snapshot(&self) -> Diagnostics {
        let min = self.min_handler_ticks.load(Ordering::Relaxed);
        Diagnostics {
            interrupts: self.interrupts.load(Ordering::Relaxed),
            transitions: self.transitions.load(Ordering::Relaxed),
            floor_adjustments: self.floor_adjustments.load(Ordering::Relaxed),
            compare_rechecks: self.compare_rechecks.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
            min_handler_ticks: if min == u32::MAX { 0 } else { min },
            max_handler_ticks: self.max_handler_ticks.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn reset(&self) {
        self.interrupts.store(0, Ordering::Relaxed);
        self.transitions.store(0, Ordering::Relaxed);
        self.floor_adjustments.store(0, Ordering::Relaxed);
        self.compare_rechecks.store(0, Ordering::Relaxed);
        self.overruns.store(0, Ordering::Relaxed);
        self.min_handler_ticks.store(u32::MAX, Ordering::Relaxed);
        self.max_handler_ticks.store(0, Ordering::Relaxed);
    }
}

/// Snapshot of the interrupt handler counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Diagnostics {
    /// Compare interrupts serviced
    pub interrupts: u32,
    /// Phase transitions performed across all slots
    pub transitions: u32,
    /// Times the next wake was pushed out to the minimum interrupt delta
    pub floor_adjustments: u32,
    /// Times the compare register was found in the past and re-armed
    pub compare_rechecks: u32,
    /// Phases that were already over when started; the lost time was dropped
    pub overruns: u32,
    /// Shortest handler run, in ticks (0 before the first interrupt)
    pub min_handler_ticks: u32,
    /// Longest handler run, in ticks
    pub max_handler_ticks: u32,
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ints: {}; calls: {}; fast: {}t; slow: {}t; adj: {}; bad: {}; big delta: {}",
            self.interrupts,
            self.transitions,
            self.min_handler_ticks,
            self.max_handler_ticks,
            self.floor_adjustments,
            self.compare_rechecks,
            self.overruns
        )
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Diagnostics {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(
            fmt,
            "ints: {}; calls: {}; fast: {}t; slow: {}t; adj: {}; bad: {}; big delta: {}",
            self.interrupts,
            self.transitions,
            self.min_handler_ticks,
            self.max_handler_ticks,
            self.floor_adjustments,
            self.compare_rechecks,
            self.overruns
        );
    }
}

/// View of one enabled slot, as seen from foreground code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotSnapshot {
    pub id: SlotId,
    pub pin: Pin,
    /// Phase being driven now
    pub phase: Phase,
    /// Ticks until the current phase ends (negative when overdue)
    pub next_in: i32,
    /// High time of the live buffer
    pub on_ticks: u32,
    /// Low time of the live buffer
    pub off_ticks: u32,
    /// Buffer the interrupt handler reads (0 or 1)
    pub active_buffer: u8,
    /// New durations are waiting for the next on-phase
    pub pending_swap: bool,
}

impl fmt::Display for SlotSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} next {} on {} off {} pin {}",
            self.id, self.next_in, self.on_ticks, self.off_ticks, self.pin
        )
    }
}
