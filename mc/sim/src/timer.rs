//! Simulated free-running counter with one compare channel

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use mc_hal::{TickSource, Ticks};

use crate::DEFAULT_TICKS_PER_SECOND;

/// Manually advanced tick source.
///
/// The counter never moves on its own. Tests move it with [`SimTimer::advance`]
/// or let a [`Simulation`](crate::Simulation) step it from one compare match to
/// the next.
#[derive(Debug)]
pub struct SimTimer<const TPS: u32 = DEFAULT_TICKS_PER_SECOND> {
    counter: AtomicU32,
    compare: AtomicU32,
    irq_enabled: AtomicBool,
    pending: AtomicBool,
    latency: AtomicU32,
    stall: AtomicU32,
}

impl<const TPS: u32> SimTimer<TPS> {
    /// Create a timer at tick 0 with the interrupt masked
    pub const fn new() -> Self {
        Self {
            counter: AtomicU32::new(0),
            compare: AtomicU32::new(0),
            irq_enabled: AtomicBool::new(false),
            pending: AtomicBool::new(false),
            latency: AtomicU32::new(0),
            stall: AtomicU32::new(0),
        }
    }

    /// Jump the counter to an absolute value
    pub fn set_counter(&self, at: Ticks) {
        self.counter.store(at.raw(), Ordering::SeqCst);
    }

    /// Move the counter forward, wrapping at 32 bits
    pub fn advance(&self, ticks: u32) {
        let next = self.counter().wrapping_add(ticks);
        self.counter.store(next.raw(), Ordering::SeqCst);
    }

    /// Ticks between a compare match and the handler reading the counter
    pub fn set_latency(&self, ticks: u32) {
        self.latency.store(ticks, Ordering::SeqCst);
    }

    /// Current handler latency
    pub fn latency(&self) -> u32 {
        self.latency.load(Ordering::SeqCst)
    }

    /// Let the counter run on by `ticks` while the next compare value is
    /// being written, as if the writer had been preempted
    pub fn stall_next_compare(&self, ticks: u32) {
        self.stall.store(ticks, Ordering::SeqCst);
    }

    /// Check if the compare interrupt is unmasked
    pub fn interrupt_enabled(&self) -> bool {
        self.irq_enabled.load(Ordering::SeqCst)
    }

    /// Check if a compare match has not been acknowledged yet
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::SeqCst)
    }

    pub(crate) fn raise(&self) {
        self.pending.store(true, Ordering::SeqCst);
    }
}

impl<const TPS: u32> Default for SimTimer<TPS> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const TPS: u32> TickSource for SimTimer<TPS> {
    const TICKS_PER_SECOND: u32 = TPS;

    fn counter(&self) -> Ticks {
        Ticks::new(self.counter.load(Ordering::SeqCst))
    }

    fn set_compare(&self, at: Ticks) {
        self.compare.store(at.raw(), Ordering::SeqCst);
        let stall = self.stall.swap(0, Ordering::SeqCst);
        if stall > 0 {
            self.advance(stall);
        }
    }

    fn compare(&self) -> Ticks {
        Ticks::new(self.compare.load(Ordering::SeqCst))
    }

    fn enable_interrupt(&self) {
        self.irq_enabled.store(true, Ordering::SeqCst);
    }

    fn disable_interrupt(&self) {
        self.irq_enabled.store(false, Ordering::SeqCst);
    }

    fn clear_interrupt(&self) {
        self.pending.store(false, Ordering::SeqCst);
    }
}
