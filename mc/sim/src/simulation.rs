//! Event-stepped driver for compare interrupts

use mc_hal::{TickSource, Ticks};

use crate::SimTimer;

/// Steps a [`SimTimer`] from one compare match to the next and runs the
/// interrupt handler at each, `latency` ticks after the match.
///
/// A compare value that is already at or behind the counter never matches,
/// as on real hardware, so a handler that leaves the compare register in the
/// past stops the simulation.
pub struct Simulation<'t, const TPS: u32 = { crate::DEFAULT_TICKS_PER_SECOND }> {
    timer: &'t SimTimer<TPS>,
    interrupts: u32,
}

impl<'t, const TPS: u32> Simulation<'t, TPS> {
    /// Create a simulation stepping `timer`
    pub fn new(timer: &'t SimTimer<TPS>) -> Self {
        Self {
            timer,
            interrupts: 0,
        }
    }

    /// Handler invocations so far
    pub fn interrupts(&self) -> u32 {
        self.interrupts
    }

    /// Run until the counter reaches `until`, calling `isr` for every compare
    /// match on the way. Returns the number of interrupts taken by this call.
    ///
    /// The counter ends at `until` unless a handler pushed it further.
    pub fn run_until(&mut self, until: Ticks, mut isr: impl FnMut()) -> u32 {
        let mut taken = 0;
        while self.timer.interrupt_enabled() {
            let now = self.timer.counter();
            let compare = self.timer.compare();
            if compare.delta_from(now) <= 0 || until.delta_from(now) <= 0 {
                break;
            }
            let entry = compare + self.timer.latency();
            if entry.elapsed_since(now) > until.elapsed_since(now) {
                break;
            }
            self.timer.set_counter(compare);
            self.timer.raise();
            self.timer.set_counter(entry);
            isr();
            taken += 1;
        }
        if until.delta_from(self.timer.counter()) > 0 {
            self.timer.set_counter(until);
        }
        self.interrupts += taken;
        taken
    }

    /// Run for `ticks` from the current counter value
    pub fn run_for(&mut self, ticks: u32, isr: impl FnMut()) -> u32 {
        let until = self.timer.counter() + ticks;
        self.run_until(until, isr)
    }
}
