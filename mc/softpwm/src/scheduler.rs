//! Multi-channel scheduler driven by a single compare interrupt
//!
//! One hardware compare timer is time-sliced between up to `N` PWM channels.
//! Each interrupt advances every expired channel, reschedules it from its
//! previous deadline (so latency does not accumulate into drift), and then
//! programs the compare register for the nearest pending event.
//!
//! Foreground code allocates and releases slots with [`Scheduler::enable`] and
//! [`Scheduler::disable`] and retimes running channels with
//! [`Scheduler::adjust_times`]. The interrupt handler, [`Scheduler::on_interrupt`],
//! never blocks and never enters a critical section.

use core::ops::Range;
use core::sync::atomic::{AtomicUsize, Ordering};

use log::{debug, info, warn};
use mc_hal::timer::ticks_from_micros;
use mc_hal::{Pin, PinDriver, TickSource};

use crate::diagnostics::{Diagnostics, SlotSnapshot, Stats};
use crate::error::{PwmError, PwmResult};
use crate::slot::{Slot, SlotId};
use crate::{MAX_CHANNELS, MIN_INTERRUPT_DELTA_US, MIN_PULSE_US};

/// Wake distance used when no slot needs the handler
const IDLE_DELTA: u32 = i32::MAX as u32;

/// Software PWM scheduler for `N` channels on tick source `T`.
///
/// All state is held in atomics, so a scheduler placed in a `static` can be
/// shared between the timer interrupt and foreground code.
pub struct Scheduler<T: TickSource, D: PinDriver, const N: usize = MAX_CHANNELS> {
    timer: T,
    driver: D,
    slots: [Slot; N],
    start_active: AtomicUsize,
    end_active: AtomicUsize,
    stats: Stats,
}

impl<T: TickSource, D: PinDriver, const N: usize> Scheduler<T, D, N> {
    /// Pulses shorter than this are not reproduced reliably
    pub const MIN_PULSE_TICKS: u32 = ticks_from_micros(T::TICKS_PER_SECOND, MIN_PULSE_US);

    /// Smallest distance between two compare interrupts
    pub const MIN_INTERRUPT_DELTA_TICKS: u32 =
        ticks_from_micros(T::TICKS_PER_SECOND, MIN_INTERRUPT_DELTA_US);

    /// Create a scheduler with every slot free and the interrupt untouched
    pub const fn new(timer: T, driver: D) -> Self {
        const FREE: Slot = Slot::new();
        Self {
            timer,
            driver,
            slots: [FREE; N],
            start_active: AtomicUsize::new(0),
            end_active: AtomicUsize::new(0),
            stats: Stats::new(),
        }
    }

    /// Tick source driving this scheduler
    pub fn timer(&self) -> &T {
        &self.timer
    }

    /// Pin driver used for every channel
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Number of slots
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Take a free slot for `pin` and start driving it.
    ///
    /// The pin goes high immediately and all running channels are realigned
    /// with [`Scheduler::sync_all`]. Fails with [`PwmError::CapacityExceeded`]
    /// when every slot is in use.
    pub fn enable(&self, pin: Pin, on_ticks: u32, off_ticks: u32) -> PwmResult<SlotId> {
        let claimed = critical_section::with(|_| {
            let index = self.slots.iter().position(|slot| !slot.is_enabled())?;
            let now = self.timer.counter();
            self.driver.set_high(pin);
            self.slots[index].claim(pin, on_ticks, off_ticks, now);
            self.update_active();
            self.resync();
            Some(SlotId::new(index))
        });

        match claimed {
            Some(id) => {
                debug!(
                    "soft PWM {} enabled for pin {} (on {} off {})",
                    id, pin, on_ticks, off_ticks
                );
                Ok(id)
            }
            None => {
                warn!("soft PWM: no free slot for pin {}", pin);
                Err(PwmError::CapacityExceeded)
            }
        }
    }

    /// Remove a slot from scheduling.
    ///
    /// The pin keeps whatever level it was last driven to; the owner is
    /// expected to drive a static level afterwards.
    pub fn disable(&self, id: SlotId) -> PwmResult<()> {
        let slot = self.slot(id)?;
        critical_section::with(|_| {
            slot.release();
            self.update_active();
        });
        debug!("soft PWM {} disabled", id);
        Ok(())
    }

    /// Queue new on/off durations for a running slot.
    ///
    /// The values go into the buffer the interrupt handler is not reading and
    /// take effect at the start of the slot's next on-phase. Phase and
    /// deadline are left to the interrupt handler.
    pub fn adjust_times(&self, id: SlotId, on_ticks: u32, off_ticks: u32) -> PwmResult<()> {
        let slot = self.slot(id)?;
        if slot.is_pending() {
            // The handler may flip buffers under us while a swap is queued
            critical_section::with(|_| slot.stage(on_ticks, off_ticks));
        } else {
            slot.stage(on_ticks, off_ticks);
        }
        Ok(())
    }

    /// Restart every enabled slot at the same instant.
    ///
    /// All slots are put at the end of their off-phase with a deadline of
    /// now, and the compare register is armed to fire almost immediately, so
    /// every channel begins its on-phase in the same interrupt. Channels whose
    /// periods are multiples of each other then keep sharing interrupts.
    pub fn sync_all(&self) {
        critical_section::with(|_| self.resync());
    }

    /// Check if `id` is currently scheduled
    pub fn is_enabled(&self, id: SlotId) -> bool {
        self.slot(id).map(Slot::is_enabled).unwrap_or(false)
    }

    /// Slot indices the interrupt handler scans
    pub fn active_range(&self) -> Range<usize> {
        self.start_active.load(Ordering::Acquire)..self.end_active.load(Ordering::Acquire)
    }

    /// Number of enabled slots
    pub fn active_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_enabled()).count()
    }

    /// Timer compare interrupt handler.
    ///
    /// Call from the tick source's interrupt vector. Runs in time linear in
    /// the size of the active range and always leaves the compare register
    /// strictly in the future.
    pub fn on_interrupt(&self) {
        self.timer.clear_interrupt();
        let now = self.timer.counter();
        self.stats.record_interrupt();

        let mut next = IDLE_DELTA;
        let active = self.active_range();
        for slot in self.slots.get(active).unwrap_or(&[]) {
            if !slot.is_enabled() {
                continue;
            }
            let service = slot.service(now, &self.driver);
            if service.transitioned {
                self.stats.record_transition();
            }
            if service.clamped {
                self.stats.record_overrun();
            }
            next = next.min(service.delta);
        }

        if next < Self::MIN_INTERRUPT_DELTA_TICKS {
            next = Self::MIN_INTERRUPT_DELTA_TICKS;
            self.stats.record_floor_adjustment();
        }
        self.timer.set_compare(now + next);

        // A late handler may have armed a compare value the counter already
        // passed; that interrupt would never come
        while self.timer.compare().delta_from(self.timer.counter()) <= 0 {
            self.stats.record_compare_recheck();
            self.timer
                .set_compare(self.timer.counter() + Self::MIN_INTERRUPT_DELTA_TICKS);
        }

        self.stats
            .record_handler_ticks(self.timer.counter().elapsed_since(now));
    }

    /// Current handler statistics
    pub fn diagnostics(&self) -> Diagnostics {
        self.stats.snapshot()
    }

    /// Clear handler statistics
    pub fn reset_diagnostics(&self) {
        self.stats.reset();
    }

    /// Timing state of an enabled slot, `None` when the slot is free
    pub fn slot_snapshot(&self, id: SlotId) -> Option<SlotSnapshot> {
        let slot = self.slot(id).ok()?;
        if !slot.is_enabled() {
            return None;
        }
        let (on_ticks, off_ticks) = slot.live_durations();
        Some(SlotSnapshot {
            id,
            pin: slot.pin(),
            phase: slot.phase(),
            next_in: slot.next_event().delta_from(self.timer.counter()),
            on_ticks,
            off_ticks,
            active_buffer: slot.active_buffer(),
            pending_swap: slot.is_pending(),
        })
    }

    /// Report statistics and every enabled slot through `log`, then reset the
    /// statistics
    pub fn log_diagnostics(&self) {
        info!("soft PWM: {}", self.diagnostics());
        self.reset_diagnostics();
        for index in 0..N {
            if let Some(snapshot) = self.slot_snapshot(SlotId::new(index)) {
                info!("soft PWM: {}", snapshot);
            }
        }
        let active = self.active_range();
        info!(
            "soft PWM: next compare in {} ticks, active {}..{}",
            self.timer.compare().delta_from(self.timer.counter()),
            active.start,
            active.end
        );
    }

    fn slot(&self, id: SlotId) -> PwmResult<&Slot> {
        self.slots.get(id.index()).ok_or(PwmError::InvalidSlot)
    }

    /// Recompute the scanned range and gate the compare interrupt on it.
    /// Caller holds a critical section.
    fn update_active(&self) {
        let was_running = !self.active_range().is_empty();
        let first = self.slots.iter().position(Slot::is_enabled);
        let last = self.slots.iter().rposition(Slot::is_enabled);

        match (first, last) {
            (Some(first), Some(last)) => {
                self.start_active.store(first, Ordering::Release);
                self.end_active.store(last + 1, Ordering::Release);
                if !was_running {
                    self.timer
                        .set_compare(self.timer.counter() + Self::MIN_INTERRUPT_DELTA_TICKS);
                    self.timer.clear_interrupt();
                    self.timer.enable_interrupt();
                }
            }
            _ => {
                self.start_active.store(0, Ordering::Release);
                self.end_active.store(0, Ordering::Release);
                self.timer.disable_interrupt();
            }
        }
    }

    /// Caller holds a critical section.
    fn resync(&self) {
        let now = self.timer.counter();
        for slot in self.slots.iter().filter(|slot| slot.is_enabled()) {
            slot.force_resync(now);
        }
        self.timer.set_compare(now + Self::MIN_INTERRUPT_DELTA_TICKS);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mc_hal::Ticks;
    use mc_sim::{PinRecorder, SimTimer};

    type TestScheduler<'a> = Scheduler<&'a SimTimer, &'a PinRecorder<'a, SimTimer>, 4>;

    #[test]
    fn test_minimum_intervals_follow_tick_rate() {
        assert_eq!(TestScheduler::MIN_PULSE_TICKS, 100);
        assert_eq!(TestScheduler::MIN_INTERRUPT_DELTA_TICKS, 20);
    }

    #[test]
    fn test_active_range_tracks_enabled_slots() {
        let timer: SimTimer = SimTimer::new();
        let pins = PinRecorder::new(&timer);
        let sched: TestScheduler = Scheduler::new(&timer, &pins);

        assert!(sched.active_range().is_empty());
        let a = sched.enable(Pin::new(1), 500, 500).unwrap();
        let b = sched.enable(Pin::new(2), 500, 500).unwrap();
        let c = sched.enable(Pin::new(3), 500, 500).unwrap();
        assert_eq!(sched.active_range(), 0..3);
        assert!(timer.interrupt_enabled());

        sched.disable(a).unwrap();
        assert_eq!(sched.active_range(), 1..3);
        sched.disable(c).unwrap();
        assert_eq!(sched.active_range(), 1..2);
        assert!(timer.interrupt_enabled());

        sched.disable(b).unwrap();
        assert!(sched.active_range().is_empty());
        assert!(!timer.interrupt_enabled());
    }

    #[test]
    fn test_enable_drives_pin_high_and_arms_timer() {
        let timer: SimTimer = SimTimer::new();
        timer.set_counter(Ticks::new(5_000));
        let pins = PinRecorder::new(&timer);
        let sched: TestScheduler = Scheduler::new(&timer, &pins);

        let id = sched.enable(Pin::new(7), 300, 700).unwrap();
        assert_eq!(pins.level(Pin::new(7)), Some(mc_hal::Level::High));
        assert_eq!(timer.compare(), Ticks::new(5_020));

        let snap = sched.slot_snapshot(id).unwrap();
        assert_eq!(snap.pin, Pin::new(7));
        assert_eq!((snap.on_ticks, snap.off_ticks), (300, 700));
        // Realigned: the next interrupt opens a new on-phase
        assert_eq!(snap.phase, crate::Phase::Off);
        assert_eq!(snap.next_in, 0);
    }

    #[test]
    fn test_sync_all_realigns_running_slots() {
        let timer: SimTimer = SimTimer::new();
        let pins = PinRecorder::new(&timer);
        let sched: TestScheduler = Scheduler::new(&timer, &pins);

        let a = sched.enable(Pin::new(1), 300, 700).unwrap();
        timer.advance(20);
        sched.on_interrupt();
        let b = sched.enable(Pin::new(2), 100, 100).unwrap();
        timer.advance(150);
        sched.on_interrupt();

        timer.advance(5);
        sched.sync_all();
        for id in [a, b] {
            let snap = sched.slot_snapshot(id).unwrap();
            assert_eq!(snap.phase, crate::Phase::Off);
            assert_eq!(snap.next_in, 0);
        }
        assert_eq!(timer.compare(), timer.counter() + 20);
    }

    #[test]
    fn test_invalid_slot_is_rejected() {
        let timer: SimTimer = SimTimer::new();
        let pins = PinRecorder::new(&timer);
        let sched: TestScheduler = Scheduler::new(&timer, &pins);

        assert_eq!(sched.disable(SlotId::new(9)), Err(PwmError::InvalidSlot));
        assert_eq!(
            sched.adjust_times(SlotId::new(4), 1, 1),
            Err(PwmError::InvalidSlot)
        );
        assert!(sched.slot_snapshot(SlotId::new(0)).is_none());
    }

    #[test]
    fn test_idle_interrupt_parks_compare_far_ahead() {
        let timer: SimTimer = SimTimer::new();
        let pins = PinRecorder::new(&timer);
        let sched: TestScheduler = Scheduler::new(&timer, &pins);

        sched.on_interrupt();
        assert_eq!(timer.compare().delta_from(timer.counter()), IDLE_DELTA as i32);
    }
}
