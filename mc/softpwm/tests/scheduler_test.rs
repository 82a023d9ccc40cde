//! Scheduler tests for mc-softpwm
//! These tests run on x86 host with std, driving the interrupt handler from a
//! simulated 1 MHz tick source

use mc_hal::{Pin, TickSource, Ticks};
use mc_sim::{PinRecorder, SimTimer, Simulation};
use mc_softpwm::{Phase, PwmError, Scheduler, SlotId, MAX_CHANNELS};

type TestScheduler<'a, const N: usize = MAX_CHANNELS> =
    Scheduler<&'a SimTimer, &'a PinRecorder<'a>, N>;

#[test]
fn test_capacity() {
    let timer: SimTimer = SimTimer::new();
    let pins = PinRecorder::new(&timer);
    let sched: TestScheduler = Scheduler::new(&timer, &pins);

    let ids: Vec<SlotId> = (0..MAX_CHANNELS as u16)
        .map(|n| sched.enable(Pin::new(n), 500, 500).unwrap())
        .collect();
    assert_eq!(sched.active_count(), MAX_CHANNELS);
    assert_eq!(
        sched.enable(Pin::new(99), 500, 500),
        Err(PwmError::CapacityExceeded)
    );

    sched.disable(ids[3]).unwrap();
    let reused = sched.enable(Pin::new(99), 500, 500).unwrap();
    assert_eq!(reused, ids[3]);
    assert_eq!(sched.active_count(), MAX_CHANNELS);
}

#[test]
fn test_adjust_swaps_at_next_on_phase() {
    let timer: SimTimer = SimTimer::new();
    let pins = PinRecorder::new(&timer);
    let sched: TestScheduler = Scheduler::new(&timer, &pins);
    let pin = Pin::new(1);

    let id = sched.enable(pin, 1_000, 3_000).unwrap();
    sched.adjust_times(id, 2_000, 2_000).unwrap();
    let staged = sched.slot_snapshot(id).unwrap();
    assert!(staged.pending_swap);
    assert_eq!(staged.active_buffer, 0);
    assert_eq!((staged.on_ticks, staged.off_ticks), (1_000, 3_000));

    timer.advance(20);
    sched.on_interrupt();
    let swapped = sched.slot_snapshot(id).unwrap();
    assert!(!swapped.pending_swap);
    assert_eq!(swapped.active_buffer, 1);
    assert_eq!(swapped.phase, Phase::On);
    assert_eq!((swapped.on_ticks, swapped.off_ticks), (2_000, 2_000));

    // The 1000/3000 timing is never used again
    let mut sim = Simulation::new(&timer);
    sim.run_until(Ticks::new(11_000), || sched.on_interrupt());
    assert_eq!(
        pins.falling_edges(pin),
        vec![Ticks::new(2_000), Ticks::new(6_000), Ticks::new(10_000)]
    );
    assert_eq!(
        pins.rising_edges(pin),
        vec![Ticks::new(0), Ticks::new(4_000), Ticks::new(8_000)]
    );
}

#[test]
fn test_repeated_adjust_keeps_latest() {
    let timer: SimTimer = SimTimer::new();
    let pins = PinRecorder::new(&timer);
    let sched: TestScheduler = Scheduler::new(&timer, &pins);

    let id = sched.enable(Pin::new(1), 1_000, 3_000).unwrap();
    sched.adjust_times(id, 2_000, 2_000).unwrap();
    sched.adjust_times(id, 3_000, 1_000).unwrap();

    timer.advance(20);
    sched.on_interrupt();
    let snap = sched.slot_snapshot(id).unwrap();
    assert_eq!((snap.on_ticks, snap.off_ticks), (3_000, 1_000));
}

#[test]
fn test_latency_does_not_accumulate() {
    const LATENCY: u32 = 7;
    const PERIOD: u32 = 4_000;
    const CYCLES: usize = 50;

    let timer: SimTimer = SimTimer::new();
    timer.set_latency(LATENCY);
    let pins = PinRecorder::new(&timer);
    let sched: TestScheduler = Scheduler::new(&timer, &pins);
    let pin = Pin::new(2);

    sched.enable(pin, 2_000, 2_000).unwrap();
    let mut sim = Simulation::new(&timer);
    sim.run_for(PERIOD * (CYCLES as u32 + 2), || sched.on_interrupt());

    let rising = pins.rising_edges(pin);
    assert!(rising.len() > CYCLES + 1);
    let measured = rising[1 + CYCLES].elapsed_since(rising[1]);
    let expected = PERIOD * CYCLES as u32;
    assert!(measured.abs_diff(expected) <= LATENCY);

    // Every edge is late by the latency alone, never by more
    for (k, at) in rising.iter().enumerate().skip(1) {
        assert_eq!(at.raw(), PERIOD * k as u32 + LATENCY);
    }
}

#[test]
fn test_interrupt_rate_floor() {
    let timer: SimTimer = SimTimer::new();
    timer.set_counter(Ticks::new(10_000));
    let pins = PinRecorder::new(&timer);
    let sched: TestScheduler = Scheduler::new(&timer, &pins);

    for n in 0..4 {
        sched.enable(Pin::new(n), 1, 1).unwrap();
    }
    sched.on_interrupt();

    let ahead = timer.compare().delta_from(timer.counter());
    assert!(ahead >= <TestScheduler>::MIN_INTERRUPT_DELTA_TICKS as i32);
    assert_eq!(sched.diagnostics().floor_adjustments, 1);
    assert_eq!(sched.diagnostics().transitions, 4);
}

#[test]
fn test_overrun_is_clamped() {
    let timer: SimTimer = SimTimer::new();
    let pins = PinRecorder::new(&timer);
    let sched: TestScheduler = Scheduler::new(&timer, &pins);

    let id = sched.enable(Pin::new(1), 30, 30).unwrap();
    // Handler runs 100 ticks after the deadline, longer than the on-phase
    timer.advance(100);
    sched.on_interrupt();

    let snap = sched.slot_snapshot(id).unwrap();
    assert_eq!(snap.phase, Phase::On);
    assert_eq!(snap.next_in, 0);
    assert_eq!(sched.diagnostics().overruns, 1);
}

#[test]
fn test_compare_in_past_is_rearmed() {
    let timer: SimTimer = SimTimer::new();
    let pins = PinRecorder::new(&timer);
    let sched: TestScheduler = Scheduler::new(&timer, &pins);

    sched.enable(Pin::new(1), 1_000, 3_000).unwrap();
    timer.advance(20);
    timer.stall_next_compare(5_000);
    sched.on_interrupt();

    assert_eq!(timer.counter(), Ticks::new(5_020));
    assert!(timer.compare().is_after(timer.counter()));
    let diag = sched.diagnostics();
    assert_eq!(diag.compare_rechecks, 1);
    assert_eq!(diag.max_handler_ticks, 5_000);
}

#[test]
fn test_sync_lets_channels_share_interrupts() {
    let timer: SimTimer = SimTimer::new();
    let pins = PinRecorder::new(&timer);
    let sched: TestScheduler = Scheduler::new(&timer, &pins);
    let a = Pin::new(1);
    let b = Pin::new(2);
    let mut sim = Simulation::new(&timer);

    sched.enable(a, 2_000, 2_000).unwrap();
    sim.run_until(Ticks::new(3_000), || sched.on_interrupt());

    sched.enable(b, 500, 1_500).unwrap();
    let taken = sim.run_until(Ticks::new(19_000), || sched.on_interrupt());

    let resync = Ticks::new(3_020);
    let a_edges: Vec<Ticks> = pins
        .edges(a)
        .iter()
        .map(|write| write.at)
        .filter(|at| at.is_after(resync))
        .collect();
    let b_rising = pins.rising_edges(b);
    assert!(!a_edges.is_empty());
    for at in &a_edges {
        assert!(b_rising.contains(at), "edge of A at {} not shared", at);
    }

    let edges_since_resync = |pin: Pin| {
        pins.edges(pin)
            .iter()
            .filter(|write| write.at.delta_from(resync) >= 0)
            .count()
    };
    assert!((taken as usize) < edges_since_resync(a) + edges_since_resync(b));
}

#[test]
fn test_counter_wraparound() {
    let timer: SimTimer = SimTimer::new();
    let start = Ticks::new(u32::MAX - 5_000);
    timer.set_counter(start);
    let pins = PinRecorder::new(&timer);
    let sched: TestScheduler = Scheduler::new(&timer, &pins);
    let pin = Pin::new(3);

    sched.enable(pin, 2_000, 2_000).unwrap();
    let mut sim = Simulation::new(&timer);
    sim.run_for(20_000, || sched.on_interrupt());

    let falling = pins.falling_edges(pin);
    assert_eq!(falling.len(), 5);
    assert!(falling.iter().any(|at| at.raw() < 20_000));
    for pair in falling.windows(2) {
        assert_eq!(pair[1].elapsed_since(pair[0]), 4_000);
    }
}

#[test]
fn test_interrupt_follows_active_set() {
    let timer: SimTimer = SimTimer::new();
    let pins = PinRecorder::new(&timer);
    let sched: TestScheduler<2> = Scheduler::new(&timer, &pins);

    assert!(!timer.interrupt_enabled());
    let id = sched.enable(Pin::new(1), 500, 500).unwrap();
    assert!(timer.interrupt_enabled());
    assert!(sched.is_enabled(id));

    sched.disable(id).unwrap();
    assert!(!timer.interrupt_enabled());
    assert!(!sched.is_enabled(id));
    assert!(sched.slot_snapshot(id).is_none());

    // Nothing runs while masked
    let mut sim = Simulation::new(&timer);
    assert_eq!(sim.run_for(10_000, || sched.on_interrupt()), 0);
}

#[test]
fn test_diagnostics_reset() {
    let timer: SimTimer = SimTimer::new();
    let pins = PinRecorder::new(&timer);
    let sched: TestScheduler = Scheduler::new(&timer, &pins);

    sched.enable(Pin::new(1), 1_000, 1_000).unwrap();
    let mut sim = Simulation::new(&timer);
    sim.run_for(10_000, || sched.on_interrupt());

    let diag = sched.diagnostics();
    assert_eq!(diag.interrupts, sim.interrupts());
    assert_eq!(diag.transitions, sim.interrupts());
    assert_eq!(diag.compare_rechecks, 0);

    sched.log_diagnostics();
    assert_eq!(sched.diagnostics().interrupts, 0);
}

#[test]
fn test_large_table_handles_stay_distinct() {
    let timer: SimTimer = SimTimer::new();
    let pins = PinRecorder::new(&timer);
    let sched: TestScheduler<300> = Scheduler::new(&timer, &pins);

    let ids: Vec<SlotId> = (0..257u16)
        .map(|n| sched.enable(Pin::new(n), 500, 500).unwrap())
        .collect();
    assert_eq!(ids[256].index(), 256);
    assert_eq!(sched.active_range(), 0..257);

    sched.disable(ids[256]).unwrap();
    assert!(sched.is_enabled(ids[0]));
    assert!(!sched.is_enabled(ids[256]));
    assert_eq!(sched.active_count(), 256);
    assert_eq!(sched.active_range(), 0..256);
}
