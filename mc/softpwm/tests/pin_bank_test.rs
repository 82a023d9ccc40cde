//! Scheduler driving embedded-hal output pins through an OutputPinBank

use core::convert::Infallible;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use embedded_hal::digital::{ErrorType, OutputPin};
use mc_hal::{OutputPinBank, Pin};
use mc_sim::{SimTimer, Simulation};
use mc_softpwm::{Scheduler, SoftPwmOutputs};

/// Output that counts how often it was driven high
#[derive(Clone, Default)]
struct CountingOutput {
    highs: Arc<AtomicU32>,
}

impl ErrorType for CountingOutput {
    type Error = Infallible;
}

impl OutputPin for CountingOutput {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.highs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[test]
fn test_scheduler_drives_registered_outputs() {
    let timer: SimTimer = SimTimer::new();
    let bank: OutputPinBank<CountingOutput, 4> = OutputPinBank::new();
    let heater = Pin::from_port_bit(1, 18);
    let output = CountingOutput::default();
    let highs = output.highs.clone();
    bank.register(heater, output).unwrap();

    let sched: Scheduler<&SimTimer, &OutputPinBank<CountingOutput, 4>, 4> =
        Scheduler::new(&timer, &bank);
    let mut outputs = SoftPwmOutputs::new(&sched);
    outputs.write(heater, 0.5, 100).unwrap();

    // 10 ms period: the enable, the resync pass, then one per period
    let mut sim = Simulation::new(&timer);
    sim.run_for(35_000, || sched.on_interrupt());
    assert_eq!(highs.load(Ordering::SeqCst), 5);
    assert_eq!(bank.dropped_writes(), 0);

    // A pin missing from the bank is scheduled, but every write to it is
    // dropped and counted
    let missing = Pin::new(60);
    outputs.write(missing, 0.5, 100).unwrap();
    assert!(outputs.is_running(missing));
    let before = bank.dropped_writes();
    assert!(before >= 2);
    // Resync at 35020, then heater edges at 40000, 45000 and 50000
    sim.run_for(19_000, || sched.on_interrupt());
    assert!(bank.dropped_writes() > before);
    assert_eq!(highs.load(Ordering::SeqCst), 7);
}
