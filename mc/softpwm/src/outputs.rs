//! Pin-keyed software PWM outputs
//!
//! [`SoftPwmOutputs`] is the interface used by heater, fan and servo control
//! code: it maps pins to [`Channel`]s and forwards writes to the shared
//! [`Scheduler`].

use heapless::Vec;
use log::debug;
use mc_hal::{Level, Pin, PinDriver, TickSource};

use crate::channel::{Channel, ChannelState};
use crate::error::{PwmError, PwmResult};
use crate::scheduler::Scheduler;
use crate::MAX_CHANNELS;

/// Table of up to `N` software PWM pins sharing one scheduler.
pub struct SoftPwmOutputs<'s, T: TickSource, D: PinDriver, const N: usize = MAX_CHANNELS> {
    scheduler: &'s Scheduler<T, D, N>,
    channels: Vec<Channel, N>,
}

impl<'s, T: TickSource, D: PinDriver, const N: usize> SoftPwmOutputs<'s, T, D, N> {
    /// Create an empty table on top of `scheduler`
    pub fn new(scheduler: &'s Scheduler<T, D, N>) -> Self {
        Self {
            scheduler,
            channels: Vec::new(),
        }
    }

    /// Scheduler shared by every channel in the table
    pub fn scheduler(&self) -> &'s Scheduler<T, D, N> {
        self.scheduler
    }

    /// Configured channels
    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    /// Check if another pin can be configured
    pub fn can_configure(&self) -> bool {
        !self.channels.is_full()
    }

    /// Reserve a channel for `pin` and drive it low.
    ///
    /// Configuring a pin twice is harmless and leaves its channel as it is.
    pub fn configure(&mut self, pin: Pin) -> PwmResult<()> {
        self.entry(pin).map(|_| ())
    }

    /// Drive `pin` with duty cycle `value` at `frequency_hz`, configuring it
    /// on first use.
    ///
    /// Non-finite values are ignored without touching the pin. Fails with
    /// [`PwmError::CapacityExceeded`] when no channel or scheduler slot is
    /// free.
    pub fn write(&mut self, pin: Pin, value: f32, frequency_hz: u16) -> PwmResult<()> {
        if !value.is_finite() {
            debug!("soft PWM pin {}: ignoring duty {}", pin, value);
            return Ok(());
        }
        let scheduler = self.scheduler;
        let channel = self.entry(pin)?;
        channel.write(scheduler, value, frequency_hz)
    }

    /// Like [`SoftPwmOutputs::write`], but when software PWM capacity is
    /// exhausted the pin is driven as a plain digital output instead: low
    /// below half duty, high otherwise.
    pub fn write_or_digital(&mut self, pin: Pin, value: f32, frequency_hz: u16) -> PwmResult<()> {
        match self.write(pin, value, frequency_hz) {
            Err(PwmError::CapacityExceeded) => {
                let level = Level::from_bool(value >= 0.5);
                debug!("soft PWM pin {}: no capacity, driving {:?}", pin, level);
                self.scheduler.driver().set_level(pin, level);
                Ok(())
            }
            other => other,
        }
    }

    /// Stop `pin`, drive it low and free its channel. Unknown pins are
    /// ignored.
    pub fn release(&mut self, pin: Pin) -> PwmResult<()> {
        let Some(index) = self.position(pin) else {
            return Ok(());
        };
        let mut channel = self.channels.swap_remove(index);
        channel.shutdown(self.scheduler)?;
        debug!("soft PWM pin {} released", pin);
        Ok(())
    }

    /// Check if `pin` currently owns a scheduler slot
    pub fn is_running(&self, pin: Pin) -> bool {
        self.channel(pin).is_some_and(Channel::is_running)
    }

    /// State of `pin`, `None` if it is not configured
    pub fn state(&self, pin: Pin) -> Option<ChannelState> {
        self.channel(pin).map(Channel::state)
    }

    /// Output frequency of `pin` in Hz, 0 when off
    pub fn frequency(&self, pin: Pin) -> Option<u32> {
        self.channel(pin)
            .map(|channel| channel.frequency_hz(T::TICKS_PER_SECOND))
    }

    /// Channel configured for `pin`
    pub fn channel(&self, pin: Pin) -> Option<&Channel> {
        self.channels.iter().find(|channel| channel.pin() == pin)
    }

    /// Channel configured for `pin`, or [`PwmError::NotConfigured`]
    pub fn lookup(&self, pin: Pin) -> PwmResult<&Channel> {
        self.channel(pin).ok_or(PwmError::NotConfigured)
    }

    fn position(&self, pin: Pin) -> Option<usize> {
        self.channels.iter().position(|channel| channel.pin() == pin)
    }

    fn entry(&mut self, pin: Pin) -> PwmResult<&mut Channel> {
        let index = match self.position(pin) {
            Some(index) => index,
            None => {
                self.channels
                    .push(Channel::new(pin))
                    .map_err(|_| PwmError::CapacityExceeded)?;
                self.scheduler.driver().set_low(pin);
                debug!("soft PWM pin {} configured", pin);
                self.channels.len() - 1
            }
        };
        Ok(&mut self.channels[index])
    }
}
