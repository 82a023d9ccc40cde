//! Per-pin duty/frequency model
//!
//! A [`Channel`] turns a normalized duty request into scheduler work. Requests
//! that amount to a constant level (0 %, 100 %, zero frequency, or pulses too
//! short to reproduce) are served by driving the pin directly, so they cost no
//! interrupts at all.

use core::fmt;

use log::{debug, trace};
use mc_hal::{Pin, PinDriver, TickSource};

use crate::error::PwmResult;
use crate::scheduler::Scheduler;
use crate::slot::SlotId;

/// What currently owns the level of a channel's pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Not driven since reset or release
    Disabled,
    /// Held low without a scheduler slot
    StaticLow,
    /// Held high without a scheduler slot
    StaticHigh,
    /// Toggled by the interrupt handler through this slot
    Running(SlotId),
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelState::Disabled => write!(f, "disabled"),
            ChannelState::StaticLow => write!(f, "static low"),
            ChannelState::StaticHigh => write!(f, "static high"),
            ChannelState::Running(id) => write!(f, "running on {}", id),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for ChannelState {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            ChannelState::Disabled => defmt::write!(fmt, "Disabled"),
            ChannelState::StaticLow => defmt::write!(fmt, "StaticLow"),
            ChannelState::StaticHigh => defmt::write!(fmt, "StaticHigh"),
            ChannelState::Running(id) => defmt::write!(fmt, "Running({})", id),
        }
    }
}

/// Software PWM state for one pin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pin: Pin,
    period_ticks: u32,
    on_ticks: u32,
    state: ChannelState,
}

impl Channel {
    /// Create a disabled channel for `pin`
    pub const fn new(pin: Pin) -> Self {
        Self {
            pin,
            period_ticks: 0,
            on_ticks: 0,
            state: ChannelState::Disabled,
        }
    }

    /// Pin driven by this channel
    pub const fn pin(&self) -> Pin {
        self.pin
    }

    /// Configured cycle length in ticks, 0 when off
    pub const fn period_ticks(&self) -> u32 {
        self.period_ticks
    }

    /// Configured high time in ticks
    pub const fn on_ticks(&self) -> u32 {
        self.on_ticks
    }

    /// What currently drives the pin
    pub const fn state(&self) -> ChannelState {
        self.state
    }

    /// Check if the channel owns a scheduler slot
    pub const fn is_running(&self) -> bool {
        matches!(self.state, ChannelState::Running(_))
    }

    /// Scheduler slot owned by the channel
    pub const fn slot(&self) -> Option<SlotId> {
        match self.state {
            ChannelState::Running(id) => Some(id),
            _ => None,
        }
    }

    /// Output frequency for a counter running at `ticks_per_second`, 0 when
    /// off
    pub const fn frequency_hz(&self, ticks_per_second: u32) -> u32 {
        if self.period_ticks == 0 {
            0
        } else {
            ticks_per_second / self.period_ticks
        }
    }

    /// Drive the pin with duty cycle `value` (0.0 to 1.0) at `frequency_hz`.
    ///
    /// Non-finite values are ignored and finite ones clamped. A zero frequency
    /// turns the output off. Repeating the current request leaves a running
    /// channel untouched.
    ///
    /// Returns [`PwmError::CapacityExceeded`](crate::PwmError::CapacityExceeded)
    /// when a slot is needed and none is free; the channel is then disabled
    /// with its pin low.
    pub fn write<T, D, const N: usize>(
        &mut self,
        scheduler: &Scheduler<T, D, N>,
        value: f32,
        frequency_hz: u16,
    ) -> PwmResult<()>
    where
        T: TickSource,
        D: PinDriver,
    {
        if !value.is_finite() {
            debug!("soft PWM pin {}: ignoring duty {}", self.pin, value);
            return Ok(());
        }
        let (period, on) = duty_to_ticks(
            value,
            frequency_hz,
            T::TICKS_PER_SECOND,
            Scheduler::<T, D, N>::MIN_PULSE_TICKS,
        );

        if (period, on) == (self.period_ticks, self.on_ticks) {
            match self.state {
                ChannelState::Running(_) => return Ok(()),
                ChannelState::StaticLow => {
                    scheduler.driver().set_low(self.pin);
                    return Ok(());
                }
                ChannelState::StaticHigh => {
                    scheduler.driver().set_high(self.pin);
                    return Ok(());
                }
                ChannelState::Disabled => {}
            }
        }

        let previous = self.state;
        if period != self.period_ticks {
            self.release_slot(scheduler)?;
        }

        let next = if on == 0 {
            self.release_slot(scheduler)?;
            scheduler.driver().set_low(self.pin);
            ChannelState::StaticLow
        } else if on == period {
            self.release_slot(scheduler)?;
            scheduler.driver().set_high(self.pin);
            ChannelState::StaticHigh
        } else {
            let off = period - on;
            let id = match self.state {
                ChannelState::Running(id) => id,
                _ => match scheduler.enable(self.pin, on, off) {
                    Ok(id) => id,
                    Err(err) => {
                        scheduler.driver().set_low(self.pin);
                        self.reset();
                        return Err(err);
                    }
                },
            };
            scheduler.adjust_times(id, on, off)?;
            ChannelState::Running(id)
        };

        if next != previous {
            trace!("soft PWM pin {}: {} -> {}", self.pin, previous, next);
        }
        self.period_ticks = period;
        self.on_ticks = on;
        self.state = next;
        Ok(())
    }

    /// Stop the channel and drive its pin low
    pub fn shutdown<T, D, const N: usize>(&mut self, scheduler: &Scheduler<T, D, N>) -> PwmResult<()>
    where
        T: TickSource,
        D: PinDriver,
    {
        self.release_slot(scheduler)?;
        scheduler.driver().set_low(self.pin);
        trace!("soft PWM pin {}: {} -> {}", self.pin, self.state, ChannelState::Disabled);
        self.reset();
        Ok(())
    }

    fn release_slot<T, D, const N: usize>(&mut self, scheduler: &Scheduler<T, D, N>) -> PwmResult<()>
    where
        T: TickSource,
        D: PinDriver,
    {
        if let ChannelState::Running(id) = self.state {
            scheduler.disable(id)?;
            self.state = ChannelState::Disabled;
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.period_ticks = 0;
        self.on_ticks = 0;
        self.state = ChannelState::Disabled;
    }
}

/// Convert a duty request into `(period, on)` ticks.
///
/// High times within `min_pulse` of either end of the cycle are snapped to
/// that end.
fn duty_to_ticks(value: f32, frequency_hz: u16, ticks_per_second: u32, min_pulse: u32) -> (u32, u32) {
    if frequency_hz == 0 {
        return (0, 0);
    }
    let period = ticks_per_second / u32::from(frequency_hz);
    let value = value.clamp(0.0, 1.0);
    let mut on = ((f64::from(period) * f64::from(value)) as u32).min(period);

    if on > 0 && on < period {
        if on < min_pulse {
            on = 0;
        } else if on > period.saturating_sub(min_pulse) {
            on = period;
        }
    }
    (period, on)
}
