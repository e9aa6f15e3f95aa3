//! Sampling timer utilities.
//!
//! The sampling timer fires once per sample. Its period is retuned by the
//! frequency tracker, so it has to be reloadable at runtime. Sampling can be
//! driven two ways: from the timer interrupt through `critical_section::with`
//! (`timer-isr` feature), or from a blocking delay loop (`delay-loop` feature).
//!
//! Contains:
//! - `SampleTimer`: the hardware seam (disable, load, enable)
//! - `TimerConfig`: load value calculator for a given module clock
//! - `reprogram`: atomic period change
//! - `sample_period_ns`: period calculator for a mains frequency
//! - `global_acquisition_*` and the `*_meter_*!` macros (feature `timer-isr`)
//! - `run_sample_loop` (feature `delay-loop`)
//!
//! Load values at the nominal 1.25 ms period: (For use with `TimerConfig`)
//!
//! | Module clock | ns / tick | Load value |
//! |--------------|-----------|------------|
//! |       10 MHz |       100 |     12 499 |
//! |       25 MHz |        40 |     31 249 |
//! |       50 MHz |        20 |     62 499 |
//! |      100 MHz |        10 |    124 999 |

use libm::roundf;
use log::debug;

use crate::consts::NANOS_PER_SECOND;
use crate::error::{Error, Result};

#[cfg(feature = "delay-loop")]
mod delay;
#[cfg_attr(feature = "delay-loop", allow(unused_imports))]
#[cfg(feature = "delay-loop")]
pub use delay::*;

#[cfg(feature = "timer-isr")]
mod isr;
#[cfg_attr(feature = "timer-isr", allow(unused_imports))]
#[cfg(feature = "timer-isr")]
pub use isr::*;

#[cfg(feature = "timer-isr")]
mod macros;
#[cfg_attr(feature = "timer-isr", allow(unused_imports))]
#[cfg(feature = "timer-isr")]
pub use macros::*;

/// A periodic countdown timer that raises the sampling interrupt.
pub trait SampleTimer {
    /// Stops the timer.
    fn disable(&mut self);

    /// Sets the reload value. Takes effect on the next `enable`.
    fn set_load_value(&mut self, value: u32);

    /// Restarts the timer from the reload value.
    fn enable(&mut self);
}

impl<T: SampleTimer + ?Sized> SampleTimer for &mut T {
    fn disable(&mut self) {
        (**self).disable();
    }

    fn set_load_value(&mut self, value: u32) {
        (**self).set_load_value(value);
    }

    fn enable(&mut self) {
        (**self).enable();
    }
}

/// Converts periods to load values for one module clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerConfig {
    /// Period of the module clock in nanoseconds.
    ns_per_tick: u32,
}

impl TimerConfig {
    /// Creates a calculator for a timer clocked at `module_clock_hz`.
    ///
    /// # Returns
    /// - [`Error::InvalidModuleClock`] if the clock is zero or its period is
    ///   shorter than one nanosecond
    pub fn new(module_clock_hz: u32) -> Result<Self> {
        if module_clock_hz == 0 || module_clock_hz > NANOS_PER_SECOND {
            return Err(Error::InvalidModuleClock(module_clock_hz));
        }
        Ok(Self {
            ns_per_tick: NANOS_PER_SECOND / module_clock_hz,
        })
    }

    /// Period of one timer tick in nanoseconds.
    pub fn ns_per_tick(&self) -> u32 {
        self.ns_per_tick
    }

    /// Computes the load value for a period.
    ///
    /// # Arguments
    /// - `period_ns`: desired interrupt period in nanoseconds (e.g. 1 250 000)
    ///
    /// # Returns
    /// - `period_ns / ns_per_tick - 1`, saturating at zero
    pub fn load_value(&self, period_ns: u32) -> u32 {
        (period_ns / self.ns_per_tick).saturating_sub(1)
    }
}

/// Changes the sampling period in one critical section.
///
/// The timer is stopped, reloaded and restarted so the new period applies
/// to the very next sample instead of after the running one expires.
pub fn reprogram<T: SampleTimer>(timer: &mut T, config: &TimerConfig, period_ns: u32) {
    let load = config.load_value(period_ns);
    critical_section::with(|_| {
        timer.disable();
        timer.set_load_value(load);
        timer.enable();
    });
    debug!("sampling timer reloaded: {} ns, load value {}", period_ns, load);
}

/// Computes the sampling period for a mains frequency.
///
/// # Arguments
/// - `mains_hz`: mains frequency in hertz (e.g. 50.0)
/// - `samples_per_cycle`: samples taken per mains cycle (e.g. 16)
///
/// # Returns
/// - Sampling period in nanoseconds (rounds to nearest integer)
pub fn sample_period_ns(mains_hz: f32, samples_per_cycle: u8) -> u32 {
    let sample_hz = mains_hz * f32::from(samples_per_cycle);
    roundf(NANOS_PER_SECOND as f32 / sample_hz) as u32
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::consts::{SAMPLES_PER_CYCLE_U8, SAMPLE_PERIOD_NS};

    /// One call made on a [`RecordingTimer`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) enum TimerOp {
        Disable,
        Load(u32),
        Enable,
    }

    /// Records every call for later inspection.
    #[derive(Debug, Default)]
    pub(crate) struct RecordingTimer {
        pub(crate) ops: heapless::Vec<TimerOp, 32>,
    }

    impl SampleTimer for RecordingTimer {
        fn disable(&mut self) {
            self.ops.push(TimerOp::Disable).unwrap();
        }

        fn set_load_value(&mut self, value: u32) {
            self.ops.push(TimerOp::Load(value)).unwrap();
        }

        fn enable(&mut self) {
            self.ops.push(TimerOp::Enable).unwrap();
        }
    }

    #[test]
    fn test_load_value_at_50mhz() {
        let config = TimerConfig::new(50_000_000).unwrap();
        assert_eq!(config.ns_per_tick(), 20);
        assert_eq!(config.load_value(SAMPLE_PERIOD_NS), 62_499);
        assert_eq!(config.load_value(1_252_506), 62_624);
        assert_eq!(config.load_value(1_247_494), 62_373);
    }

    #[test]
    fn test_load_value_saturates_at_zero() {
        let config = TimerConfig::new(50_000_000).unwrap();
        assert_eq!(config.load_value(0), 0);
        assert_eq!(config.load_value(19), 0);
    }

    #[test]
    fn test_timer_config_rejects_invalid_clock() {
        assert_eq!(TimerConfig::new(0), Err(Error::InvalidModuleClock(0)));
        assert_eq!(
            TimerConfig::new(2_000_000_000),
            Err(Error::InvalidModuleClock(2_000_000_000))
        );
    }

    #[test]
    fn test_reprogram_disables_loads_enables() {
        let config = TimerConfig::new(50_000_000).unwrap();
        let mut timer = RecordingTimer::default();
        reprogram(&mut timer, &config, SAMPLE_PERIOD_NS);
        assert_eq!(
            timer.ops.as_slice(),
            &[TimerOp::Disable, TimerOp::Load(62_499), TimerOp::Enable]
        );
    }

    #[test]
    fn test_sample_period_for_mains() {
        assert_eq!(sample_period_ns(50.0, SAMPLES_PER_CYCLE_U8), SAMPLE_PERIOD_NS);
        assert_eq!(sample_period_ns(52.5, SAMPLES_PER_CYCLE_U8), 1_190_476);
    }
}
