//! Start-up configuration and the injected time base.

use core::cell::Cell;
use core::fmt;

use critical_section::Mutex;
use log::info;

use crate::consts::{CURRENT_RATIO, FREQUENCY_OFFSET_MAX, FREQUENCY_OFFSET_NOMINAL, VOLTAGE_RATIO};
use crate::error::{Error, Result};
use crate::timer::TimerConfig;

/// Board-level parameters, checked once before the pipeline starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeterConfig {
    /// Clock feeding the sampling timer, in hertz.
    ///
    /// Its period must be a whole number of nanoseconds.
    pub module_clock_hz: u32,

    /// Line voltage per volt at the ADC pin.
    pub voltage_ratio: u32,

    /// Line current per volt at the ADC pin.
    pub current_ratio: u32,

    /// Frequency offset the sampling timer starts at.
    pub initial_frequency_offset: u8,
}

impl MeterConfig {
    /// Checks every field.
    ///
    /// # Returns
    /// - [`Error::InvalidModuleClock`] if the clock is zero or faster than 1 GHz
    /// - [`Error::Config`] if a ratio is zero or the offset is out of range
    pub fn validate(&self) -> Result<()> {
        let _ = TimerConfig::new(self.module_clock_hz)?;
        if self.voltage_ratio == 0 {
            return Err(Error::Config("voltage ratio must be non-zero"));
        }
        if self.current_ratio == 0 {
            return Err(Error::Config("current ratio must be non-zero"));
        }
        if self.initial_frequency_offset > FREQUENCY_OFFSET_MAX {
            return Err(Error::Config("initial frequency offset above 50"));
        }
        Ok(())
    }
}

impl Default for MeterConfig {
    fn default() -> Self {
        Self {
            module_clock_hz: 50_000_000,
            voltage_ratio: VOLTAGE_RATIO,
            current_ratio: CURRENT_RATIO,
            initial_frequency_offset: FREQUENCY_OFFSET_NOMINAL,
        }
    }
}

/// Energy time base: the duration of one sampled cycle, as the multiplier
/// taking rescaled cycle power to Q32 joules.
///
/// The test mode runs the meter 3600 times faster so an hour of billing
/// passes in a second.
pub struct TimeBase {
    value: Mutex<Cell<u32>>,
}

impl TimeBase {
    /// Real-time time base.
    pub const NORMAL: u32 = 8_192;

    /// Accelerated test-mode time base.
    pub const ACCELERATED: u32 = 29_491_200;

    /// Creates a real-time time base.
    pub const fn new() -> Self {
        Self::with_value(Self::NORMAL)
    }

    /// Creates a time base with an arbitrary multiplier.
    ///
    /// Boards whose cycle period differs from the reference design pick their
    /// own value; [`NORMAL`](Self::NORMAL) and
    /// [`ACCELERATED`](Self::ACCELERATED) are the stock presets.
    pub const fn with_value(value: u32) -> Self {
        Self {
            value: Mutex::new(Cell::new(value)),
        }
    }

    /// Replaces the multiplier in force.
    pub fn set(&self, value: u32) {
        critical_section::with(|cs| self.value.borrow(cs).set(value));
        info!("time base set to {}", value);
    }

    /// Switches between real time and the accelerated test mode.
    pub fn set_accelerated(&self, accelerated: bool) {
        self.set(if accelerated {
            Self::ACCELERATED
        } else {
            Self::NORMAL
        });
    }

    /// `true` while in the accelerated test mode.
    pub fn is_accelerated(&self) -> bool {
        self.get() == Self::ACCELERATED
    }

    /// The multiplier currently in force.
    pub fn get(&self) -> u32 {
        critical_section::with(|cs| self.value.borrow(cs).get())
    }
}

impl Default for TimeBase {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TimeBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TimeBase").field(&self.get()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(MeterConfig::default().validate(), Ok(()));
    }

    #[test]
    fn test_config_rejects_zero_ratio() {
        let config = MeterConfig {
            current_ratio: 0,
            ..MeterConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_config_rejects_offset_out_of_range() {
        let config = MeterConfig {
            initial_frequency_offset: 51,
            ..MeterConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_config_rejects_zero_clock() {
        let config = MeterConfig {
            module_clock_hz: 0,
            ..MeterConfig::default()
        };
        assert_eq!(config.validate(), Err(Error::InvalidModuleClock(0)));
    }

    #[test]
    fn test_time_base_switches_modes() {
        let time_base = TimeBase::new();
        assert_eq!(time_base.get(), TimeBase::NORMAL);
        assert!(!time_base.is_accelerated());

        time_base.set_accelerated(true);
        assert_eq!(time_base.get(), 29_491_200);
        assert!(time_base.is_accelerated());
        assert_eq!(TimeBase::ACCELERATED, TimeBase::NORMAL * 3_600);

        time_base.set_accelerated(false);
        assert_eq!(time_base.get(), TimeBase::NORMAL);
    }

    #[test]
    fn test_time_base_accepts_custom_value() {
        let time_base = TimeBase::with_value(16_384);
        assert_eq!(time_base.get(), 16_384);
        assert!(!time_base.is_accelerated());

        time_base.set(100);
        assert_eq!(time_base.get(), 100);

        time_base.set(TimeBase::ACCELERATED);
        assert!(time_base.is_accelerated());
    }
}
