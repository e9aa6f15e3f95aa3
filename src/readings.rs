//! Long-lived meter totals.
//!
//! Every value the protocol layer can ask for lives in one [`Readings`]
//! region. The channel consumers and the cycle aggregator write their own
//! fields inside a critical section; readers take a [`MeterSnapshot`], a
//! consistent copy of every field at one instant.

use core::cell::Cell;
use core::fmt;

use critical_section::Mutex;

use crate::consts::{FREQUENCY_OFFSET_NOMINAL, SECONDS_PER_HOUR};
use crate::frequency::decihertz_for_offset;

/// A consistent copy of every published meter value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeterSnapshot {
    /// Most recent raw voltage sample.
    pub voltage: i16,
    /// Most recent raw current sample.
    pub current: i16,
    /// Voltage RMS in Q8 volts, saturated to `u16::MAX`.
    pub voltage_rms: u16,
    /// Current RMS in Q8 amperes.
    pub current_rms: u16,
    /// Average power over the last cycle, Q16 watts.
    pub average_power: u32,
    /// Accumulated energy, Q32 joules. Never decreases.
    pub energy: u64,
    /// Accumulated cost, Q32 cents. Never decreases.
    pub cost: u64,
    /// Power factor of the last cycle, Q8 (256 is unity).
    pub power_factor: u16,
    /// Frequency offset the sampling timer is running at.
    pub frequency_offset: u8,
    /// Completed mains cycles since start-up.
    pub cycles: u32,
}

impl MeterSnapshot {
    /// Power-on values.
    pub const INITIAL: Self = Self {
        voltage: 0,
        current: 0,
        voltage_rms: 0,
        current_rms: 0,
        average_power: 0,
        energy: 0,
        cost: 0,
        power_factor: 0,
        frequency_offset: FREQUENCY_OFFSET_NOMINAL,
        cycles: 0,
    };

    /// Mains frequency in tenths of a hertz.
    pub fn frequency_decihertz(&self) -> u16 {
        decihertz_for_offset(self.frequency_offset)
    }

    /// Average power in whole watts.
    pub fn average_power_watts(&self) -> u32 {
        self.average_power >> 16
    }

    /// Accumulated energy in whole watt-hours.
    pub fn energy_watt_hours(&self) -> u64 {
        ((self.energy >> 16) / u64::from(SECONDS_PER_HOUR)) >> 16
    }

    /// Accumulated cost in whole cents.
    pub fn cost_cents(&self) -> u64 {
        self.cost >> 32
    }
}

impl Default for MeterSnapshot {
    fn default() -> Self {
        Self::INITIAL
    }
}

/// Shared storage for the meter totals.
///
/// Intended to live in a `static`:
///
/// ```rust
/// use mainsmeter::readings::Readings;
///
/// static READINGS: Readings = Readings::new();
///
/// let snapshot = READINGS.snapshot();
/// assert_eq!(snapshot.energy, 0);
/// ```
pub struct Readings {
    inner: Mutex<Cell<MeterSnapshot>>,
}

impl Readings {
    /// Creates a region holding [`MeterSnapshot::INITIAL`].
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(Cell::new(MeterSnapshot::INITIAL)),
        }
    }

    /// Returns every value as of one instant.
    pub fn snapshot(&self) -> MeterSnapshot {
        critical_section::with(|cs| self.inner.borrow(cs).get())
    }

    /// Applies `f` to the totals inside one critical section.
    pub(crate) fn update<R>(&self, f: impl FnOnce(&mut MeterSnapshot) -> R) -> R {
        critical_section::with(|cs| {
            let cell = self.inner.borrow(cs);
            let mut snapshot = cell.get();
            let result = f(&mut snapshot);
            cell.set(snapshot);
            result
        })
    }
}

impl Default for Readings {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Readings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Readings").field(&self.snapshot()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_readings_start_at_initial_values() {
        let readings = Readings::new();
        let snapshot = readings.snapshot();
        assert_eq!(snapshot, MeterSnapshot::INITIAL);
        assert_eq!(snapshot.frequency_offset, 25);
        assert_eq!(snapshot.frequency_decihertz(), 500);
    }

    #[test]
    fn test_update_is_visible_in_next_snapshot() {
        let readings = Readings::new();
        let cycles = readings.update(|s| {
            s.energy += 10;
            s.cycles += 1;
            s.cycles
        });
        assert_eq!(cycles, 1);
        let snapshot = readings.snapshot();
        assert_eq!(snapshot.energy, 10);
        assert_eq!(snapshot.cycles, 1);
    }

    #[test]
    fn test_unit_conversions() {
        let snapshot = MeterSnapshot {
            average_power: 30_115_000,
            // 2 Wh plus change: 7200 J in Q32.
            energy: 7_300u64 << 32,
            cost: (42u64 << 32) + 12345,
            frequency_offset: 24,
            ..MeterSnapshot::INITIAL
        };
        assert_eq!(snapshot.average_power_watts(), 459);
        assert_eq!(snapshot.energy_watt_hours(), 2);
        assert_eq!(snapshot.cost_cents(), 42);
        assert_eq!(snapshot.frequency_decihertz(), 501);
    }
}
