//! Per-cycle power, energy and cost accumulation.
//!
//! The aggregator is woken once per sample by the current channel. It sums
//! the instantaneous `v × i` products, and after a full cycle turns the sum
//! into average power, an energy increment, a cost increment and a power
//! factor, and adds them to the long-lived totals.
//!
//! None of this can fail: negative cycle power (energy flowing back) is
//! clamped to zero, and totals saturate instead of wrapping.

use core::convert::Infallible;
use core::fmt;

use log::warn;

use crate::acquisition::{SamplePair, WakeQueue, WakeReceiver};
use crate::config::TimeBase;
use crate::consts::{
    JOULES_PER_KWH, POWER_FACTOR_MAX, POWER_RESCALE_BIAS, POWER_RESCALE_DIVISOR,
    SAMPLES_PER_CYCLE_U8,
};
use crate::readings::Readings;
use crate::tariff::{Tariff, TimeOfDay};

/// What one completed cycle contributed to the totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CycleSummary {
    /// Rescaled cycle power (the `v × i` sum in Q16 units), clamped at zero.
    pub power: u64,
    /// Average power over the cycle, Q16 watts.
    pub average_power: u32,
    /// Energy added, Q32 joules.
    pub energy: u64,
    /// Cost added, Q32 cents.
    pub cost: u64,
    /// Rate the cost was computed with, Q16 cents per kilowatt-hour.
    pub rate: u32,
    /// Power factor of the cycle, Q8.
    pub power_factor: u16,
}

/// Computes the power factor as apparent over real power.
///
/// # Arguments
/// - `average_power`: real power, Q16 watts
/// - `voltage_rms`: Q8 volts
/// - `current_rms`: Q8 amperes
///
/// # Returns
/// `(voltage_rms × current_rms) / average_power` in Q8, bounded at
/// [`POWER_FACTOR_MAX`] so a small but non-zero average power cannot blow the
/// result up. Zero when the average power is zero.
pub fn power_factor(average_power: u32, voltage_rms: u16, current_rms: u16) -> u16 {
    if average_power == 0 {
        return 0;
    }
    let apparent = u64::from(voltage_rms) * u64::from(current_rms);
    let ratio = (apparent << 8) / u64::from(average_power);
    u16::try_from(ratio)
        .unwrap_or(POWER_FACTOR_MAX)
        .min(POWER_FACTOR_MAX)
}

/// Folds each sample pair into the running cycle and publishes cycle results.
pub struct CycleAggregator<'a, C: TimeOfDay> {
    /// Woken by the current channel once per sample.
    wake: WakeReceiver<'a>,

    readings: &'a Readings,
    tariff: &'a Tariff,
    clock: C,
    time_base: &'a TimeBase,

    /// Sum of raw `v × i` products in the current cycle.
    ///
    /// 64 bits wide: sixteen full-scale products exceed `i32`.
    sum: i64,

    /// Samples folded into `sum`, `0..SAMPLES_PER_CYCLE`.
    count: u8,

    /// Set once the missing-tariff warning has been logged.
    warned_no_rate: bool,
}

impl<'a, C: TimeOfDay> CycleAggregator<'a, C> {
    /// Creates an aggregator with an empty cycle.
    pub fn new(
        wake: &'a WakeQueue,
        readings: &'a Readings,
        tariff: &'a Tariff,
        clock: C,
        time_base: &'a TimeBase,
    ) -> Self {
        Self {
            wake: wake.receiver(),
            readings,
            tariff,
            clock,
            time_base,
            sum: 0,
            count: 0,
            warned_no_rate: false,
        }
    }

    /// Adds one sample pair to the cycle.
    ///
    /// # Returns
    /// - `Some(summary)` when this pair completed a cycle; the totals have
    ///   already been updated
    /// - `None` otherwise
    pub fn accumulate(&mut self, pair: SamplePair) -> Option<CycleSummary> {
        self.sum += i64::from(pair.voltage) * i64::from(pair.current);
        self.count += 1;
        if self.count < SAMPLES_PER_CYCLE_U8 {
            return None;
        }

        let sum = core::mem::replace(&mut self.sum, 0);
        self.count = 0;

        let power = u64::try_from((sum + POWER_RESCALE_BIAS) / POWER_RESCALE_DIVISOR).unwrap_or(0);
        let energy = power.saturating_mul(u64::from(self.time_base.get()));
        let average_power =
            u32::try_from(power * 100 / u64::from(SAMPLES_PER_CYCLE_U8)).unwrap_or(u32::MAX);

        let rate = self.tariff.rate(&self.clock);
        if rate == 0 && !self.warned_no_rate {
            warn!("no tariff loaded, energy is not being billed");
            self.warned_no_rate = true;
        }
        let cost = (energy >> 16).saturating_mul(u64::from(rate)) / JOULES_PER_KWH;

        let power_factor = self.readings.update(|s| {
            let pf = power_factor(average_power, s.voltage_rms, s.current_rms);
            s.average_power = average_power;
            s.energy = s.energy.saturating_add(energy);
            s.cost = s.cost.saturating_add(cost);
            s.power_factor = pf;
            s.cycles = s.cycles.wrapping_add(1);
            pf
        });

        Some(CycleSummary {
            power,
            average_power,
            energy,
            cost,
            rate,
            power_factor,
        })
    }

    /// Handles one pending wake, if any.
    pub fn poll(&mut self) -> nb::Result<Option<CycleSummary>, Infallible> {
        match self.wake.try_receive() {
            Ok(pair) => Ok(self.accumulate(pair)),
            Err(_) => Err(nb::Error::WouldBlock),
        }
    }

    /// Waits for wakes forever.
    pub async fn run(&mut self) {
        loop {
            let pair = self.wake.receive().await;
            let _ = self.accumulate(pair);
        }
    }

    /// Samples folded into the cycle in progress.
    pub fn pending_samples(&self) -> u8 {
        self.count
    }
}

impl<C: TimeOfDay + fmt::Debug> fmt::Debug for CycleAggregator<'_, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CycleAggregator")
            .field("clock", &self.clock)
            .field("sum", &self.sum)
            .field("count", &self.count)
            .finish_non_exhaustive()
    }
}
