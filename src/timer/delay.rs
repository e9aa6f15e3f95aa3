use core::cell::Cell;
use core::fmt;

use critical_section::Mutex;
use embedded_hal::delay::DelayNs;
use log::warn;

use super::{SampleTimer, TimerConfig};
use crate::acquisition::{Acquisition, SamplePair, SampleSource};
use crate::error::Result;

#[derive(Clone, Copy)]
struct Register {
    load: u32,
    enabled: bool,
}

/// A software stand-in for the sampling timer when samples are paced by a
/// blocking delay instead of an interrupt.
///
/// The voltage channel reprograms it through `&PeriodRegister` exactly like a
/// hardware timer; the sample loop reads the period back out.
pub struct PeriodRegister {
    config: TimerConfig,
    register: Mutex<Cell<Register>>,
}

impl PeriodRegister {
    /// Creates a stopped register for a timer clocked as `config` describes.
    pub const fn new(config: TimerConfig) -> Self {
        Self {
            config,
            register: Mutex::new(Cell::new(Register {
                load: 0,
                enabled: false,
            })),
        }
    }

    /// Sampling period implied by the current load value, in nanoseconds.
    pub fn period_ns(&self) -> u32 {
        let load = critical_section::with(|cs| self.register.borrow(cs).get().load);
        load.saturating_add(1)
            .saturating_mul(self.config.ns_per_tick())
    }

    /// Whether the register is currently enabled.
    pub fn is_enabled(&self) -> bool {
        critical_section::with(|cs| self.register.borrow(cs).get().enabled)
    }

    fn modify(&self, f: impl FnOnce(&mut Register)) {
        critical_section::with(|cs| {
            let cell = self.register.borrow(cs);
            let mut register = cell.get();
            f(&mut register);
            cell.set(register);
        });
    }
}

impl SampleTimer for &PeriodRegister {
    fn disable(&mut self) {
        self.modify(|r| r.enabled = false);
    }

    fn set_load_value(&mut self, value: u32) {
        self.modify(|r| r.load = value);
    }

    fn enable(&mut self) {
        self.modify(|r| r.enabled = true);
    }
}

impl fmt::Debug for PeriodRegister {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeriodRegister")
            .field("config", &self.config)
            .field("period_ns", &self.period_ns())
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

/// Takes one sample pair, then waits out the sampling period.
///
/// Nothing is sampled while the register is disabled; the call only waits.
///
/// # Returns
/// - `None` if the register was disabled
/// - The outcome of [`Acquisition::on_interrupt`] otherwise
pub fn sample_once<A: SampleSource, D: DelayNs>(
    acquisition: &mut Acquisition<'_, A>,
    delay: &mut D,
    register: &PeriodRegister,
) -> Option<Result<SamplePair>> {
    let outcome = register.is_enabled().then(|| acquisition.on_interrupt());
    delay.delay_ns(register.period_ns());
    outcome
}

/// Runs a blocking loop that samples at the period held in `register`.
///
/// This is a simple timing loop for use in environments where interrupts are unavailable
/// or undesired. The period follows every reprogramming done by the voltage channel.
///
/// # Arguments
/// - `acquisition`: The acquisition stage to drive.
/// - `delay`: A delay provider implementing `DelayNs`, typically from the HAL.
/// - `register`: The register the voltage channel reprograms.
/// - `after_sample`: Called after every sample, e.g. to poll the consumers.
///
/// # Example
/// ```rust,ignore
/// let register = PeriodRegister::new(TimerConfig::new(50_000_000)?);
/// let mut voltage = VoltageChannel::new(&config, &VOLTAGE_WAKE, &register, &READINGS)?;
/// run_sample_loop(&mut acquisition, &mut delay, &register, || {
///     let _ = voltage.poll();
/// });
/// ```
///
/// # Notes
/// - This loop will never return; it is intended for single-purpose polling firmware.
/// - Failed ADC reads are logged and skipped.
pub fn run_sample_loop<A, D, F>(
    acquisition: &mut Acquisition<'_, A>,
    delay: &mut D,
    register: &PeriodRegister,
    mut after_sample: F,
) where
    A: SampleSource,
    D: DelayNs,
    F: FnMut(),
{
    loop {
        if let Some(Err(e)) = sample_once(acquisition, delay, register) {
            warn!("sample skipped: {}", e);
        }
        after_sample();
    }
}
