//! Constants shared across the metering pipeline.
//!
//! The design point is 16 samples per mains cycle at a nominal 50 Hz, which
//! puts the sampling timer at 800 Hz (one sample every 1.25 ms). Everything
//! downstream (window capacity, expected zero-crossing spacing, the power
//! rescale divisor, the time base) is derived from that choice.
//!
//! ## Fixed-point formats
//!
//! - Raw ADC samples are signed 16-bit with a base of `10 / 32768` volts.
//! - Working samples are Q16 (`|raw| × 20`), so a full-scale input is 655 360.
//! - RMS estimates are Q8 of the (ratio-scaled) quantity.
//! - Average power is Q16 watts, energy is Q32 joules, cost is Q32 cents.
//! - Tariff rates and power factor are Q16 and Q8 respectively.

/// Number of samples taken per mains cycle.
pub const SAMPLES_PER_CYCLE: usize = 16;

/// See [`SAMPLES_PER_CYCLE`](crate::consts::SAMPLES_PER_CYCLE)
pub const SAMPLES_PER_CYCLE_U8: u8 = SAMPLES_PER_CYCLE as u8;

/// Number of non-crossing samples expected between two zero crossings when the
/// sampling rate is locked to the mains.
pub const EXPECTED_HALF_CYCLE_TICKS: u8 = SAMPLES_PER_CYCLE_U8 / 2 - 1;

/// Sampling period at the nominal 50 Hz mains (800 Hz sampling).
pub const SAMPLE_PERIOD_NS: u32 = 1_250_000;

/// Sampling period at frequency offset 0 (52.5 Hz mains).
pub const SAMPLE_PERIOD_BASE_NS: u32 = 1_187_350;

/// Sampling period change for one frequency offset step (≈0.1 Hz of mains).
pub const SAMPLE_PERIOD_STEP_NS: u32 = 2_506;

/// Lowest frequency offset (52.5 Hz).
pub const FREQUENCY_OFFSET_MIN: u8 = 0;

/// Highest frequency offset (47.5 Hz).
pub const FREQUENCY_OFFSET_MAX: u8 = 50;

/// Frequency offset that reproduces [`SAMPLE_PERIOD_NS`].
pub const FREQUENCY_OFFSET_NOMINAL: u8 = 25;

/// Mains frequency at offset 0, in tenths of a hertz.
pub const FREQUENCY_BASE_DECIHERTZ: u16 = 525;

/// Newton iterations used by [`isqrt`](crate::math::isqrt) when the caller
/// passes zero.
pub const ISQRT_DEFAULT_ITERATIONS: u8 = 25;

/// Multiplier from the raw ADC base to the Q16 working format.
pub const WORKING_SCALE: u64 = 20;

/// Ratio between the voltage channel input and the measured line voltage.
pub const VOLTAGE_RATIO: u32 = 100;

/// Ratio between the current channel input and the measured line current.
pub const CURRENT_RATIO: u32 = 1;

/// Divisor taking a sum of raw `v × i` products (base `100 / 2^30`) to Q16.
pub const POWER_RESCALE_DIVISOR: i64 = 164;

/// Rounding bias added before [`POWER_RESCALE_DIVISOR`] (half the divisor).
pub const POWER_RESCALE_BIAS: i64 = POWER_RESCALE_DIVISOR / 2;

/// Joules in one kilowatt-hour.
pub const JOULES_PER_KWH: u64 = 3_600_000;

/// Seconds in one hour.
pub const SECONDS_PER_HOUR: u32 = 3_600;

/// Power factor 1.0 in Q8.
pub const POWER_FACTOR_UNITY: u16 = 1 << 8;

/// Upper bound on the reported power factor.
pub const POWER_FACTOR_MAX: u16 = POWER_FACTOR_UNITY;

/// Depth of each sample wake queue.
pub const SAMPLE_QUEUE_DEPTH: usize = 4;

/// Nanoseconds in one second.
pub const NANOS_PER_SECOND: u32 = 1_000_000_000;
