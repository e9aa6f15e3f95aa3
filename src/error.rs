//! Error type shared by the fallible edges of the metering engine.
//!
//! The real-time path (sampling, RMS, frequency tracking, aggregation) never
//! fails: anomalies there are clamped in place. Errors only surface from
//! configuration, the tariff store and the acquisition boundary.

use crate::acquisition::AnalogChannel;

/// Every fallible operation in the crate returns this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// A tariff mode byte other than 1, 2 or 3 was supplied.
    #[error("invalid tariff mode {0}")]
    InvalidTariffMode(u8),
    /// The persistent tariff byte could not be read or written.
    #[error("tariff store access failed")]
    Storage,
    /// The module clock cannot express a period in whole nanoseconds per tick.
    #[error("module clock of {0} Hz is out of range")]
    InvalidModuleClock(u32),
    /// The ADC reported an error for the given channel.
    #[error("analog read failed on the {0:?} channel")]
    Adc(AnalogChannel),
    /// A configuration field failed validation.
    #[error("invalid configuration: {0}")]
    Config(&'static str),
}

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
