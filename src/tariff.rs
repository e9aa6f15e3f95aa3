//! Tariff selection and rate lookup.
//!
//! Three tariffs are supported: a time-of-use tariff with off-peak, shoulder
//! and peak bands, and two flat tariffs. The selected mode is persisted as a
//! single byte through a [`TariffStore`] so it survives a power cycle.
//!
//! Rates are Q16 cents per kilowatt-hour.

use core::cell::Cell;
use core::fmt;

use critical_section::Mutex;
use log::{info, warn};

use crate::error::{Error, Result};

/// Persistent storage for the tariff mode byte.
pub trait TariffStore {
    /// Error reported by the underlying storage.
    type Error: fmt::Debug;

    /// Reads the stored byte. Erased storage may return any value.
    fn read_mode(&mut self) -> core::result::Result<u8, Self::Error>;

    /// Persists `mode`.
    fn write_mode(&mut self, mode: u8) -> core::result::Result<(), Self::Error>;
}

/// Wall-clock source used by the time-of-use tariff.
pub trait TimeOfDay {
    /// Current hour of the day, `0..=23`.
    fn hour(&self) -> u8;
}

/// A selectable tariff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TariffMode {
    /// Time-of-use: rate depends on the hour of the day.
    TimeOfUse = 1,
    /// Flat rate of 1.713 c/kWh.
    FlatStandard = 2,
    /// Flat rate of 4.100 c/kWh.
    FlatPremium = 3,
}

impl TariffMode {
    /// The byte stored and reported for this mode.
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for TariffMode {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Self::TimeOfUse),
            2 => Ok(Self::FlatStandard),
            3 => Ok(Self::FlatPremium),
            other => Err(Error::InvalidTariffMode(other)),
        }
    }
}

/// A band of the time-of-use tariff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TariffBand {
    /// Before 07:00 and from 22:00.
    OffPeak,
    /// 07:00 to 14:00 and 20:00 to 22:00.
    Shoulder,
    /// 14:00 to 20:00.
    Peak,
}

impl TariffBand {
    /// Peak rate, 22.235 c/kWh.
    pub const PEAK_RATE: u32 = 1_457_193;
    /// Shoulder rate, 4.400 c/kWh.
    pub const SHOULDER_RATE: u32 = 288_358;
    /// Off-peak rate, 2.109 c/kWh.
    pub const OFF_PEAK_RATE: u32 = 138_215;

    /// Band in force during `hour`.
    pub fn for_hour(hour: u8) -> Self {
        if !(7..22).contains(&hour) {
            Self::OffPeak
        } else if !(14..20).contains(&hour) {
            Self::Shoulder
        } else {
            Self::Peak
        }
    }

    /// Rate of this band.
    pub fn rate(self) -> u32 {
        match self {
            Self::OffPeak => Self::OFF_PEAK_RATE,
            Self::Shoulder => Self::SHOULDER_RATE,
            Self::Peak => Self::PEAK_RATE,
        }
    }
}

/// Rate of [`TariffMode::FlatStandard`].
pub const FLAT_STANDARD_RATE: u32 = 112_263;

/// Rate of [`TariffMode::FlatPremium`].
pub const FLAT_PREMIUM_RATE: u32 = 268_698;

/// The selected tariff, shared between the protocol side and the aggregator.
///
/// Starts uninitialised; [`init`](Tariff::init) loads the persisted mode.
pub struct Tariff {
    mode: Mutex<Cell<Option<TariffMode>>>,
}

impl Tariff {
    /// Creates an uninitialised tariff.
    pub const fn new() -> Self {
        Self {
            mode: Mutex::new(Cell::new(None)),
        }
    }

    /// Loads the persisted mode.
    ///
    /// A missing or invalid byte selects [`TariffMode::TimeOfUse`] and writes
    /// it back so the next start-up finds a valid value.
    pub fn init<S: TariffStore>(&self, store: &mut S) -> Result<TariffMode> {
        let byte = store.read_mode().map_err(|e| {
            warn!("tariff store read failed: {:?}", e);
            Error::Storage
        })?;

        let mode = match TariffMode::try_from(byte) {
            Ok(mode) => mode,
            Err(_) => {
                warn!("stored tariff byte {} is invalid, defaulting to time-of-use", byte);
                let mode = TariffMode::TimeOfUse;
                Self::persist(store, mode)?;
                mode
            }
        };

        self.store(mode);
        info!("tariff mode {:?} loaded", mode);
        Ok(mode)
    }

    /// Selects tariff `mode` and persists it.
    ///
    /// Selecting the mode already in force succeeds without touching the
    /// store. On any error the current mode is left unchanged.
    pub fn set_mode<S: TariffStore>(&self, store: &mut S, mode: u8) -> Result<TariffMode> {
        let mode = TariffMode::try_from(mode)?;
        if self.mode() == Some(mode) {
            return Ok(mode);
        }

        Self::persist(store, mode)?;
        self.store(mode);
        info!("tariff mode set to {:?}", mode);
        Ok(mode)
    }

    /// The selected mode, `None` before [`init`](Tariff::init).
    pub fn mode(&self) -> Option<TariffMode> {
        critical_section::with(|cs| self.mode.borrow(cs).get())
    }

    /// The selected mode as reported on the wire, `0` when uninitialised.
    pub fn mode_byte(&self) -> u8 {
        self.mode().map_or(0, TariffMode::as_byte)
    }

    /// Rate currently in force, Q16 cents per kilowatt-hour.
    ///
    /// Returns `0` when no mode has been loaded yet.
    pub fn rate<C: TimeOfDay>(&self, clock: &C) -> u32 {
        match self.mode() {
            Some(TariffMode::TimeOfUse) => TariffBand::for_hour(clock.hour()).rate(),
            Some(TariffMode::FlatStandard) => FLAT_STANDARD_RATE,
            Some(TariffMode::FlatPremium) => FLAT_PREMIUM_RATE,
            None => 0,
        }
    }

    fn store(&self, mode: TariffMode) {
        critical_section::with(|cs| self.mode.borrow(cs).set(Some(mode)));
    }

    fn persist<S: TariffStore>(store: &mut S, mode: TariffMode) -> Result<()> {
        store.write_mode(mode.as_byte()).map_err(|e| {
            warn!("tariff store write failed: {:?}", e);
            Error::Storage
        })
    }
}

impl Default for Tariff {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Tariff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tariff").field("mode", &self.mode()).finish()
    }
}
