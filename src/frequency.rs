//! Mains frequency tracking.
//!
//! The sampling timer has to stay locked to the mains so that one window of
//! `SAMPLES_PER_CYCLE` samples spans exactly one cycle. This module implements
//! the bang-bang loop that keeps it there: it counts voltage samples between
//! zero crossings and nudges the frequency offset by one step whenever a
//! half-cycle comes out too long or too short.
//!
//! The offset maps to a sampling period as
//! `SAMPLE_PERIOD_BASE_NS + SAMPLE_PERIOD_STEP_NS × offset`, so offset 0 is
//! the shortest period (52.5 Hz mains) and offset 50 the longest (47.5 Hz).

use log::debug;

use crate::consts::{
    FREQUENCY_BASE_DECIHERTZ, FREQUENCY_OFFSET_MAX, FREQUENCY_OFFSET_MIN, SAMPLE_PERIOD_BASE_NS,
    SAMPLE_PERIOD_STEP_NS,
};

/// Lock state of a [`FrequencyTracker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    /// Waiting for the first zero crossing after start-up or a correction.
    Unlocked,
    /// Counting samples between zero crossings.
    Locked,
}

#[derive(Debug)]
/// Software frequency-locked loop fed with raw voltage samples.
///
/// Each call to [`update`](FrequencyTracker::update) handles one sample. The
/// tracker never touches the timer itself; it reports a new offset and the
/// caller reprograms the hardware.
pub struct FrequencyTracker {
    /// Number of non-crossing samples in a correctly sampled half-cycle.
    ///
    /// `samples_per_cycle / 2 - 1`: one sample of each half-cycle is the
    /// crossing itself.
    expected_ticks: u8,

    /// Current frequency offset, within `FREQUENCY_OFFSET_MIN..=FREQUENCY_OFFSET_MAX`.
    offset: u8,

    /// Whether a zero crossing has been seen since the last correction.
    state: TrackerState,

    /// Non-crossing samples since the last crossing.
    ///
    /// Only advances while locked.
    ticks: u8,

    /// The previous raw sample, used to detect sign changes.
    previous: i16,
}

impl FrequencyTracker {
    /// Creates an unlocked tracker.
    ///
    /// # Arguments
    /// - `samples_per_cycle`: samples in one mains cycle (16 in the reference
    ///   design)
    /// - `initial_offset`: starting frequency offset, clamped to the valid range
    pub fn new(samples_per_cycle: u8, initial_offset: u8) -> Self {
        Self {
            expected_ticks: (samples_per_cycle / 2).saturating_sub(1),
            offset: initial_offset.clamp(FREQUENCY_OFFSET_MIN, FREQUENCY_OFFSET_MAX),
            state: TrackerState::Unlocked,
            ticks: 0,
            previous: 0,
        }
    }

    /// Feeds one voltage sample into the loop.
    ///
    /// # Returns
    /// - `Some(offset)` when the half-cycle just closed was off and the
    ///   offset moved; the caller must reprogram the sampling timer with
    ///   [`sample_period_ns`](FrequencyTracker::sample_period_ns)
    /// - `None` otherwise, including when a correction was needed but the
    ///   offset is already at the matching bound
    pub fn update(&mut self, sample: i16) -> Option<u8> {
        let crossing = i32::from(self.previous) * i32::from(sample) < 0;
        self.previous = sample;

        match (self.state, crossing) {
            (TrackerState::Unlocked, true) => {
                self.state = TrackerState::Locked;
                None
            }
            (TrackerState::Unlocked, false) => None,
            (TrackerState::Locked, false) => {
                self.ticks = self.ticks.saturating_add(1);
                None
            }
            (TrackerState::Locked, true) => {
                let ticks = core::mem::replace(&mut self.ticks, 0);
                let corrected = if ticks > self.expected_ticks {
                    self.offset.checked_add(1).filter(|o| *o <= FREQUENCY_OFFSET_MAX)
                } else if ticks < self.expected_ticks {
                    self.offset.checked_sub(1)
                } else {
                    None
                };

                let offset = corrected?;
                debug!(
                    "half-cycle of {} ticks (expected {}), frequency offset {} -> {}",
                    ticks, self.expected_ticks, self.offset, offset
                );
                self.offset = offset;
                self.state = TrackerState::Unlocked;
                Some(offset)
            }
        }
    }

    /// Current frequency offset.
    pub fn offset(&self) -> u8 {
        self.offset
    }

    /// Current lock state.
    pub fn state(&self) -> TrackerState {
        self.state
    }

    /// Non-crossing samples counted in the half-cycle in progress.
    pub fn ticks(&self) -> u8 {
        self.ticks
    }

    /// Sampling period for the current offset, in nanoseconds.
    pub fn sample_period_ns(&self) -> u32 {
        period_for_offset(self.offset)
    }
}

/// Sampling period for `offset`, in nanoseconds.
pub const fn period_for_offset(offset: u8) -> u32 {
    SAMPLE_PERIOD_BASE_NS + SAMPLE_PERIOD_STEP_NS * offset as u32
}

/// Mains frequency for `offset`, in tenths of a hertz (offset 25 is 500).
pub const fn decihertz_for_offset(offset: u8) -> u16 {
    FREQUENCY_BASE_DECIHERTZ - offset as u16
}
