//! Fixed-capacity rolling window of squared samples.
//!
//! Each channel keeps the last `N` working samples together with a running
//! sum, so the mean over the window is available in constant time on every
//! timer interrupt.

use heapless::HistoryBuffer;

/// Fill state of a [`SampleWindow`].
///
/// RMS consumers use the transition from `Filling` to `SteadyState` to pick a
/// cold (fully iterated) square root once and warm single-step refinements
/// afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowState {
    /// Fewer than `N` samples have been pushed.
    Filling,
    /// The window holds `N` samples; each push evicts the oldest.
    SteadyState,
}

/// Rolling window over the last `N` values with an O(1) running sum.
///
/// Invariant: `sum()` always equals the sum of the values currently held.
#[derive(Debug)]
pub struct SampleWindow<const N: usize> {
    /// Storage for the most recent values.
    entries: HistoryBuffer<u32, N>,

    /// Sum of every value in `entries`.
    ///
    /// 64 bits wide so `N` full-scale `u32` entries cannot overflow it.
    sum: u64,
}

impl<const N: usize> SampleWindow<N> {
    /// Creates an empty window.
    pub const fn new() -> Self {
        Self {
            entries: HistoryBuffer::new(),
            sum: 0,
        }
    }

    /// Appends `sample`, evicting the oldest value once the window is full.
    ///
    /// Returns the state after the push.
    pub fn push(&mut self, sample: u32) -> WindowState {
        if self.entries.len() == N {
            if let Some(oldest) = self.entries.oldest_ordered().next() {
                self.sum -= u64::from(*oldest);
            }
        }
        self.entries.write(sample);
        self.sum += u64::from(sample);
        self.state()
    }

    /// Mean of the valid entries, or `None` while the window is empty.
    ///
    /// The result fits in `u32` because every entry does.
    pub fn mean(&self) -> Option<u32> {
        let len = self.entries.len() as u64;
        if len == 0 {
            return None;
        }
        u32::try_from(self.sum / len).ok()
    }

    /// Number of valid entries, saturating at `N`.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` until the first push.
    pub fn is_empty(&self) -> bool {
        self.entries.len() == 0
    }

    /// Running sum of the valid entries.
    pub fn sum(&self) -> u64 {
        self.sum
    }

    /// Current fill state.
    pub fn state(&self) -> WindowState {
        if self.entries.len() == N {
            WindowState::SteadyState
        } else {
            WindowState::Filling
        }
    }

    /// Iterates the valid entries from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &u32> {
        self.entries.oldest_ordered()
    }
}

impl<const N: usize> Default for SampleWindow<N> {
    fn default() -> Self {
        Self::new()
    }
}
