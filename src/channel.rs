//! Per-channel sample consumers.
//!
//! Each analog channel has a consumer woken once per sampling interrupt. A
//! consumer turns the raw sample into a squared working value, keeps the last
//! cycle of those in a [`SampleWindow`] and refreshes the channel RMS:
//!
//! ```text
//! raw i16 -> |raw| x 20 (Q16) -> square >> 16 -> window -> mean -> isqrt -> x ratio
//! ```
//!
//! The square root runs to convergence once, when the window first fills.
//! After that a single Newton step seeded with the previous estimate is
//! enough, since only one sample of the window changed.
//!
//! The voltage consumer also drives the frequency tracker and retunes the
//! sampling timer. The current consumer wakes the cycle aggregator.

use core::convert::Infallible;
use core::fmt;

use log::{debug, info, warn};

use crate::acquisition::{SamplePair, WakeQueue, WakeReceiver, WakeSender};
use crate::config::MeterConfig;
use crate::consts::{SAMPLES_PER_CYCLE, SAMPLES_PER_CYCLE_U8, WORKING_SCALE};
use crate::error::Result;
use crate::frequency::FrequencyTracker;
use crate::math::{abs16, isqrt};
use crate::readings::Readings;
use crate::timer::{SampleTimer, TimerConfig, reprogram};
use crate::window::{SampleWindow, WindowState};

/// Squares a raw sample in the Q16 working format, rescaled back to Q16.
///
/// Full scale (`i16::MIN`) gives 6 553 600, comfortably inside `u32`.
pub fn working_square(raw: i16) -> u32 {
    let working = u64::from(abs16(raw)) * WORKING_SCALE;
    ((working * working) >> 16) as u32
}

/// Running RMS over the last `N` samples of one channel.
#[derive(Debug)]
pub struct RmsEstimator<const N: usize> {
    /// Squared working samples of the last cycle.
    window: SampleWindow<N>,

    /// Root of the window mean, before the channel ratio is applied.
    ///
    /// Seeds the next warm refinement. Zero until the window first fills.
    estimate: u16,

    /// Line quantity per unit at the ADC pin.
    ratio: u32,
}

impl<const N: usize> RmsEstimator<N> {
    /// Creates an estimator publishing `estimate × ratio`.
    pub const fn new(ratio: u32) -> Self {
        Self {
            window: SampleWindow::new(),
            estimate: 0,
            ratio,
        }
    }

    /// Adds one raw sample and returns the refreshed RMS.
    pub fn push(&mut self, raw: i16) -> u16 {
        let before = self.window.state();
        let after = self.window.push(working_square(raw));
        let mean = self.window.mean().unwrap_or(0);

        let root = match (before, after) {
            (WindowState::Filling, WindowState::Filling) => return self.rms(),
            (WindowState::Filling, WindowState::SteadyState) => {
                let root = isqrt(0, mean, 0);
                debug!("window full, cold RMS estimate {}", root);
                root
            }
            (WindowState::SteadyState, _) => isqrt(self.estimate, mean, 1),
        };
        self.estimate = u16::try_from(root).unwrap_or(u16::MAX);
        self.rms()
    }

    /// Published RMS: the estimate times the ratio, saturated to `u16`.
    pub fn rms(&self) -> u16 {
        let scaled = u32::from(self.estimate).saturating_mul(self.ratio);
        u16::try_from(scaled).unwrap_or(u16::MAX)
    }

    /// Root of the window mean before the ratio is applied.
    pub fn estimate(&self) -> u16 {
        self.estimate
    }

    /// The underlying window.
    pub fn window(&self) -> &SampleWindow<N> {
        &self.window
    }
}

/// Consumer for the voltage channel.
pub struct VoltageChannel<'a, T: SampleTimer> {
    rms: RmsEstimator<SAMPLES_PER_CYCLE>,
    tracker: FrequencyTracker,
    timer: T,
    timer_config: TimerConfig,
    wake: WakeReceiver<'a>,
    readings: &'a Readings,
}

impl<'a, T: SampleTimer> VoltageChannel<'a, T> {
    /// Creates the voltage consumer and starts the sampling timer at the
    /// configured initial offset.
    ///
    /// # Arguments
    /// - `config`: validated here; errors are returned before the timer is touched
    /// - `wake`: queue fed by [`Acquisition`](crate::acquisition::Acquisition)
    /// - `timer`: the sampling timer, reprogrammed on every frequency correction
    /// - `readings`: where the voltage values and frequency offset are published
    pub fn new(
        config: &MeterConfig,
        wake: &'a WakeQueue,
        mut timer: T,
        readings: &'a Readings,
    ) -> Result<Self> {
        config.validate()?;
        let timer_config = TimerConfig::new(config.module_clock_hz)?;
        let tracker = FrequencyTracker::new(SAMPLES_PER_CYCLE_U8, config.initial_frequency_offset);

        let period = tracker.sample_period_ns();
        reprogram(&mut timer, &timer_config, period);
        info!(
            "sampling timer started at {} ns (offset {})",
            period,
            tracker.offset()
        );

        let offset = tracker.offset();
        readings.update(|s| s.frequency_offset = offset);

        Ok(Self {
            rms: RmsEstimator::new(config.voltage_ratio),
            tracker,
            timer,
            timer_config,
            wake: wake.receiver(),
            readings,
        })
    }

    /// Handles one voltage sample.
    ///
    /// The frequency tracker sees the sample first; a correction retunes the
    /// timer before the RMS is refreshed.
    pub fn process(&mut self, sample: i16) {
        if self.tracker.update(sample).is_some() {
            reprogram(
                &mut self.timer,
                &self.timer_config,
                self.tracker.sample_period_ns(),
            );
        }

        let rms = self.rms.push(sample);
        let offset = self.tracker.offset();
        self.readings.update(|s| {
            s.voltage = sample;
            s.voltage_rms = rms;
            s.frequency_offset = offset;
        });
    }

    /// Handles one pending wake, if any.
    pub fn poll(&mut self) -> nb::Result<(), Infallible> {
        match self.wake.try_receive() {
            Ok(pair) => {
                self.process(pair.voltage);
                Ok(())
            }
            Err(_) => Err(nb::Error::WouldBlock),
        }
    }

    /// Waits for wakes forever.
    pub async fn run(&mut self) {
        loop {
            let pair = self.wake.receive().await;
            self.process(pair.voltage);
        }
    }

    /// The frequency tracker.
    pub fn tracker(&self) -> &FrequencyTracker {
        &self.tracker
    }

    /// The RMS estimator.
    pub fn rms(&self) -> &RmsEstimator<SAMPLES_PER_CYCLE> {
        &self.rms
    }

    /// The sampling timer.
    pub fn timer(&self) -> &T {
        &self.timer
    }
}

impl<T: SampleTimer + fmt::Debug> fmt::Debug for VoltageChannel<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VoltageChannel")
            .field("rms", &self.rms)
            .field("tracker", &self.tracker)
            .field("timer", &self.timer)
            .field("timer_config", &self.timer_config)
            .finish_non_exhaustive()
    }
}

/// Consumer for the current channel.
///
/// Forwards exactly one wake to the cycle aggregator per sample, after its
/// own RMS update.
pub struct CurrentChannel<'a> {
    rms: RmsEstimator<SAMPLES_PER_CYCLE>,
    wake: WakeReceiver<'a>,
    aggregator: WakeSender<'a>,
    readings: &'a Readings,
    overruns: u32,
}

impl<'a> CurrentChannel<'a> {
    /// Creates the current consumer.
    pub fn new(
        config: &MeterConfig,
        wake: &'a WakeQueue,
        aggregator: &'a WakeQueue,
        readings: &'a Readings,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            rms: RmsEstimator::new(config.current_ratio),
            wake: wake.receiver(),
            aggregator: aggregator.sender(),
            readings,
            overruns: 0,
        })
    }

    /// Handles one sample pair and wakes the aggregator with it.
    pub fn process(&mut self, pair: SamplePair) {
        let rms = self.rms.push(pair.current);
        self.readings.update(|s| {
            s.current = pair.current;
            s.current_rms = rms;
        });

        if self.aggregator.try_send(pair).is_err() {
            self.overruns = self.overruns.saturating_add(1);
            warn!("aggregator queue full, sample dropped");
        }
    }

    /// Handles one pending wake, if any.
    pub fn poll(&mut self) -> nb::Result<(), Infallible> {
        match self.wake.try_receive() {
            Ok(pair) => {
                self.process(pair);
                Ok(())
            }
            Err(_) => Err(nb::Error::WouldBlock),
        }
    }

    /// Waits for wakes forever.
    pub async fn run(&mut self) {
        loop {
            let pair = self.wake.receive().await;
            self.process(pair);
        }
    }

    /// The RMS estimator.
    pub fn rms(&self) -> &RmsEstimator<SAMPLES_PER_CYCLE> {
        &self.rms
    }

    /// Aggregator wakes dropped because its queue was full.
    pub fn overruns(&self) -> u32 {
        self.overruns
    }
}

impl fmt::Debug for CurrentChannel<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CurrentChannel")
            .field("rms", &self.rms)
            .field("overruns", &self.overruns)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::wake_queue;
    use crate::consts::{SAMPLE_PERIOD_NS, SAMPLE_QUEUE_DEPTH};
    use crate::timer::tests::{RecordingTimer, TimerOp};
    use embassy_futures::block_on;
    use embassy_futures::select::{Either, select};

    const VOLTAGE: [i16; 16] = [
        2079, 5921, 8862, 10453, 10453, 8862, 5921, 2079, -2079, -5921, -8862, -10453, -10453,
        -8862, -5921, -2079,
    ];

    #[test]
    fn test_working_square() {
        assert_eq!(working_square(0), 0);
        assert_eq!(working_square(1000), 6103);
        assert_eq!(working_square(-1000), 6103);
        assert_eq!(working_square(i16::MIN), 6_553_600);
    }

    #[test]
    fn test_rms_is_zero_until_window_fills() {
        let mut rms: RmsEstimator<16> = RmsEstimator::new(1);
        for _ in 0..15 {
            assert_eq!(rms.push(1000), 0);
        }
        assert_eq!(rms.push(1000), 78);
        assert_eq!(rms.window().state(), WindowState::SteadyState);
    }

    #[test]
    fn test_rms_warm_path_holds_steady_signal() {
        let mut rms: RmsEstimator<16> = RmsEstimator::new(100);
        for sample in VOLTAGE {
            let _ = rms.push(sample);
        }
        assert_eq!(rms.estimate(), 588);
        assert_eq!(rms.rms(), 58_800);

        for sample in VOLTAGE {
            let _ = rms.push(sample);
            assert_eq!(rms.estimate(), 588);
        }
    }

    #[test]
    fn test_rms_saturates_published_value() {
        let mut rms: RmsEstimator<16> = RmsEstimator::new(100);
        for _ in 0..16 {
            let _ = rms.push(i16::MAX);
        }
        assert_eq!(rms.estimate(), 2559);
        assert_eq!(rms.rms(), u16::MAX);
    }

    #[test]
    fn test_voltage_channel_starts_timer() {
        let readings = Readings::new();
        let queue = wake_queue();
        let channel = VoltageChannel::new(
            &MeterConfig::default(),
            &queue,
            RecordingTimer::default(),
            &readings,
        )
        .unwrap();

        assert_eq!(
            channel.timer().ops.as_slice(),
            &[TimerOp::Disable, TimerOp::Load(62_499), TimerOp::Enable]
        );
        assert_eq!(channel.tracker().sample_period_ns(), SAMPLE_PERIOD_NS);
    }

    #[test]
    fn test_voltage_channel_retunes_timer_on_slow_mains() {
        let readings = Readings::new();
        let queue = wake_queue();
        let mut channel = VoltageChannel::new(
            &MeterConfig::default(),
            &queue,
            RecordingTimer::default(),
            &readings,
        )
        .unwrap();

        // Half-cycles of 9 samples: lock, then one long half-cycle.
        for half in 0..3 {
            let sample = if half % 2 == 0 { -500 } else { 500 };
            for _ in 0..9 {
                channel.process(sample);
            }
        }

        assert_eq!(channel.tracker().offset(), 26);
        assert_eq!(readings.snapshot().frequency_offset, 26);
        assert_eq!(readings.snapshot().frequency_decihertz(), 499);
        assert_eq!(
            &channel.timer().ops.as_slice()[3..],
            &[TimerOp::Disable, TimerOp::Load(62_624), TimerOp::Enable]
        );
    }

    #[test]
    fn test_voltage_channel_poll_would_block_when_idle() {
        let readings = Readings::new();
        let queue = wake_queue();
        let mut channel = VoltageChannel::new(
            &MeterConfig::default(),
            &queue,
            RecordingTimer::default(),
            &readings,
        )
        .unwrap();

        assert_eq!(channel.poll(), Err(nb::Error::WouldBlock));

        queue
            .try_send(SamplePair {
                voltage: 321,
                current: 0,
            })
            .unwrap();
        assert_eq!(channel.poll(), Ok(()));
        assert_eq!(readings.snapshot().voltage, 321);
        assert_eq!(channel.poll(), Err(nb::Error::WouldBlock));
    }

    #[test]
    fn test_current_channel_forwards_one_wake_per_sample() {
        let readings = Readings::new();
        let queue = wake_queue();
        let aggregator = wake_queue();
        let mut channel =
            CurrentChannel::new(&MeterConfig::default(), &queue, &aggregator, &readings).unwrap();

        let pair = SamplePair {
            voltage: 10,
            current: -20,
        };
        channel.process(pair);
        assert_eq!(aggregator.try_receive().ok(), Some(pair));
        assert!(aggregator.try_receive().is_err());
        assert_eq!(readings.snapshot().current, -20);
    }

    #[test]
    fn test_current_channel_counts_aggregator_overruns() {
        let readings = Readings::new();
        let queue = wake_queue();
        let aggregator = wake_queue();
        let mut channel =
            CurrentChannel::new(&MeterConfig::default(), &queue, &aggregator, &readings).unwrap();

        for _ in 0..SAMPLE_QUEUE_DEPTH + 2 {
            channel.process(SamplePair::default());
        }
        assert_eq!(channel.overruns(), 2);
    }

    #[test]
    fn test_voltage_channel_run_drains_queue() {
        let readings = Readings::new();
        let queue = wake_queue();
        let mut channel = VoltageChannel::new(
            &MeterConfig::default(),
            &queue,
            RecordingTimer::default(),
            &readings,
        )
        .unwrap();

        for sample in [100, 200, 300, 400] {
            queue
                .try_send(SamplePair {
                    voltage: sample,
                    current: 0,
                })
                .unwrap();
        }

        let outcome = block_on(select(channel.run(), embassy_futures::yield_now()));
        assert!(matches!(outcome, Either::Second(())));
        assert_eq!(readings.snapshot().voltage, 400);
        assert!(queue.is_empty());
    }
}
