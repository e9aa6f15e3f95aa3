//! Interrupt side of the sampling pipeline.
//!
//! On every sampling timer interrupt one voltage and one current sample are
//! read and handed to the two channel consumers through bounded wake queues.
//! The interrupt never blocks on a consumer: if a queue is full the wake is
//! dropped and counted as an overrun.

use core::fmt;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, Receiver, Sender};
use log::warn;

use crate::consts::SAMPLE_QUEUE_DEPTH;
use crate::error::{Error, Result};

/// The two analog inputs of the meter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalogChannel {
    /// Line voltage, through the voltage divider.
    Voltage,
    /// Line current, through the current transformer.
    Current,
}

/// One simultaneous pair of raw ADC samples.
///
/// Samples are signed 16-bit with a base of `10 / 32768` volts at the ADC pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SamplePair {
    /// Raw voltage sample.
    pub voltage: i16,
    /// Raw current sample.
    pub current: i16,
}

/// An analog-to-digital converter with one input per [`AnalogChannel`].
pub trait SampleSource {
    /// Error reported by the converter.
    type Error: fmt::Debug;

    /// Starts or polls a conversion on `channel`.
    ///
    /// Returns `nb::Error::WouldBlock` until the result is ready.
    fn read(&mut self, channel: AnalogChannel) -> nb::Result<i16, Self::Error>;
}

/// Bounded queue carrying one wake per sampling interrupt to a consumer.
pub type WakeQueue = Channel<CriticalSectionRawMutex, SamplePair, SAMPLE_QUEUE_DEPTH>;

/// Producer end of a [`WakeQueue`].
pub type WakeSender<'a> = Sender<'a, CriticalSectionRawMutex, SamplePair, SAMPLE_QUEUE_DEPTH>;

/// Consumer end of a [`WakeQueue`].
pub type WakeReceiver<'a> = Receiver<'a, CriticalSectionRawMutex, SamplePair, SAMPLE_QUEUE_DEPTH>;

/// Creates an empty wake queue, usable in a `static` initializer.
pub const fn wake_queue() -> WakeQueue {
    Channel::new()
}

/// Reads both channels and wakes their consumers.
///
/// Owned by the sampling timer interrupt, either directly or through the
/// `timer-isr` global helpers.
pub struct Acquisition<'a, A: SampleSource> {
    /// The converter both samples are read from.
    adc: A,

    /// Wakes the voltage channel consumer.
    voltage: WakeSender<'a>,

    /// Wakes the current channel consumer.
    current: WakeSender<'a>,

    /// Wakes dropped because a consumer queue was full.
    overruns: u32,
}

impl<'a, A: SampleSource> Acquisition<'a, A> {
    /// Creates an acquisition stage posting to the given queues.
    pub fn new(adc: A, voltage: &'a WakeQueue, current: &'a WakeQueue) -> Self {
        Self {
            adc,
            voltage: voltage.sender(),
            current: current.sender(),
            overruns: 0,
        }
    }

    /// Handles one sampling interrupt.
    ///
    /// Reads the voltage then the current sample, blocking on each
    /// conversion, and posts the pair to both consumers.
    ///
    /// # Returns
    /// - The pair that was read, even if a consumer queue was full
    /// - [`Error::Adc`] if either conversion failed; nothing is posted then
    pub fn on_interrupt(&mut self) -> Result<SamplePair> {
        let voltage = self.read(AnalogChannel::Voltage)?;
        let current = self.read(AnalogChannel::Current)?;
        let pair = SamplePair { voltage, current };

        if self.voltage.try_send(pair).is_err() {
            self.overrun(AnalogChannel::Voltage);
        }
        if self.current.try_send(pair).is_err() {
            self.overrun(AnalogChannel::Current);
        }
        Ok(pair)
    }

    /// Number of wakes dropped so far.
    pub fn overruns(&self) -> u32 {
        self.overruns
    }

    /// Gives the converter back.
    pub fn release(self) -> A {
        self.adc
    }

    fn read(&mut self, channel: AnalogChannel) -> Result<i16> {
        nb::block!(self.adc.read(channel)).map_err(|e| {
            warn!("ADC read on {:?} failed: {:?}", channel, e);
            Error::Adc(channel)
        })
    }

    fn overrun(&mut self, channel: AnalogChannel) {
        self.overruns = self.overruns.saturating_add(1);
        warn!("{:?} consumer queue full, wake dropped", channel);
    }
}

impl<A: SampleSource + fmt::Debug> fmt::Debug for Acquisition<'_, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Acquisition")
            .field("adc", &self.adc)
            .field("overruns", &self.overruns)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use heapless::Deque;

    /// Replays a fixed list of sample pairs, one pair per interrupt.
    #[derive(Debug, Default)]
    pub(crate) struct ScriptedAdc {
        pub(crate) pairs: Deque<SamplePair, 64>,
        pub(crate) pending: Option<i16>,
        pub(crate) busy_polls: u8,
        pub(crate) fail: bool,
    }

    impl ScriptedAdc {
        pub(crate) fn new(pairs: &[SamplePair]) -> Self {
            let mut adc = Self::default();
            for pair in pairs {
                adc.pairs.push_back(*pair).unwrap();
            }
            adc
        }
    }

    impl SampleSource for ScriptedAdc {
        type Error = ();

        fn read(&mut self, channel: AnalogChannel) -> nb::Result<i16, ()> {
            if self.fail {
                return Err(nb::Error::Other(()));
            }
            if self.busy_polls > 0 {
                self.busy_polls -= 1;
                return Err(nb::Error::WouldBlock);
            }
            match channel {
                AnalogChannel::Voltage => {
                    let pair = self.pairs.pop_front().unwrap_or_default();
                    self.pending = Some(pair.current);
                    Ok(pair.voltage)
                }
                AnalogChannel::Current => Ok(self.pending.take().unwrap_or_default()),
            }
        }
    }

    #[test]
    fn test_interrupt_posts_pair_to_both_queues() {
        let voltage_q = wake_queue();
        let current_q = wake_queue();
        let pair = SamplePair {
            voltage: 1200,
            current: -300,
        };
        let mut acquisition = Acquisition::new(ScriptedAdc::new(&[pair]), &voltage_q, &current_q);

        assert_eq!(acquisition.on_interrupt(), Ok(pair));
        assert_eq!(voltage_q.try_receive().ok(), Some(pair));
        assert_eq!(current_q.try_receive().ok(), Some(pair));
        assert_eq!(acquisition.overruns(), 0);
    }

    #[test]
    fn test_interrupt_waits_for_conversion() {
        let voltage_q = wake_queue();
        let current_q = wake_queue();
        let pair = SamplePair {
            voltage: 7,
            current: 9,
        };
        let mut adc = ScriptedAdc::new(&[pair]);
        adc.busy_polls = 3;
        let mut acquisition = Acquisition::new(adc, &voltage_q, &current_q);

        assert_eq!(acquisition.on_interrupt(), Ok(pair));
        assert_eq!(acquisition.release().busy_polls, 0);
    }

    #[test]
    fn test_full_queue_counts_overrun() {
        let voltage_q = wake_queue();
        let current_q = wake_queue();
        let mut acquisition = Acquisition::new(ScriptedAdc::default(), &voltage_q, &current_q);

        for _ in 0..SAMPLE_QUEUE_DEPTH {
            let _ = acquisition.on_interrupt().unwrap();
        }
        assert_eq!(acquisition.overruns(), 0);

        let _ = acquisition.on_interrupt().unwrap();
        assert_eq!(acquisition.overruns(), 2);
        assert_eq!(voltage_q.len(), SAMPLE_QUEUE_DEPTH);
    }

    #[test]
    fn test_adc_failure_is_reported_and_nothing_posted() {
        let voltage_q = wake_queue();
        let current_q = wake_queue();
        let adc = ScriptedAdc {
            fail: true,
            ..ScriptedAdc::default()
        };
        let mut acquisition = Acquisition::new(adc, &voltage_q, &current_q);

        assert_eq!(
            acquisition.on_interrupt(),
            Err(Error::Adc(AnalogChannel::Voltage))
        );
        assert!(voltage_q.try_receive().is_err());
        assert!(current_q.try_receive().is_err());
    }
}
