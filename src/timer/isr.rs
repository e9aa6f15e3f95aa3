use crate::acquisition::{Acquisition, SamplePair, SampleSource, WakeQueue};
use crate::error::Result;
use core::cell::RefCell;
use critical_section::Mutex;

/// Global slot holding the [`Acquisition`] stage driven by the sampling
/// interrupt.
pub type GlobalAcquisition<A> = Mutex<RefCell<Option<Acquisition<'static, A>>>>;

/// Used to initialize the global static `Acquisition` for use with
/// `critical_section`.
///
/// # Returns
/// * An empty mutable ref-cell
///
/// # Example
/// ```rust,ignore
/// use mainsmeter::timer::{GlobalAcquisition, global_acquisition_init};
/// use some_hal::Adc;
///
/// static ACQUISITION: GlobalAcquisition<Adc> = global_acquisition_init::<Adc>();
/// ```
pub const fn global_acquisition_init<A: SampleSource>() -> GlobalAcquisition<A> {
    Mutex::new(RefCell::new(None))
}

/// Installs the acquisition stage in the global slot.
///
/// # Arguments
/// * The global static slot
/// * The ADC both channels are read from
/// * The voltage consumer's wake queue
/// * The current consumer's wake queue
///
/// # Example
/// ```rust,ignore
/// static VOLTAGE_WAKE: WakeQueue = wake_queue();
/// static CURRENT_WAKE: WakeQueue = wake_queue();
///
/// fn main() {
///     global_acquisition_setup(&ACQUISITION, adc, &VOLTAGE_WAKE, &CURRENT_WAKE);
/// }
/// ```
pub fn global_acquisition_setup<A: SampleSource>(
    global: &'static GlobalAcquisition<A>,
    adc: A,
    voltage: &'static WakeQueue,
    current: &'static WakeQueue,
) {
    critical_section::with(|cs| {
        let _ = global
            .borrow(cs)
            .replace(Some(Acquisition::new(adc, voltage, current)));
    });
}

/// Takes one sample pair at each interrupt
///
/// # Arguments
/// * The global static slot
///
/// # Returns
/// * `None` if the slot has not been set up yet
/// * The outcome of [`Acquisition::on_interrupt`] otherwise
///
/// # Example
/// ```rust,ignore
/// #[interrupt]
/// fn PIT0() {
///     let _ = global_timer_tick(&ACQUISITION);
/// }
/// ```
pub fn global_timer_tick<A: SampleSource>(
    global: &'static GlobalAcquisition<A>,
) -> Option<Result<SamplePair>> {
    critical_section::with(|cs| {
        global
            .borrow(cs)
            .borrow_mut()
            .as_mut()
            .map(|acquisition| acquisition.on_interrupt())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::tests::ScriptedAdc;
    use crate::acquisition::wake_queue;

    static VOLTAGE_WAKE: WakeQueue = wake_queue();
    static CURRENT_WAKE: WakeQueue = wake_queue();
    static ACQUISITION: GlobalAcquisition<ScriptedAdc> = global_acquisition_init::<ScriptedAdc>();

    #[test]
    fn test_global_tick_before_and_after_setup() {
        assert!(global_timer_tick(&ACQUISITION).is_none());

        let pair = SamplePair {
            voltage: 11,
            current: 22,
        };
        global_acquisition_setup(
            &ACQUISITION,
            ScriptedAdc::new(&[pair]),
            &VOLTAGE_WAKE,
            &CURRENT_WAKE,
        );

        assert_eq!(global_timer_tick(&ACQUISITION), Some(Ok(pair)));
        assert_eq!(VOLTAGE_WAKE.try_receive().ok(), Some(pair));
        assert_eq!(CURRENT_WAKE.try_receive().ok(), Some(pair));
    }
}
