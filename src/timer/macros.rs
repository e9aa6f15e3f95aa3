/// Declares the static globals of an interrupt-driven meter.
///
/// This macro creates:
/// - `METER_ACQUISITION`: the acquisition stage, protected by a
///   `critical_section` mutex so the sampling ISR and the main thread can
///   both reach it
/// - `VOLTAGE_WAKE`, `CURRENT_WAKE` and `AGGREGATOR_WAKE`: the three wake
///   queues linking the ISR, the channel consumers and the aggregator
///
/// # Arguments
/// - `$adc`: The concrete ADC type (must implement `SampleSource`)
///
/// # Example
/// ```rust,ignore
/// init_meter_acquisition!(MyAdcType);
/// ```
#[macro_export]
macro_rules! init_meter_acquisition {
    ( $adc:ty ) => {
        pub static METER_ACQUISITION: $crate::critical_section::Mutex<
            core::cell::RefCell<Option<$crate::acquisition::Acquisition<'static, $adc>>>,
        > = $crate::critical_section::Mutex::new(core::cell::RefCell::new(None));
        pub static VOLTAGE_WAKE: $crate::acquisition::WakeQueue =
            $crate::acquisition::wake_queue();
        pub static CURRENT_WAKE: $crate::acquisition::WakeQueue =
            $crate::acquisition::wake_queue();
        pub static AGGREGATOR_WAKE: $crate::acquisition::WakeQueue =
            $crate::acquisition::wake_queue();
    };
}

/// Installs a new acquisition stage in `METER_ACQUISITION`.
///
/// # Arguments
/// - `$adc`: The ADC instance (must implement `SampleSource`)
///
/// # Example
/// ```rust,ignore
/// fn main() {
///     setup_meter_acquisition!(adc);
/// }
/// ```
///
/// # Notes
/// - Requires `init_meter_acquisition!` to have been used earlier.
#[macro_export]
macro_rules! setup_meter_acquisition {
    ( $adc:expr ) => {
        $crate::critical_section::with(|cs| {
            let _ = METER_ACQUISITION.borrow(cs).replace(Some(
                $crate::acquisition::Acquisition::new($adc, &VOLTAGE_WAKE, &CURRENT_WAKE),
            ));
        })
    };
}

/// Takes one sample pair from within the sampling interrupt.
///
/// Evaluates to `Option<mainsmeter::error::Result<SamplePair>>`, `None` until
/// `setup_meter_acquisition!` has run.
///
/// # Example
/// ```rust,ignore
/// #[interrupt]
/// fn PIT0() {
///     let _ = meter_timer_tick!();
/// }
/// ```
#[macro_export]
macro_rules! meter_timer_tick {
    () => {
        $crate::critical_section::with(|cs| {
            METER_ACQUISITION
                .borrow(cs)
                .borrow_mut()
                .as_mut()
                .map(|acquisition| acquisition.on_interrupt())
        })
    };
}

#[cfg(test)]
mod tests {
    use crate::acquisition::SamplePair;
    use crate::acquisition::tests::ScriptedAdc;

    crate::init_meter_acquisition!(ScriptedAdc);

    #[test]
    fn test_meter_macros_drive_acquisition() {
        assert!(crate::meter_timer_tick!().is_none());

        let pair = SamplePair {
            voltage: -5,
            current: 6,
        };
        crate::setup_meter_acquisition!(ScriptedAdc::new(&[pair]));

        assert_eq!(crate::meter_timer_tick!(), Some(Ok(pair)));
        assert_eq!(VOLTAGE_WAKE.try_receive().ok(), Some(pair));
        assert_eq!(CURRENT_WAKE.try_receive().ok(), Some(pair));
        assert!(AGGREGATOR_WAKE.is_empty());
    }
}
