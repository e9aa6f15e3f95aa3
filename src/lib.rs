//! # mainsmeter
//!
//! A portable, no_std Rust metering engine for single-phase mains power meters. It turns a
//! stream of simultaneous voltage and current ADC samples into RMS values, mains frequency,
//! average power, power factor, accumulated energy and accumulated cost.
//!
//! The engine is built from:
//! - a rolling window per channel with an O(1) running sum and a warm-started integer square root
//! - a software frequency-locked loop that retunes the sampling timer to stay at 16 samples per
//!   mains cycle
//! - a per-cycle aggregator billing energy against a time-of-use or flat tariff
//! - bounded `embassy-sync` queues between the sampling interrupt and the consumers
//! - interrupt-safe totals behind `critical-section`
//!
//! ## Crate features
//! | Feature               | Description |
//! |-----------------------|-------------|
//! | `std`                 | Disables `#![no_std]` support and enables the `std` implementations of `critical-section`, `thiserror` and `log` |
//! | `delay-loop`          | Uses `embedded_hal::delay::DelayNs` to pace sampling |
//! | `timer-isr` (default) | Uses `critical_section::with` to sample from a timer interrupt |
//!
//! ## Pipeline
//!
//! ```text
//! timer ISR ──► Acquisition ──┬─► VoltageChannel ──► FrequencyTracker ──► SampleTimer
//!                             │         │
//!                             │         ▼
//!                             └─► CurrentChannel ──► CycleAggregator ──► Readings
//!                                                          ▲
//!                                                 Tariff ──┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use mainsmeter::acquisition::{SamplePair, wake_queue};
//! use mainsmeter::aggregator::CycleAggregator;
//! use mainsmeter::config::TimeBase;
//! use mainsmeter::readings::Readings;
//! use mainsmeter::tariff::{Tariff, TimeOfDay};
//!
//! struct Noon;
//! impl TimeOfDay for Noon {
//!     fn hour(&self) -> u8 {
//!         12
//!     }
//! }
//!
//! static READINGS: Readings = Readings::new();
//! static TARIFF: Tariff = Tariff::new();
//! static TIME_BASE: TimeBase = TimeBase::new();
//!
//! let queue = wake_queue();
//! let mut aggregator = CycleAggregator::new(&queue, &READINGS, &TARIFF, Noon, &TIME_BASE);
//! let pair = SamplePair { voltage: 1000, current: 1000 };
//! for _ in 0..16 {
//!     let _ = aggregator.accumulate(pair);
//! }
//! assert_eq!(READINGS.snapshot().cycles, 1);
//! ```
//!
//! ## Integration Notes
//!
//! - Sampling runs at ~800 Hz (1.25 ms per sample pair) for 50 Hz mains
//! - The sampling timer is retuned in steps of ~0.1 Hz between 47.5 Hz and 52.5 Hz
//! - Only one acquisition stage should be active at a time in interrupt-driven mode
//!
//! --
//! Designed for `#![no_std]` use in resource-constrained embedded environments.

#![deny(
    bad_style,
    dead_code,
    improper_ctypes,
    non_shorthand_field_patterns,
    no_mangle_generic_items,
    overflowing_literals,
    path_statements,
    patterns_in_fns_without_body,
    unconditional_recursion,
    unused,
    while_true,
    missing_debug_implementations,
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    unused_qualifications,
    unused_results
)]
#![cfg_attr(not(feature = "std"), no_std)]

pub use critical_section;

pub mod acquisition;
pub mod aggregator;
pub mod channel;
pub mod config;
pub mod consts;
pub mod error;
pub mod frequency;
pub mod math;
pub mod readings;
pub mod tariff;
pub mod timer;
pub mod window;
