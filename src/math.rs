//! Integer helpers for the fixed-point sampling path.

use crate::consts::ISQRT_DEFAULT_ITERATIONS;

/// Absolute value of a 16-bit signed sample.
///
/// Negative inputs are negated in two's complement (invert, add one). The
/// most negative value `i16::MIN` wraps to `0x8000`, which is its true
/// magnitude once read as unsigned.
pub const fn abs16(number: i16) -> u16 {
    let bits = number as u16;
    if bits & 0x8000 != 0 {
        (bits ^ 0xffff).wrapping_add(1)
    } else {
        bits
    }
}

/// Integer square root by Newton's method.
///
/// # Arguments
/// - `estimate`: starting guess; `0` derives one by right-shifting `value`
///   until it fits in 16 bits
/// - `value`: the number to take the root of
/// - `iterations`: Newton steps to run; `0` selects
///   [`ISQRT_DEFAULT_ITERATIONS`], enough to converge from a cold start
///
/// # Returns
/// The root, within ±1 of `floor(sqrt(value))` once converged. If the running
/// estimate ever reaches zero the function returns `0` instead of dividing by
/// it.
///
/// Callers refreshing a running RMS pass the previous result with
/// `iterations = 1`: a single step from a close seed is enough when only one
/// sample of the window changed.
pub fn isqrt(estimate: u16, value: u32, iterations: u8) -> u32 {
    let mut estimate = if estimate == 0 {
        let mut guess = value;
        while guess > 0xffff {
            guess >>= 1;
        }
        u64::from(guess)
    } else {
        u64::from(estimate)
    };

    let iterations = if iterations == 0 {
        ISQRT_DEFAULT_ITERATIONS
    } else {
        iterations
    };

    let value = u64::from(value);
    for _ in 0..iterations {
        if estimate == 0 {
            return 0;
        }
        estimate = (value / estimate + estimate) / 2;
    }

    u32::try_from(estimate).unwrap_or(u32::MAX)
}
