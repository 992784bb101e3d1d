//! Indicator math over plain `f64` series.
//!
//! Every function returns a vector the same length as its input with `NaN`
//! in warm-up positions. A `NaN` input poisons every window that covers it.

pub mod atr;
pub mod bollinger;
pub mod ema;
pub mod macd;
pub mod rolling;
pub mod rsi;

pub use atr::{atr, true_range};
pub use bollinger::{bollinger, BollingerBands};
pub use ema::ema;
pub use macd::{macd, Macd};
pub use rolling::{diff, pct_change, rolling_max, rolling_mean, rolling_min, rolling_std};
pub use rsi::rsi;

#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;

#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "expected {expected}, got {actual} (diff {})",
        (actual - expected).abs()
    );
}
