//! Bollinger Bands.
//!
//! middle = SMA(period); upper/lower = middle ± k * sample std(period).
//! Lookback: period - 1.

use super::rolling::{rolling_mean, rolling_std};

#[derive(Debug, Clone, PartialEq)]
pub struct BollingerBands {
    pub upper: Vec<f64>,
    pub middle: Vec<f64>,
    pub lower: Vec<f64>,
}

pub fn bollinger(closes: &[f64], period: usize, k: f64) -> BollingerBands {
    let middle = rolling_mean(closes, period);
    let std = rolling_std(closes, period);
    let upper = middle.iter().zip(&std).map(|(m, s)| m + k * s).collect();
    let lower = middle.iter().zip(&std).map(|(m, s)| m - k * s).collect();
    BollingerBands {
        upper,
        middle,
        lower,
    }
}
