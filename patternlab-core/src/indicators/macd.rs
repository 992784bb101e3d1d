//! Moving Average Convergence Divergence.
//!
//! macd   = EMA(fast) - EMA(slow), each EMA hidden until it has `span` bars
//! signal = EMA(signal_span) of macd, seeded at the first defined macd value
//! hist   = macd - signal
//! Lookback: slow - 1.

use super::ema::ema;

#[derive(Debug, Clone, PartialEq)]
pub struct Macd {
    pub line: Vec<f64>,
    pub signal: Vec<f64>,
    pub histogram: Vec<f64>,
}

pub fn macd(closes: &[f64], fast: usize, slow: usize, signal_span: usize) -> Macd {
    let fast_ema = ema(closes, fast, fast);
    let slow_ema = ema(closes, slow, slow);
    let line: Vec<f64> = fast_ema.iter().zip(&slow_ema).map(|(f, s)| f - s).collect();
    let signal = ema(&line, signal_span, 1);
    let histogram = line.iter().zip(&signal).map(|(m, s)| m - s).collect();
    Macd {
        line,
        signal,
        histogram,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, DEFAULT_EPSILON};

    #[test]
    fn warmup_driven_by_slow_span() {
        let closes: Vec<f64> = (0..40).map(|i| 100.0 + i as f64).collect();
        let m = macd(&closes, 12, 26, 9);
        assert!(m.line[24].is_nan());
        assert!(!m.line[25].is_nan());
        assert!(m.signal[24].is_nan());
        assert!(!m.signal[25].is_nan());
        // signal seeded at the first macd value → hist starts at 0
        assert_approx(m.histogram[25], 0.0, DEFAULT_EPSILON);
    }

    #[test]
    fn rising_series_has_positive_macd() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + i as f64).collect();
        let m = macd(&closes, 12, 26, 9);
        assert!(m.line[59] > 0.0);
    }

    #[test]
    fn constant_series_is_zero() {
        let m = macd(&[50.0; 40], 12, 26, 9);
        for i in 25..40 {
            assert_approx(m.line[i], 0.0, DEFAULT_EPSILON);
            assert_approx(m.histogram[i], 0.0, DEFAULT_EPSILON);
        }
    }
}
