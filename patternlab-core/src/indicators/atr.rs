//! Average True Range (simple rolling mean of true range).
//!
//! TR[0] = high[0] - low[0] (no previous close)
//! TR[t] = max(high-low, |high-prev_close|, |low-prev_close|)
//! ATR = rolling_mean(TR, period). Lookback: period - 1.

use super::rolling::rolling_mean;

pub fn true_range(high: &[f64], low: &[f64], close: &[f64]) -> Vec<f64> {
    let n = high.len().min(low.len()).min(close.len());
    let mut tr = vec![f64::NAN; n];
    if n == 0 {
        return tr;
    }

    tr[0] = high[0] - low[0];
    for i in 1..n {
        let (h, l, pc) = (high[i], low[i], close[i - 1]);
        tr[i] = if h.is_nan() || l.is_nan() || pc.is_nan() {
            f64::NAN
        } else {
            (h - l).max((h - pc).abs()).max((l - pc).abs())
        };
    }
    tr
}

pub fn atr(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<f64> {
    rolling_mean(&true_range(high, low, close), period)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, DEFAULT_EPSILON};

    #[test]
    fn true_range_cases() {
        let high = [105.0, 108.0, 107.0, 115.0];
        let low = [95.0, 100.0, 98.0, 108.0];
        let close = [102.0, 106.0, 99.0, 112.0];
        let tr = true_range(&high, &low, &close);
        assert_approx(tr[0], 10.0, DEFAULT_EPSILON);
        assert_approx(tr[1], 8.0, DEFAULT_EPSILON);
        assert_approx(tr[2], 9.0, DEFAULT_EPSILON);
        // gap up: max(7, |115-99|, |108-99|) = 16
        assert_approx(tr[3], 16.0, DEFAULT_EPSILON);
    }

    #[test]
    fn atr_period_3() {
        let high = [105.0, 108.0, 107.0, 103.0];
        let low = [95.0, 100.0, 98.0, 97.0];
        let close = [102.0, 106.0, 99.0, 101.0];
        // TR = 10, 8, 9, 6
        let a = atr(&high, &low, &close, 3);
        assert!(a[1].is_nan());
        assert_approx(a[2], 9.0, DEFAULT_EPSILON);
        assert_approx(a[3], 23.0 / 3.0, DEFAULT_EPSILON);
    }
}
