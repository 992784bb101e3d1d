//! Relative Strength Index over simple rolling means.
//!
//! gain[t] = max(close[t] - close[t-1], 0), loss[t] = max(close[t-1] - close[t], 0)
//! The first bar has no previous close and counts as a zero change.
//! RSI = 100 - 100 / (1 + mean(gain) / mean(loss)) over `period` bars.
//! Lookback: period - 1.
//! Edge cases: mean(loss) == 0 → 100, or 50 when mean(gain) is also 0.

use super::rolling::rolling_mean;

pub fn rsi(closes: &[f64], period: usize) -> Vec<f64> {
    let n = closes.len();
    let mut gains = vec![0.0; n];
    let mut losses = vec![0.0; n];
    for i in 1..n {
        let ch = closes[i] - closes[i - 1];
        if ch.is_nan() {
            gains[i] = f64::NAN;
            losses[i] = f64::NAN;
        } else if ch > 0.0 {
            gains[i] = ch;
        } else {
            losses[i] = -ch;
        }
    }

    let avg_gain = rolling_mean(&gains, period);
    let avg_loss = rolling_mean(&losses, period);

    avg_gain
        .iter()
        .zip(&avg_loss)
        .map(|(&g, &l)| {
            if g.is_nan() || l.is_nan() {
                f64::NAN
            } else {
                compute_rsi(g, l)
            }
        })
        .collect()
}

fn compute_rsi(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        if avg_gain == 0.0 {
            50.0
        } else {
            100.0
        }
    } else {
        let rs = avg_gain / avg_loss;
        100.0 - 100.0 / (1.0 + rs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, DEFAULT_EPSILON};

    #[test]
    fn rising_series_is_100() {
        let closes: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        let r = rsi(&closes, 14);
        assert!(r[12].is_nan());
        assert_approx(r[13], 100.0, DEFAULT_EPSILON);
        assert_approx(r[19], 100.0, DEFAULT_EPSILON);
    }

    #[test]
    fn falling_series_is_0() {
        let closes: Vec<f64> = (0..20).map(|i| 100.0 - i as f64).collect();
        let r = rsi(&closes, 14);
        assert_approx(r[19], 0.0, DEFAULT_EPSILON);
    }

    #[test]
    fn flat_series_is_50() {
        let r = rsi(&[5.0; 10], 3);
        assert_approx(r[9], 50.0, DEFAULT_EPSILON);
    }

    #[test]
    fn known_value() {
        // changes over window: +2, -1, +1 → gain 3/3, loss 1/3 → rs 3 → 75
        let r = rsi(&[10.0, 12.0, 11.0, 12.0], 3);
        assert_approx(r[3], 75.0, DEFAULT_EPSILON);
    }

    #[test]
    fn first_change_counts_as_zero() {
        // window ending at 2 includes the implicit zero change at index 0
        let r = rsi(&[10.0, 11.0, 10.0], 3);
        assert_approx(r[2], 50.0, DEFAULT_EPSILON);
    }
}
