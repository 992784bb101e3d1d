//! Exponential Moving Average, recursive form without bias adjustment.
//!
//! alpha = 2 / (span + 1)
//! EMA[s] = x[s] where s is the first non-NaN input
//! EMA[t] = alpha * x[t] + (1 - alpha) * EMA[t-1]
//! Values are hidden (NaN) until `min_periods` observations have been seen.

pub fn ema(values: &[f64], span: usize, min_periods: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    if span == 0 {
        return result;
    }

    let Some(start) = values.iter().position(|v| !v.is_nan()) else {
        return result;
    };

    let alpha = 2.0 / (span as f64 + 1.0);
    let mut prev = values[start];
    let min_periods = min_periods.max(1);

    for i in start..n {
        let x = values[i];
        if x.is_nan() {
            // A gap after the seed taints everything downstream.
            return result;
        }
        if i > start {
            prev = alpha * x + (1.0 - alpha) * prev;
        }
        if i + 1 - start >= min_periods {
            result[i] = prev;
        }
    }

    result
}
