//! Fixed-window rolling statistics and first differences.
//!
//! Output `[i]` covers inputs `[i+1-window, i]`; the first `window-1`
//! positions are `NaN`.

fn rolling_apply(values: &[f64], window: usize, f: impl Fn(&[f64]) -> f64) -> Vec<f64> {
    let n = values.len();
    let mut out = vec![f64::NAN; n];
    if window == 0 || n < window {
        return out;
    }
    for i in (window - 1)..n {
        let slice = &values[i + 1 - window..=i];
        if slice.iter().any(|v| v.is_nan()) {
            continue;
        }
        out[i] = f(slice);
    }
    out
}

pub fn rolling_mean(values: &[f64], window: usize) -> Vec<f64> {
    rolling_apply(values, window, |s| s.iter().sum::<f64>() / s.len() as f64)
}

/// Sample standard deviation (ddof = 1). A window of 1 is undefined.
pub fn rolling_std(values: &[f64], window: usize) -> Vec<f64> {
    if window < 2 {
        return vec![f64::NAN; values.len()];
    }
    rolling_apply(values, window, |s| {
        let mean = s.iter().sum::<f64>() / s.len() as f64;
        let ss: f64 = s.iter().map(|v| (v - mean).powi(2)).sum();
        (ss / (s.len() - 1) as f64).sqrt()
    })
}

pub fn rolling_max(values: &[f64], window: usize) -> Vec<f64> {
    rolling_apply(values, window, |s| {
        s.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    })
}

pub fn rolling_min(values: &[f64], window: usize) -> Vec<f64> {
    rolling_apply(values, window, |s| s.iter().copied().fold(f64::INFINITY, f64::min))
}

/// `out[i] = values[i] - values[i-1]`; `out[0]` is `NaN`.
pub fn diff(values: &[f64]) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    for i in 1..values.len() {
        out[i] = values[i] - values[i - 1];
    }
    out
}

/// Fractional change from the previous value (not scaled to percent).
/// A zero previous value yields 0 instead of infinity.
pub fn pct_change(values: &[f64]) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    for i in 1..values.len() {
        let prev = values[i - 1];
        out[i] = if prev == 0.0 {
            0.0
        } else {
            (values[i] - prev) / prev
        };
    }
    out
}
