//! Sliding, end-aligned pattern windows.

use crate::domain::{BarFrame, PatternWindow};
use crate::error::PipelineError;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct WindowExtractor {
    window_size: usize,
}

impl WindowExtractor {
    pub fn new(window_size: usize) -> Result<Self, PipelineError> {
        if window_size == 0 {
            return Err(PipelineError::validation("window size must be at least 1"));
        }
        Ok(Self { window_size })
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// One window per start index in `[0, n - window_size]`, labelled with
    /// the timestamp of its last row. Selected columns missing from the frame
    /// are skipped with a warning.
    pub fn extract(&self, frame: &BarFrame, selected: &[String]) -> Vec<PatternWindow> {
        let (names, series): (Vec<String>, Vec<&[f64]>) = selected
            .iter()
            .filter_map(|name| match frame.column(name) {
                Some(values) => Some((name.clone(), values)),
                None => {
                    warn!(column = %name, "pattern column not in frame, skipping");
                    None
                }
            })
            .unzip();

        let n = frame.len();
        let w = self.window_size;
        if n < w {
            return Vec::new();
        }

        (0..=n - w)
            .map(|start| PatternWindow {
                end_timestamp: frame.timestamps()[start + w - 1],
                start_index: start,
                columns: names.clone(),
                rows: (start..start + w)
                    .map(|row| series.iter().map(|s| s[row]).collect())
                    .collect(),
            })
            .collect()
    }
}

/// Free-function form of [`WindowExtractor::extract`].
pub fn extract_windows(
    frame: &BarFrame,
    selected: &[String],
    window_size: usize,
) -> Result<Vec<PatternWindow>, PipelineError> {
    Ok(WindowExtractor::new(window_size)?.extract(frame, selected))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn frame(n: usize) -> BarFrame {
        let base = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let ts = (0..n).map(|i| base + Duration::hours(i as i64)).collect();
        let mut f = BarFrame::new("1h".parse().unwrap(), ts);
        f.set_column("open", (0..n).map(|i| i as f64).collect()).unwrap();
        f.set_column("close", (0..n).map(|i| 10.0 * i as f64).collect())
            .unwrap();
        f
    }

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn count_and_alignment() {
        let f = frame(10);
        let windows = extract_windows(&f, &cols(&["open", "close"]), 3).unwrap();
        assert_eq!(windows.len(), 8);
        let first = &windows[0];
        assert_eq!(first.len(), 3);
        assert_eq!(first.end_timestamp, f.timestamps()[2]);
        assert_eq!(first.rows[2], vec![2.0, 20.0]);
        let last = windows.last().unwrap();
        assert_eq!(last.start_index, 7);
        assert_eq!(last.end_timestamp, f.timestamps()[9]);
        assert_eq!(last.flatten(), vec![7.0, 70.0, 8.0, 80.0, 9.0, 90.0]);
    }

    #[test]
    fn too_short_gives_none() {
        assert!(extract_windows(&frame(2), &cols(&["open"]), 3).unwrap().is_empty());
        assert_eq!(extract_windows(&frame(3), &cols(&["open"]), 3).unwrap().len(), 1);
    }

    #[test]
    fn zero_size_rejected() {
        assert!(matches!(
            extract_windows(&frame(5), &cols(&["open"]), 0),
            Err(PipelineError::Validation(_))
        ));
    }

    #[test]
    fn missing_columns_skipped() {
        let windows = extract_windows(&frame(5), &cols(&["open", "body_ratio"]), 2).unwrap();
        assert_eq!(windows[0].columns, vec!["open".to_string()]);
        assert_eq!(windows[0].rows[0].len(), 1);
    }
}
