//! In-memory bar table.
//!
//! Rows are keyed by timestamp; columns are named `f64` series of equal
//! length. `NaN` marks a missing value, matching the indicator convention.

use super::timeframe::Timeframe;
use crate::error::PipelineError;
use chrono::NaiveDateTime;

pub const TIMESTAMP: &str = "timestamp";
pub const OPEN: &str = "open";
pub const HIGH: &str = "high";
pub const LOW: &str = "low";
pub const CLOSE: &str = "close";
pub const VOLUME: &str = "volume";

/// One named numeric column.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameColumn {
    pub name: String,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BarFrame {
    timeframe: Timeframe,
    timestamps: Vec<NaiveDateTime>,
    columns: Vec<FrameColumn>,
}

impl BarFrame {
    pub fn new(timeframe: Timeframe, timestamps: Vec<NaiveDateTime>) -> Self {
        Self {
            timeframe,
            timestamps,
            columns: Vec::new(),
        }
    }

    pub fn timeframe(&self) -> &Timeframe {
        &self.timeframe
    }

    pub fn timestamps(&self) -> &[NaiveDateTime] {
        &self.timestamps
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn columns(&self) -> &[FrameColumn] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.values.as_slice())
    }

    /// Like [`column`](Self::column) but a missing column is a validation error.
    pub fn require(&self, name: &str) -> Result<&[f64], PipelineError> {
        self.column(name)
            .ok_or_else(|| PipelineError::validation(format!("missing column '{name}'")))
    }

    /// Insert a column, replacing any existing column of the same name in place.
    pub fn set_column(
        &mut self,
        name: impl Into<String>,
        values: Vec<f64>,
    ) -> Result<(), PipelineError> {
        let name = name.into();
        if values.len() != self.len() {
            return Err(PipelineError::validation(format!(
                "column '{name}' has {} values, frame has {} rows",
                values.len(),
                self.len()
            )));
        }
        match self.columns.iter_mut().find(|c| c.name == name) {
            Some(existing) => existing.values = values,
            None => self.columns.push(FrameColumn { name, values }),
        }
        Ok(())
    }

    pub fn remove_column(&mut self, name: &str) -> Option<Vec<f64>> {
        let idx = self.columns.iter().position(|c| c.name == name)?;
        Some(self.columns.remove(idx).values)
    }

    /// Keep only rows where `keep[i]` is true.
    pub fn retain_rows(&mut self, keep: &[bool]) {
        debug_assert_eq!(keep.len(), self.len());
        self.timestamps = filter_by(&self.timestamps, keep);
        for col in &mut self.columns {
            col.values = filter_by(&col.values, keep);
        }
    }

    /// The last `n` rows (all rows if `n >= len`).
    pub fn tail(&self, n: usize) -> BarFrame {
        let start = self.len().saturating_sub(n);
        BarFrame {
            timeframe: self.timeframe.clone(),
            timestamps: self.timestamps[start..].to_vec(),
            columns: self
                .columns
                .iter()
                .map(|c| FrameColumn {
                    name: c.name.clone(),
                    values: c.values[start..].to_vec(),
                })
                .collect(),
        }
    }

    /// Value at (row, column), `None` when the column does not exist.
    pub fn value(&self, row: usize, name: &str) -> Option<f64> {
        self.column(name).and_then(|c| c.get(row).copied())
    }

    /// True when any column holds `NaN` at `row`.
    pub fn row_has_nan(&self, row: usize) -> bool {
        self.columns.iter().any(|c| c.values[row].is_nan())
    }
}

fn filter_by<T: Copy>(values: &[T], keep: &[bool]) -> Vec<T> {
    values
        .iter()
        .zip(keep)
        .filter_map(|(v, &k)| k.then_some(*v))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn sample() -> BarFrame {
        let mut f = BarFrame::new("1h".parse().unwrap(), vec![ts(0), ts(1), ts(2)]);
        f.set_column(CLOSE, vec![1.0, 2.0, 3.0]).unwrap();
        f.set_column(OPEN, vec![0.5, f64::NAN, 2.5]).unwrap();
        f
    }

    #[test]
    fn set_column_rejects_length_mismatch() {
        let mut f = sample();
        assert!(f.set_column("x", vec![1.0]).is_err());
    }

    #[test]
    fn set_column_replaces_in_place() {
        let mut f = sample();
        f.set_column(CLOSE, vec![9.0, 9.0, 9.0]).unwrap();
        assert_eq!(f.column_names(), vec![CLOSE, OPEN]);
        assert_eq!(f.column(CLOSE).unwrap(), &[9.0, 9.0, 9.0]);
    }

    #[test]
    fn retain_and_tail() {
        let mut f = sample();
        assert!(f.row_has_nan(1));
        let keep: Vec<bool> = (0..f.len()).map(|i| !f.row_has_nan(i)).collect();
        f.retain_rows(&keep);
        assert_eq!(f.len(), 2);
        assert_eq!(f.timestamps(), &[ts(0), ts(2)]);
        let t = f.tail(1);
        assert_eq!(t.timestamps(), &[ts(2)]);
        assert_eq!(t.column(CLOSE).unwrap(), &[3.0]);
        assert_eq!(f.tail(10).len(), 2);
    }
}
