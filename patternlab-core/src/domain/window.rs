use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A fixed-length slice of consecutive feature rows.
///
/// `end_timestamp` is the timestamp of the last row in the window.
/// `rows[i][j]` is feature `columns[j]` at offset `i`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternWindow {
    pub end_timestamp: NaiveDateTime,
    pub start_index: usize,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

impl PatternWindow {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row-major flattening, as stored in pattern blobs.
    pub fn flatten(&self) -> Vec<f64> {
        self.rows.iter().flatten().copied().collect()
    }
}
