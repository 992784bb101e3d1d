//! Row-level mapping between `BarFrame` and the persisted record layout.
//!
//! Named columns map one-to-one to relational columns; every other frame
//! column travels in the `feature_data` JSON object.

use crate::backend::SeriesKey;
use crate::error::StoreError;
use chrono::NaiveDateTime;
use patternlab_core::pipeline::timestamp::format_timestamp;
use patternlab_core::{BarFrame, Timeframe};
use std::collections::{BTreeMap, BTreeSet};

pub const NAMED_COLUMNS: [&str; 24] = [
    "open",
    "high",
    "low",
    "close",
    "volume",
    "sma_5",
    "sma_10",
    "sma_20",
    "ema_5",
    "ema_10",
    "ema_20",
    "rsi_14",
    "macd",
    "macd_signal",
    "macd_hist",
    "bollinger_upper",
    "bollinger_middle",
    "bollinger_lower",
    "atr_14",
    "norm_open",
    "norm_high",
    "norm_low",
    "norm_close",
    "norm_volume",
];

pub const NAMED_COUNT: usize = NAMED_COLUMNS.len();

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedRecord {
    pub timestamp: NaiveDateTime,
    pub symbol: String,
    pub timeframe: String,
    /// Aligned with [`NAMED_COLUMNS`].
    pub named: [Option<f64>; NAMED_COUNT],
    pub feature_data: BTreeMap<String, Option<f64>>,
}

impl ProcessedRecord {
    pub fn timestamp_text(&self) -> String {
        format_timestamp(&self.timestamp)
    }

    pub fn feature_json(&self) -> Result<String, StoreError> {
        Ok(serde_json::to_string(&self.feature_data)?)
    }
}

fn finite(v: f64) -> Option<f64> {
    v.is_finite().then_some(v)
}

pub fn records_from_frame(key: &SeriesKey, frame: &BarFrame) -> Vec<ProcessedRecord> {
    let timeframe = key.timeframe.to_string();
    let named_idx: Vec<Option<&[f64]>> = NAMED_COLUMNS.iter().map(|n| frame.column(n)).collect();
    let extras: Vec<(&str, &[f64])> = frame
        .columns()
        .iter()
        .filter(|c| !NAMED_COLUMNS.contains(&c.name.as_str()))
        .map(|c| (c.name.as_str(), c.values.as_slice()))
        .collect();

    frame
        .timestamps()
        .iter()
        .enumerate()
        .map(|(row, ts)| {
            let mut named = [None; NAMED_COUNT];
            for (slot, col) in named.iter_mut().zip(&named_idx) {
                *slot = col.and_then(|values| finite(values[row]));
            }
            let feature_data = extras
                .iter()
                .map(|(name, values)| (name.to_string(), finite(values[row])))
                .collect();
            ProcessedRecord {
                timestamp: *ts,
                symbol: key.symbol.clone(),
                timeframe: timeframe.clone(),
                named,
                feature_data,
            }
        })
        .collect()
}

/// Rebuild a frame from records already in ascending timestamp order.
///
/// A named column is included when any record holds a value for it; feature
/// columns follow in name order.
pub fn frame_from_records(
    timeframe: Timeframe,
    records: &[ProcessedRecord],
) -> Result<BarFrame, StoreError> {
    let timestamps = records.iter().map(|r| r.timestamp).collect();
    let mut frame = BarFrame::new(timeframe, timestamps);

    for (i, name) in NAMED_COLUMNS.iter().enumerate() {
        if records.iter().all(|r| r.named[i].is_none()) {
            continue;
        }
        let values = records
            .iter()
            .map(|r| r.named[i].unwrap_or(f64::NAN))
            .collect();
        frame.set_column(*name, values)?;
    }

    let feature_names: BTreeSet<&String> = records
        .iter()
        .flat_map(|r| r.feature_data.keys())
        .collect();
    for name in feature_names {
        let values = records
            .iter()
            .map(|r| r.feature_data.get(name).copied().flatten().unwrap_or(f64::NAN))
            .collect();
        frame.set_column(name.clone(), values)?;
    }

    Ok(frame)
}
