//! CSV file backend.
//!
//! Layout: `{dir}/{SYMBOL}_{timeframe}_processed.csv` plus a
//! `{SYMBOL}_{timeframe}_processed.meta.json` sidecar (row count, date range,
//! content hash). The first CSV column is the timestamp whatever its header.
//! Writes are atomic: write to `.tmp`, then rename.

use super::{BackendKind, BarStore, SeriesKey};
use crate::error::StoreError;
use chrono::NaiveDateTime;
use patternlab_core::pipeline::timestamp::{format_timestamp, parse_any};
use patternlab_core::{BarFrame, Timeframe};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMeta {
    pub symbol: String,
    pub timeframe: String,
    pub rows: usize,
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
    pub data_hash: String,
    pub written_at: NaiveDateTime,
}

pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, key: &SeriesKey) -> PathBuf {
        self.dir
            .join(format!("{}_{}_processed.csv", key.symbol, key.timeframe))
    }

    fn meta_path(&self, key: &SeriesKey) -> PathBuf {
        self.dir
            .join(format!("{}_{}_processed.meta.json", key.symbol, key.timeframe))
    }

    pub fn meta(&self, key: &SeriesKey) -> Option<FileMeta> {
        let text = fs::read_to_string(self.meta_path(key)).ok()?;
        serde_json::from_str(&text).ok()
    }
}

impl BarStore for FileStore {
    fn kind(&self) -> BackendKind {
        BackendKind::File
    }

    fn save(&self, key: &SeriesKey, frame: &BarFrame) -> Result<usize, StoreError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path(key);
        let tmp_path = path.with_extension("csv.tmp");

        write_processed_csv(frame, &tmp_path)?;
        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            StoreError::storage(format!("atomic rename failed: {e}"))
        })?;

        let meta = FileMeta {
            symbol: key.symbol.clone(),
            timeframe: key.timeframe.to_string(),
            rows: frame.len(),
            start: frame.timestamps().first().copied(),
            end: frame.timestamps().last().copied(),
            data_hash: blake3::hash(&fs::read(&path)?).to_hex().to_string(),
            written_at: chrono::Local::now().naive_local(),
        };
        fs::write(self.meta_path(key), serde_json::to_string_pretty(&meta)?)?;

        info!(series = %key, rows = frame.len(), path = %path.display(), "saved processed data to file");
        Ok(frame.len())
    }

    fn get(&self, key: &SeriesKey, limit: usize) -> Result<Option<BarFrame>, StoreError> {
        let path = self.path(key);
        if !path.exists() {
            return Ok(None);
        }
        let frame = read_processed_csv(&path, key.timeframe.clone())?;
        if frame.is_empty() {
            return Ok(None);
        }
        Ok(Some(if limit > 0 { frame.tail(limit) } else { frame }))
    }
}

fn frame_to_dataframe(frame: &BarFrame) -> Result<DataFrame, StoreError> {
    let timestamps: Vec<String> = frame.timestamps().iter().map(format_timestamp).collect();
    let mut columns = vec![Column::new("timestamp".into(), timestamps)];
    for col in frame.columns() {
        let values: Vec<Option<f64>> = col
            .values
            .iter()
            .map(|v| v.is_finite().then_some(*v))
            .collect();
        columns.push(Column::new(col.name.as_str().into(), values));
    }
    Ok(DataFrame::new(columns)?)
}

pub fn write_processed_csv(frame: &BarFrame, path: &Path) -> Result<(), StoreError> {
    let mut df = frame_to_dataframe(frame)?;
    let mut file = fs::File::create(path)?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .finish(&mut df)?;
    Ok(())
}

/// Read a processed CSV. Column names are lower-cased; non-timestamp
/// columns are cast to `f64` with nulls as `NaN`.
pub fn read_processed_csv(path: &Path, timeframe: Timeframe) -> Result<BarFrame, StoreError> {
    let df = LazyCsvReader::new(path)
        .with_has_header(true)
        .finish()?
        .collect()?;

    let columns = df.get_columns();
    let Some((ts_col, value_cols)) = columns.split_first() else {
        return Err(StoreError::storage(format!(
            "{} has no columns",
            path.display()
        )));
    };

    let ts_text = ts_col.cast(&DataType::String)?;
    let mut timestamps = Vec::with_capacity(df.height());
    for (row, value) in ts_text.str()?.into_iter().enumerate() {
        let text = value.unwrap_or("");
        let ts = parse_any(text).ok_or_else(|| {
            StoreError::storage(format!(
                "{}: unparseable timestamp '{text}' at row {row}",
                path.display()
            ))
        })?;
        timestamps.push(ts);
    }

    let mut frame = BarFrame::new(timeframe, timestamps);
    for col in value_cols {
        let cast = col.cast(&DataType::Float64)?;
        let values = cast
            .f64()?
            .into_iter()
            .map(|v| v.unwrap_or(f64::NAN))
            .collect();
        frame.set_column(col.name().to_lowercase(), values)?;
    }
    Ok(frame)
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
        f.set_column("close", (0..n).map(|i| i as f64 + 0.5).collect())
            .unwrap();
        f.set_column("direction", vec![1.0; n]).unwrap();
        f
    }

    #[test]
    fn save_get_with_limit() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        let key = SeriesKey::new("XAU", "1h".parse().unwrap());
        assert_eq!(store.save(&key, &frame(20)).unwrap(), 20);
        assert!(store.path(&key).ends_with("XAU_1h_processed.csv"));

        let all = store.get(&key, 0).unwrap().unwrap();
        assert_eq!(all.len(), 20);
        assert_eq!(all.column_names(), vec!["close", "direction"]);
        assert_eq!(all.column("direction").unwrap()[0], 1.0);

        let last = store.get(&key, 2).unwrap().unwrap();
        assert_eq!(last.column("close").unwrap(), &[18.5, 19.5]);
        assert_eq!(last.timestamps(), &all.timestamps()[18..]);
    }

    #[test]
    fn missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        let key = SeriesKey::new("XAU", "4h".parse().unwrap());
        assert!(store.get(&key, 10).unwrap().is_none());
    }

    #[test]
    fn nan_roundtrips_as_empty_cell() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        let key = SeriesKey::new("XAU", "1h".parse().unwrap());
        let mut f = frame(3);
        f.set_column("close", vec![1.0, f64::NAN, 3.0]).unwrap();
        store.save(&key, &f).unwrap();
        let got = store.get(&key, 0).unwrap().unwrap();
        assert!(got.value(1, "close").unwrap().is_nan());
        assert_eq!(got.value(2, "close"), Some(3.0));
    }

    #[test]
    fn meta_sidecar_written() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        let key = SeriesKey::new("XAU", "1h".parse().unwrap());
        let f = frame(4);
        store.save(&key, &f).unwrap();
        let meta = store.meta(&key).unwrap();
        assert_eq!(meta.rows, 4);
        assert_eq!(meta.start, f.timestamps().first().copied());
        assert_eq!(meta.data_hash.len(), 64);
        assert!(!store.path(&key).with_extension("csv.tmp").exists());
    }
}
