//! Legacy file-based artifacts, as laid out under `<base>/data`.
//!
//! ```text
//! processed/<SYM>_<tf>_processed.csv
//! patterns/data/<tf>_patterns.json          pattern metadata
//! patterns/data/<tf>_full_patterns.parquet  per-window blob
//! patterns/visualizations/<tf>/cluster_<id>_<kind>.png
//! analysis/data/<tf>_analysis.json
//! analysis/visualizations/<tf>/<chart>_chart.png
//! ```

use crate::error::StoreError;
use chrono::NaiveDateTime;
use patternlab_core::pipeline::timestamp::{format_timestamp, parse_any};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, Clone)]
pub struct LegacyLayout {
    data_dir: PathBuf,
}

impl LegacyLayout {
    pub fn new(base: impl AsRef<Path>) -> Self {
        Self {
            data_dir: base.as_ref().join("data"),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn processed_dir(&self) -> PathBuf {
        self.data_dir.join("processed")
    }

    pub fn patterns_data_dir(&self) -> PathBuf {
        self.data_dir.join("patterns").join("data")
    }

    pub fn patterns_viz_dir(&self) -> PathBuf {
        self.data_dir.join("patterns").join("visualizations")
    }

    pub fn analysis_data_dir(&self) -> PathBuf {
        self.data_dir.join("analysis").join("data")
    }

    pub fn analysis_viz_dir(&self) -> PathBuf {
        self.data_dir.join("analysis").join("visualizations")
    }

    pub fn processed_path(&self, symbol: &str, timeframe: &str) -> PathBuf {
        self.processed_dir()
            .join(format!("{symbol}_{timeframe}_processed.csv"))
    }

    pub fn pattern_metadata_path(&self, timeframe: &str) -> PathBuf {
        self.patterns_data_dir()
            .join(format!("{timeframe}_patterns.json"))
    }

    pub fn pattern_blob_path(&self, timeframe: &str) -> PathBuf {
        self.patterns_data_dir()
            .join(format!("{timeframe}_full_patterns.parquet"))
    }

    pub fn analysis_path(&self, timeframe: &str) -> PathBuf {
        self.analysis_data_dir()
            .join(format!("{timeframe}_analysis.json"))
    }

    /// Timeframe labels with a processed CSV: `<SYM>_<tf>_processed.csv`.
    pub fn processed_timeframes(&self) -> Vec<String> {
        labels_in(&self.processed_dir(), "_processed.csv", 1)
    }

    /// Timeframe labels with pattern metadata: `<tf>_patterns.json`.
    pub fn pattern_timeframes(&self) -> Vec<String> {
        labels_in(&self.patterns_data_dir(), "_patterns.json", 0)
    }

    /// Timeframe labels with an analysis document: `<tf>_analysis.json`.
    pub fn analysis_timeframes(&self) -> Vec<String> {
        labels_in(&self.analysis_data_dir(), "_analysis.json", 0)
    }
}

/// Sorted, de-duplicated `_`-separated field `field` of every file in `dir`
/// ending with `suffix`. A missing directory yields nothing.
fn labels_in(dir: &Path, suffix: &str, field: usize) -> Vec<String> {
    let Ok(entries) = fs::read_dir(dir) else {
        warn!(dir = %dir.display(), "legacy directory not found");
        return Vec::new();
    };
    let mut labels: Vec<String> = entries
        .filter_map(|e| e.ok())
        .filter_map(|e| e.file_name().into_string().ok())
        .filter(|name| name.ends_with(suffix))
        .filter_map(|name| name.split('_').nth(field).map(str::to_string))
        .collect();
    labels.sort();
    labels.dedup();
    labels
}

/// Subdirectories of `dir` (one per timeframe) and the `.png` files in each.
pub fn png_files_by_timeframe(dir: &Path) -> Vec<(String, Vec<PathBuf>)> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut out: Vec<(String, Vec<PathBuf>)> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_dir())
        .filter_map(|e| {
            let timeframe = e.file_name().into_string().ok()?;
            let mut files: Vec<PathBuf> = fs::read_dir(e.path())
                .ok()?
                .filter_map(|f| f.ok().map(|f| f.path()))
                .filter(|p| p.extension().is_some_and(|ext| ext == "png"))
                .collect();
            files.sort();
            Some((timeframe, files))
        })
        .collect();
    out.sort_by(|a, b| a.0.cmp(&b.0));
    out
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Representative {
    #[serde(default)]
    pub index: usize,
    #[serde(default)]
    pub timestamp: String,
}

fn default_window_size() -> usize {
    5
}

fn default_grid() -> usize {
    10
}

/// `<tf>_patterns.json`. Unknown keys are kept in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternMetadata {
    #[serde(default)]
    pub extraction_date: Option<String>,
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    #[serde(default = "default_grid")]
    pub grid_rows: usize,
    #[serde(default = "default_grid")]
    pub grid_cols: usize,
    #[serde(default)]
    pub representatives: BTreeMap<String, Representative>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl PatternMetadata {
    pub fn read(path: &Path) -> Result<Self, StoreError> {
        Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
    }
}

/// Per-window pattern data: window values, end timestamp, cluster label and
/// the window's distance-matrix row. All vectors are index-aligned.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatternBlob {
    pub windows: Vec<Vec<f64>>,
    pub timestamps: Vec<NaiveDateTime>,
    pub cluster_labels: Vec<i64>,
    pub distances: Vec<Vec<f64>>,
}

impl PatternBlob {
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Window count per cluster label.
    pub fn cluster_counts(&self) -> BTreeMap<i64, usize> {
        let mut counts = BTreeMap::new();
        for label in &self.cluster_labels {
            *counts.entry(*label).or_insert(0) += 1;
        }
        counts
    }

    fn check_aligned(&self) -> Result<(), StoreError> {
        let n = self.windows.len();
        if self.timestamps.len() != n || self.cluster_labels.len() != n {
            return Err(StoreError::storage(format!(
                "pattern blob misaligned: {n} windows, {} timestamps, {} labels",
                self.timestamps.len(),
                self.cluster_labels.len()
            )));
        }
        if !self.distances.is_empty() && self.distances.len() != n {
            return Err(StoreError::storage(format!(
                "pattern blob misaligned: {n} windows, {} distance rows",
                self.distances.len()
            )));
        }
        Ok(())
    }

    pub fn write_parquet(&self, path: &Path) -> Result<(), StoreError> {
        self.check_aligned()?;
        let n = self.len();
        let list = |rows: &[Vec<f64>]| -> Vec<Series> {
            (0..n)
                .map(|i| Series::new("".into(), rows.get(i).cloned().unwrap_or_default()))
                .collect()
        };
        let mut df = DataFrame::new(vec![
            Column::new("window_index".into(), (0..n as i64).collect::<Vec<_>>()),
            Column::new(
                "timestamp".into(),
                self.timestamps.iter().map(format_timestamp).collect::<Vec<_>>(),
            ),
            Column::new("cluster_label".into(), self.cluster_labels.clone()),
            Column::new("window".into(), list(&self.windows)),
            Column::new("distances".into(), list(&self.distances)),
        ])?;
        let file = fs::File::create(path)?;
        ParquetWriter::new(file).finish(&mut df)?;
        Ok(())
    }

    pub fn read_parquet(path: &Path) -> Result<Self, StoreError> {
        let file = fs::File::open(path)?;
        let df = ParquetReader::new(file).finish()?;
        if df.height() == 0 {
            return Ok(Self::default());
        }

        let mut timestamps = Vec::with_capacity(df.height());
        for value in df.column("timestamp")?.str()?.into_iter() {
            let text = value.unwrap_or("");
            let ts = parse_any(text).ok_or_else(|| {
                StoreError::storage(format!(
                    "{}: unparseable timestamp '{text}'",
                    path.display()
                ))
            })?;
            timestamps.push(ts);
        }

        let cluster_labels = df
            .column("cluster_label")?
            .i64()?
            .into_iter()
            .map(|v| v.unwrap_or(-1))
            .collect();

        let blob = Self {
            windows: read_list(&df, "window")?,
            timestamps,
            cluster_labels,
            distances: read_list(&df, "distances")?,
        };
        blob.check_aligned()?;
        Ok(blob)
    }
}

fn read_list(df: &DataFrame, name: &str) -> Result<Vec<Vec<f64>>, StoreError> {
    let mut rows = Vec::with_capacity(df.height());
    for item in df.column(name)?.list()?.into_iter() {
        let row = match item {
            Some(series) => series
                .cast(&DataType::Float64)?
                .f64()?
                .into_iter()
                .map(|v| v.unwrap_or(f64::NAN))
                .collect(),
            None => Vec::new(),
        };
        rows.push(row);
    }
    Ok(rows)
}

fn default_lookahead() -> i64 {
    10
}

fn default_threshold() -> f64 {
    0.05
}

fn default_min_occurrences() -> i64 {
    5
}

/// `<tf>_analysis.json`. The full document is stored verbatim; these fields
/// are pulled out into their own columns.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AnalysisDocument {
    #[serde(default)]
    pub analysis_date: Option<String>,
    #[serde(default = "default_lookahead")]
    pub lookahead_periods: i64,
    #[serde(default = "default_threshold")]
    pub significance_threshold: f64,
    #[serde(default = "default_min_occurrences")]
    pub min_occurrences: i64,
    /// Keyed by cluster id as a string.
    #[serde(default)]
    pub cluster_returns: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub statistical_significance: BTreeMap<String, serde_json::Value>,
    #[serde(skip)]
    pub raw: serde_json::Value,
}

impl AnalysisDocument {
    pub fn read(path: &Path) -> Result<Self, StoreError> {
        let raw: serde_json::Value = serde_json::from_str(&fs::read_to_string(path)?)?;
        let mut doc: Self = serde_json::from_value(raw.clone())?;
        doc.raw = raw;
        Ok(doc)
    }
}
