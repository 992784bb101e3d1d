//! Raw bar file loader.
//!
//! Layout: `{data_dir}/{SYMBOL}_{timeframe}_data.csv`, semicolon-delimited
//! with a header row (`Date;Open;High;Low;Close;Volume`). Every cell is read
//! as text; typing happens in the cleaner.

use crate::domain::Timeframe;
use crate::error::PipelineError;
use polars::prelude::*;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const TIMESTAMP_COL: &str = "timestamp";

/// One raw row, exactly as read. Missing cells are empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawBar {
    pub timestamp: String,
    pub open: String,
    pub high: String,
    pub low: String,
    pub close: String,
    pub volume: String,
}

/// All raw rows of one timeframe file, in file order.
///
/// `frame` holds `String` columns named `timestamp`, `open`, `high`, `low`,
/// `close` and, when `has_volume`, `volume`. Empty cells are null.
#[derive(Debug, Clone)]
pub struct RawTable {
    pub timeframe: Timeframe,
    pub frame: DataFrame,
    pub has_volume: bool,
}

impl RawTable {
    /// Build a table from in-memory rows.
    pub fn from_bars(
        timeframe: Timeframe,
        bars: &[RawBar],
        has_volume: bool,
    ) -> Result<Self, PipelineError> {
        let mut columns = vec![
            Column::new(TIMESTAMP_COL.into(), text_cells(bars, |b| b.timestamp.as_str())),
            Column::new("open".into(), text_cells(bars, |b| b.open.as_str())),
            Column::new("high".into(), text_cells(bars, |b| b.high.as_str())),
            Column::new("low".into(), text_cells(bars, |b| b.low.as_str())),
            Column::new("close".into(), text_cells(bars, |b| b.close.as_str())),
        ];
        if has_volume {
            columns.push(Column::new("volume".into(), text_cells(bars, |b| b.volume.as_str())));
        }
        Ok(Self {
            timeframe,
            frame: DataFrame::new(columns)?,
            has_volume,
        })
    }

    pub fn len(&self) -> usize {
        self.frame.height()
    }

    pub fn is_empty(&self) -> bool {
        self.frame.height() == 0
    }

    /// Row `idx` as text cells.
    pub fn bar(&self, idx: usize) -> Option<RawBar> {
        if idx >= self.len() {
            return None;
        }
        let cell = |name: &str| -> String {
            self.frame
                .column(name)
                .ok()
                .and_then(|c| c.str().ok().and_then(|s| s.get(idx)).map(str::to_string))
                .unwrap_or_default()
        };
        Some(RawBar {
            timestamp: cell(TIMESTAMP_COL),
            open: cell("open"),
            high: cell("high"),
            low: cell("low"),
            close: cell("close"),
            volume: cell("volume"),
        })
    }
}

fn text_cells(bars: &[RawBar], field: fn(&RawBar) -> &str) -> Vec<Option<&str>> {
    bars.iter()
        .map(|b| Some(field(b).trim()).filter(|v| !v.is_empty()))
        .collect()
}

#[derive(Debug, Clone)]
pub struct RawDataLoader {
    data_dir: PathBuf,
    symbol: String,
}

impl RawDataLoader {
    pub fn new(data_dir: impl Into<PathBuf>, symbol: impl Into<String>) -> Self {
        Self {
            data_dir: data_dir.into(),
            symbol: symbol.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn file_path(&self, timeframe: &Timeframe) -> PathBuf {
        self.data_dir
            .join(format!("{}_{timeframe}_data.csv", self.symbol))
    }

    /// Timeframes that have a raw file in the data directory.
    pub fn available_timeframes(&self) -> Result<Vec<Timeframe>, PipelineError> {
        let prefix = format!("{}_", self.symbol);
        let mut found = Vec::new();
        if !self.data_dir.exists() {
            return Ok(found);
        }
        for entry in fs::read_dir(&self.data_dir)? {
            let name = entry?.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(rest) = name.strip_prefix(&prefix) else {
                continue;
            };
            let Some(label) = rest.strip_suffix("_data.csv") else {
                continue;
            };
            match label.parse::<Timeframe>() {
                Ok(tf) => found.push(tf),
                Err(_) => warn!(file = name, "skipping raw file with unrecognized timeframe"),
            }
        }
        found.sort();
        Ok(found)
    }

    /// Load one timeframe, or every available timeframe when `None`.
    ///
    /// When loading everything, a file that fails to read is logged and
    /// skipped. A specific timeframe that fails is returned as an error.
    pub fn load(
        &self,
        timeframe: Option<&Timeframe>,
    ) -> Result<BTreeMap<Timeframe, RawTable>, PipelineError> {
        let mut out = BTreeMap::new();
        match timeframe {
            Some(tf) => {
                out.insert(tf.clone(), self.load_one(tf)?);
            }
            None => {
                for tf in self.available_timeframes()? {
                    match self.load_one(&tf) {
                        Ok(table) => {
                            out.insert(tf, table);
                        }
                        Err(e) => warn!(timeframe = %tf, error = %e, "failed to load raw data"),
                    }
                }
            }
        }
        Ok(out)
    }

    pub fn load_one(&self, timeframe: &Timeframe) -> Result<RawTable, PipelineError> {
        let path = self.file_path(timeframe);
        if !path.exists() {
            return Err(PipelineError::MissingSource(timeframe.to_string()));
        }
        let table = read_raw_table(&path, timeframe.clone())?;
        info!(
            timeframe = %timeframe,
            rows = table.len(),
            path = %path.display(),
            "loaded raw bars"
        );
        Ok(table)
    }
}

/// Read a semicolon-delimited raw bar file. Headers are matched
/// case-insensitively and renamed to the canonical lower-case names.
pub fn read_raw_table(path: &Path, timeframe: Timeframe) -> Result<RawTable, PipelineError> {
    let df = LazyCsvReader::new(path)
        .with_separator(b';')
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .with_truncate_ragged_lines(true)
        .finish()?
        .collect()?;

    let headers: Vec<String> = df
        .get_column_names()
        .into_iter()
        .map(|h| h.to_string())
        .collect();
    let find = |names: &[&str]| {
        headers
            .iter()
            .find(|h| names.iter().any(|n| h.trim().eq_ignore_ascii_case(n)))
            .cloned()
    };

    let ts = find(&["date", "timestamp", "datetime", "time"])
        .ok_or_else(|| PipelineError::validation("missing timestamp column"))?;
    let mut selection = vec![col(ts.as_str()).alias(TIMESTAMP_COL)];
    for name in ["open", "high", "low", "close"] {
        let found =
            find(&[name]).ok_or_else(|| PipelineError::validation(format!("missing column '{name}'")))?;
        selection.push(col(found.as_str()).alias(name));
    }
    let volume = find(&["volume", "vol"]);
    if let Some(v) = &volume {
        selection.push(col(v.as_str()).alias("volume"));
    }

    let frame = df
        .lazy()
        .select(selection)
        .with_columns(
            [TIMESTAMP_COL, "open", "high", "low", "close", "volume"]
                .into_iter()
                .filter(|c| *c != "volume" || volume.is_some())
                .map(|c| col(c).str().strip_chars(lit(NULL)))
                .collect::<Vec<_>>(),
        )
        .collect()?;

    Ok(RawTable {
        timeframe,
        frame,
        has_volume: volume.is_some(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "Date;Open;High;Low;Close;Volume\n\
        2004.06.11 07:00;384.0;384.3;383.3;383.8;44\n\
        2004.06.11 08:00;383.8;384.3;383.1;383.1;41\n\
        2004.06.11 09:00;;383.8;383.0;383.5;\n";

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn reads_semicolon_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "XAU_1h_data.csv", SAMPLE);
        let table = read_raw_table(&path, "1h".parse().unwrap()).unwrap();
        assert_eq!(table.len(), 3);
        assert!(table.has_volume);
        let first = table.bar(0).unwrap();
        assert_eq!(first.timestamp, "2004.06.11 07:00");
        assert_eq!(first.close, "383.8");
        let last = table.bar(2).unwrap();
        assert_eq!(last.open, "");
        assert_eq!(last.volume, "");
        assert!(table.bar(3).is_none());
    }

    #[test]
    fn missing_close_is_validation_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "XAU_1h_data.csv",
            "Date;Open;High;Low;Volume\n2004.06.11 07:00;1;2;0.5;3\n",
        );
        let err = read_raw_table(&path, "1h".parse().unwrap()).unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));
    }

    #[test]
    fn volume_is_optional() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "XAU_1d_data.csv",
            "timestamp;open;high;low;close\n2024-01-01 00:00; 1 ;2;0.5;1.5\n",
        );
        let table = read_raw_table(&path, "1d".parse().unwrap()).unwrap();
        assert!(!table.has_volume);
        let bar = table.bar(0).unwrap();
        assert_eq!(bar.open, "1");
        assert_eq!(bar.volume, "");
    }

    #[test]
    fn from_bars_treats_blank_cells_as_null() {
        let bars = vec![RawBar {
            timestamp: "2024.01.01 00:00".into(),
            open: " ".into(),
            high: "2".into(),
            low: "1".into(),
            close: "1.5".into(),
            volume: String::new(),
        }];
        let table = RawTable::from_bars("1h".parse().unwrap(), &bars, true).unwrap();
        assert_eq!(table.frame.column("open").unwrap().null_count(), 1);
        assert_eq!(table.frame.column("volume").unwrap().null_count(), 1);
        assert_eq!(table.bar(0).unwrap().high, "2");
    }

    #[test]
    fn loader_discovers_timeframes() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("XAU_1h_data.csv"), SAMPLE).unwrap();
        fs::write(dir.path().join("XAU_1d_data.csv"), SAMPLE).unwrap();
        fs::write(dir.path().join("XAU_junk_data.csv"), SAMPLE).unwrap();
        fs::write(dir.path().join("EUR_1h_data.csv"), SAMPLE).unwrap();

        let loader = RawDataLoader::new(dir.path(), "XAU");
        let tfs = loader.available_timeframes().unwrap();
        let labels: Vec<String> = tfs.iter().map(|t| t.to_string()).collect();
        assert_eq!(labels, vec!["1h", "1d"]);

        let all = loader.load(None).unwrap();
        assert_eq!(all.len(), 2);

        let only: Timeframe = "1h".parse().unwrap();
        let one = loader.load(Some(&only)).unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one[&only].len(), 3);
    }

    #[test]
    fn missing_file_for_requested_timeframe() {
        let dir = tempfile::tempdir().unwrap();
        let loader = RawDataLoader::new(dir.path(), "XAU");
        let tf: Timeframe = "4h".parse().unwrap();
        assert!(matches!(
            loader.load(Some(&tf)),
            Err(PipelineError::MissingSource(_))
        ));
    }
}
