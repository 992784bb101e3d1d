//! Storage backends for processed bar frames.

pub mod dual;
pub mod file;
pub mod sqlite;

pub use dual::DualWrite;
pub use file::FileStore;
pub use sqlite::{SqliteDb, SqliteStore};

use crate::error::StoreError;
use patternlab_core::{BarFrame, Timeframe};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Database,
    File,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Database => "database",
            Self::File => "file",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "database" => Ok(Self::Database),
            "file" => Ok(Self::File),
            other => Err(StoreError::config(format!("unknown storage backend '{other}'"))),
        }
    }
}

/// Identifies one persisted series: all bars of a symbol at a timeframe.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SeriesKey {
    pub symbol: String,
    pub timeframe: Timeframe,
}

impl SeriesKey {
    pub fn new(symbol: impl Into<String>, timeframe: Timeframe) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe,
        }
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.symbol, self.timeframe)
    }
}

/// A place processed frames can be written to and read back from.
///
/// `save` fully replaces rows with the same timestamp. `get` returns the most
/// recent `limit` rows (all rows when `limit == 0`) in ascending timestamp
/// order, or `None` when the series has no rows.
pub trait BarStore: Send + Sync {
    fn kind(&self) -> BackendKind;

    fn save(&self, key: &SeriesKey, frame: &BarFrame) -> Result<usize, StoreError>;

    fn get(&self, key: &SeriesKey, limit: usize) -> Result<Option<BarFrame>, StoreError>;
}
