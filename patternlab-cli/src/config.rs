//! `patternlab.toml` application config.

use anyhow::{Context, Result};
use patternlab_core::pipeline::PipelineConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "patternlab.toml";
pub const DB_ENV_VAR: &str = "PATTERNLAB_DB";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub data: DataConfig,
    pub pipeline: PipelineConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Directory holding `<SYMBOL>_<tf>_data.csv` raw files.
    pub dir: PathBuf,
    pub symbol: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data/raw"),
            symbol: "XAU".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database: PathBuf,
    /// Relative file-storage paths and the legacy `data/` tree resolve here.
    pub base_dir: PathBuf,
    pub busy_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("data/patternlab.db"),
            base_dir: PathBuf::from("."),
            busy_timeout_ms: 5000,
        }
    }
}

impl StorageConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

impl AppConfig {
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("parse config TOML")
    }

    /// Load `path`, or `patternlab.toml` in the working directory. A missing
    /// default file yields defaults; a missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("read config {}", path.display()))?;
                Self::from_toml(&content)?
            }
            None => match std::fs::read_to_string(DEFAULT_CONFIG_FILE) {
                Ok(content) => Self::from_toml(&content)?,
                Err(_) => Self::default(),
            },
        };
        if let Ok(db) = std::env::var(DB_ENV_VAR) {
            if !db.is_empty() {
                config.storage.database = PathBuf::from(db);
            }
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use patternlab_core::pipeline::{MissingValuePolicy, ScalerPolicy};

    #[test]
    fn empty_file_gives_defaults() {
        let config = AppConfig::from_toml("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.pipeline.window_size, 5);
        assert_eq!(config.storage.busy_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn partial_sections() {
        let config = AppConfig::from_toml(
            r#"
[data]
symbol = "EURUSD"

[pipeline]
window_size = 8
missing_values = "DROP_ROWS"
scaler = "REUSE_STORED"

[pipeline.indicators]
ema_windows = [5, 10, 20]
bollinger = true

[storage]
database = "/var/lib/patternlab/db.sqlite"
"#,
        )
        .unwrap();
        assert_eq!(config.data.symbol, "EURUSD");
        assert_eq!(config.data.dir, PathBuf::from("data/raw"));
        assert_eq!(config.pipeline.window_size, 8);
        assert_eq!(config.pipeline.missing_values, MissingValuePolicy::DropRows);
        assert_eq!(config.pipeline.scaler, ScalerPolicy::ReuseStored);
        assert_eq!(config.pipeline.indicators.ema_windows, vec![5, 10, 20]);
        assert!(config.pipeline.indicators.bollinger);
        assert_eq!(config.pipeline.indicators.rsi_period, 14);
        assert_eq!(
            config.storage.database,
            PathBuf::from("/var/lib/patternlab/db.sqlite")
        );
        assert_eq!(config.storage.busy_timeout_ms, 5000);
    }

    #[test]
    fn unknown_policy_rejected() {
        assert!(AppConfig::from_toml("[pipeline]\nscaler = \"SOMETIMES\"\n").is_err());
    }

    #[test]
    fn explicit_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(AppConfig::load(Some(&dir.path().join("nope.toml"))).is_err());
    }

    #[test]
    fn explicit_file_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("patternlab.toml");
        std::fs::write(&path, "[storage]\nbusy_timeout_ms = 250\n").unwrap();
        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.storage.busy_timeout(), Duration::from_millis(250));
    }
}
