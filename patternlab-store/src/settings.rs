//! Storage-mode configuration held in the settings store.
//!
//! Reads never fail: a missing or unreadable setting falls back to the
//! defaults (`primary = database`, `fallback = file`). Turning the raw strings
//! into a usable [`StorageMode`] is where bad values are rejected.

use crate::backend::BackendKind;
use crate::error::StoreError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

pub const STORAGE_MODE_KEY: &str = "storage_mode";
pub const FILE_PATHS_KEY: &str = "file_storage_paths";
pub const DATABASE_VERSION_KEY: &str = "database_version";
pub const DATABASE_VERSION: &str = "1.0";

/// Key/value settings persistence.
pub trait SettingsStore: Send + Sync {
    fn read_setting(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError>;

    fn write_setting(
        &self,
        key: &str,
        value: &serde_json::Value,
        description: &str,
    ) -> Result<(), StoreError>;

    fn setting_count(&self) -> Result<usize, StoreError>;
}

/// Raw storage-mode setting as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageModeSetting {
    pub primary: String,
    pub fallback: String,
}

impl Default for StorageModeSetting {
    fn default() -> Self {
        Self {
            primary: "database".to_string(),
            fallback: "file".to_string(),
        }
    }
}

impl StorageModeSetting {
    pub fn new(primary: impl Into<String>, fallback: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            fallback: fallback.into(),
        }
    }

    /// A fallback of `none`/empty, or equal to the primary, means no fallback.
    pub fn resolve(&self) -> Result<StorageMode, StoreError> {
        let primary: BackendKind = self.primary.parse()?;
        let fallback = match self.fallback.trim().to_ascii_lowercase().as_str() {
            "" | "none" => None,
            other => Some(other.parse::<BackendKind>()?),
        };
        Ok(StorageMode {
            primary,
            fallback: fallback.filter(|f| *f != primary),
        })
    }
}

/// Validated storage mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageMode {
    pub primary: BackendKind,
    pub fallback: Option<BackendKind>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStoragePaths {
    pub processed_data: PathBuf,
    pub patterns: PathBuf,
    pub analysis: PathBuf,
}

impl Default for FileStoragePaths {
    fn default() -> Self {
        Self {
            processed_data: PathBuf::from("data/processed"),
            patterns: PathBuf::from("data/patterns"),
            analysis: PathBuf::from("data/analysis"),
        }
    }
}

impl FileStoragePaths {
    /// Resolve relative entries against `base`.
    pub fn resolved(&self, base: &Path) -> Self {
        let join = |p: &PathBuf| {
            if p.is_absolute() {
                p.clone()
            } else {
                base.join(p)
            }
        };
        Self {
            processed_data: join(&self.processed_data),
            patterns: join(&self.patterns),
            analysis: join(&self.analysis),
        }
    }
}

pub struct StorageModePolicy {
    settings: Arc<dyn SettingsStore>,
}

impl StorageModePolicy {
    pub fn new(settings: Arc<dyn SettingsStore>) -> Self {
        Self { settings }
    }

    pub fn get_mode(&self) -> StorageModeSetting {
        self.read_or_default(STORAGE_MODE_KEY)
    }

    pub fn get_file_paths(&self) -> FileStoragePaths {
        self.read_or_default(FILE_PATHS_KEY)
    }

    /// Current mode, validated.
    pub fn resolve(&self) -> Result<StorageMode, StoreError> {
        self.get_mode().resolve()
    }

    pub fn set_mode(&self, setting: &StorageModeSetting) -> Result<(), StoreError> {
        setting.resolve()?;
        self.settings.write_setting(
            STORAGE_MODE_KEY,
            &serde_json::to_value(setting)?,
            "Storage mode configuration",
        )?;
        info!(primary = %setting.primary, fallback = %setting.fallback, "storage mode updated");
        Ok(())
    }

    pub fn set_file_paths(&self, paths: &FileStoragePaths) -> Result<(), StoreError> {
        self.settings.write_setting(
            FILE_PATHS_KEY,
            &serde_json::to_value(paths)?,
            "File storage paths",
        )
    }

    fn read_or_default<T: Default + serde::de::DeserializeOwned>(&self, key: &str) -> T {
        match self.settings.read_setting(key) {
            Ok(Some(value)) => match serde_json::from_value(value) {
                Ok(v) => v,
                Err(e) => {
                    warn!(setting = key, error = %e, "malformed setting, using defaults");
                    T::default()
                }
            },
            Ok(None) => T::default(),
            Err(e) => {
                error!(setting = key, error = %e, "failed to read setting, using defaults");
                T::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SqliteDb;

    struct BrokenSettings;

    impl SettingsStore for BrokenSettings {
        fn read_setting(&self, _key: &str) -> Result<Option<serde_json::Value>, StoreError> {
            Err(StoreError::storage("settings table unavailable"))
        }

        fn write_setting(
            &self,
            _key: &str,
            _value: &serde_json::Value,
            _description: &str,
        ) -> Result<(), StoreError> {
            Err(StoreError::storage("settings table unavailable"))
        }

        fn setting_count(&self) -> Result<usize, StoreError> {
            Err(StoreError::storage("settings table unavailable"))
        }
    }

    fn policy() -> StorageModePolicy {
        StorageModePolicy::new(Arc::new(SqliteDb::open_in_memory().unwrap()))
    }

    #[test]
    fn defaults_when_absent() {
        let p = policy();
        assert_eq!(p.get_mode(), StorageModeSetting::default());
        assert_eq!(p.get_file_paths(), FileStoragePaths::default());
        let mode = p.resolve().unwrap();
        assert_eq!(mode.primary, BackendKind::Database);
        assert_eq!(mode.fallback, Some(BackendKind::File));
    }

    #[test]
    fn defaults_when_store_errors() {
        let p = StorageModePolicy::new(Arc::new(BrokenSettings));
        assert_eq!(p.get_mode(), StorageModeSetting::default());
        assert_eq!(p.get_file_paths(), FileStoragePaths::default());
        assert!(p.set_mode(&StorageModeSetting::default()).is_err());
    }

    #[test]
    fn set_and_get_mode() {
        let p = policy();
        p.set_mode(&StorageModeSetting::new("file", "none")).unwrap();
        let mode = p.resolve().unwrap();
        assert_eq!(mode.primary, BackendKind::File);
        assert_eq!(mode.fallback, None);
    }

    #[test]
    fn set_mode_rejects_unknown_values() {
        let p = policy();
        let err = p.set_mode(&StorageModeSetting::new("cloud", "file")).unwrap_err();
        assert!(err.is_config());
        assert_eq!(p.get_mode(), StorageModeSetting::default());
    }

    #[test]
    fn fallback_equal_to_primary_is_none() {
        let mode = StorageModeSetting::new("database", "database").resolve().unwrap();
        assert_eq!(mode.fallback, None);
    }

    #[test]
    fn resolved_paths() {
        let paths = FileStoragePaths::default().resolved(Path::new("/srv/app"));
        assert_eq!(paths.processed_data, PathBuf::from("/srv/app/data/processed"));
    }
}
