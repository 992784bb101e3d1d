//! PatternLab persistence.
//!
//! Processed frames are saved through [`PersistenceRepository`], which asks
//! [`StorageModePolicy`] on every call which backend is primary and which is
//! the fallback. [`MigrationCoordinator`] bootstraps the relational schema and
//! backfills it from the legacy file layout.

pub mod backend;
pub mod error;
pub mod migration;
pub mod record;
pub mod repository;
pub mod settings;

pub use backend::{BackendKind, BarStore, DualWrite, FileStore, SeriesKey, SqliteDb, SqliteStore};
pub use error::StoreError;
pub use migration::{MigrationCoordinator, MigrationSummary, VisualizationCounts};
pub use repository::{PersistenceRepository, ReadOutcome, SaveOutcome};
pub use settings::{
    FileStoragePaths, SettingsStore, StorageMode, StorageModePolicy, StorageModeSetting,
};
