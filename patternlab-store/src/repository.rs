//! Mode-aware save/get for processed frames.
//!
//! The storage mode is re-read from the policy on every call, so a mode
//! change made through [`StorageModePolicy::set_mode`] applies to the next
//! save without rebuilding the repository.

use crate::backend::{BackendKind, BarStore, DualWrite, SeriesKey};
use crate::error::StoreError;
use crate::settings::{StorageMode, StorageModePolicy};
use patternlab_core::{BarFrame, Timeframe};
use std::sync::Arc;
use tracing::{error, info, warn};

/// What happened to a save.
#[derive(Debug, Default)]
pub struct SaveOutcome {
    pub succeeded: bool,
    /// Backend that holds the authoritative copy after this save.
    pub backend: Option<BackendKind>,
    /// The primary failed and the fallback took the write.
    pub degraded: bool,
    pub rows: usize,
    /// The fallback received a replica of a successful primary write.
    pub mirrored: bool,
    pub error: Option<String>,
}

impl SaveOutcome {
    fn written(backend: BackendKind, rows: usize) -> Self {
        Self {
            succeeded: true,
            backend: Some(backend),
            rows,
            ..Self::default()
        }
    }

    fn failed(err: &StoreError) -> Self {
        Self {
            error: Some(err.to_string()),
            ..Self::default()
        }
    }
}

/// What happened to a read. `frame == None` with `error == None` means the
/// series simply has no rows.
#[derive(Debug, Default)]
pub struct ReadOutcome {
    pub frame: Option<BarFrame>,
    pub backend: Option<BackendKind>,
    pub degraded: bool,
    pub error: Option<String>,
}

pub struct PersistenceRepository {
    symbol: String,
    policy: StorageModePolicy,
    database: Arc<dyn BarStore>,
    file: Arc<dyn BarStore>,
}

impl PersistenceRepository {
    pub fn new(
        symbol: impl Into<String>,
        policy: StorageModePolicy,
        database: Arc<dyn BarStore>,
        file: Arc<dyn BarStore>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            policy,
            database,
            file,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn policy(&self) -> &StorageModePolicy {
        &self.policy
    }

    pub fn save(&self, timeframe: &Timeframe, frame: &BarFrame) -> bool {
        self.save_with_outcome(timeframe, frame).succeeded
    }

    pub fn get(&self, timeframe: &Timeframe, limit: usize) -> Option<BarFrame> {
        self.get_with_outcome(timeframe, limit).frame
    }

    pub fn save_with_outcome(&self, timeframe: &Timeframe, frame: &BarFrame) -> SaveOutcome {
        let key = SeriesKey::new(self.symbol.clone(), timeframe.clone());
        let mode = match self.policy.resolve() {
            Ok(mode) => mode,
            Err(e) => {
                error!(series = %key, error = %e, "storage mode unresolved, nothing written");
                return SaveOutcome::failed(&e);
            }
        };

        let outcome = match mode {
            StorageMode {
                primary: BackendKind::Database,
                fallback: Some(BackendKind::File),
            } => self.save_database_with_file_fallback(&key, frame),
            StorageMode { primary, .. } => match self.store(primary).save(&key, frame) {
                Ok(rows) => SaveOutcome::written(primary, rows),
                Err(e) => {
                    error!(series = %key, backend = %primary, error = %e, "save failed");
                    SaveOutcome::failed(&e)
                }
            },
        };

        if outcome.succeeded {
            info!(
                series = %key,
                rows = outcome.rows,
                backend = ?outcome.backend,
                degraded = outcome.degraded,
                mirrored = outcome.mirrored,
                "processed data saved"
            );
        }
        outcome
    }

    fn save_database_with_file_fallback(&self, key: &SeriesKey, frame: &BarFrame) -> SaveOutcome {
        let dual = DualWrite::new(Arc::clone(&self.database), Arc::clone(&self.file));
        let primary_err = match dual.save_mirrored(key, frame) {
            Ok(write) => {
                let mut outcome = SaveOutcome::written(BackendKind::Database, write.rows);
                outcome.mirrored = write.mirror_error.is_none();
                return outcome;
            }
            Err(e) => e,
        };

        warn!(series = %key, error = %primary_err, "database save failed, writing to file");
        match self.file.save(key, frame) {
            Ok(rows) => SaveOutcome {
                degraded: true,
                error: Some(primary_err.to_string()),
                ..SaveOutcome::written(BackendKind::File, rows)
            },
            Err(e) => {
                error!(series = %key, error = %e, "file fallback save failed");
                SaveOutcome {
                    error: Some(format!("{primary_err}; fallback: {e}")),
                    ..SaveOutcome::default()
                }
            }
        }
    }

    pub fn get_with_outcome(&self, timeframe: &Timeframe, limit: usize) -> ReadOutcome {
        let key = SeriesKey::new(self.symbol.clone(), timeframe.clone());
        let mode = match self.policy.resolve() {
            Ok(mode) => mode,
            Err(e) => {
                error!(series = %key, error = %e, "storage mode unresolved");
                return ReadOutcome {
                    error: Some(e.to_string()),
                    ..ReadOutcome::default()
                };
            }
        };

        let primary = self.store(mode.primary);
        let primary_error = match primary.get(&key, limit) {
            Ok(Some(frame)) => {
                return ReadOutcome {
                    frame: Some(frame),
                    backend: Some(mode.primary),
                    ..ReadOutcome::default()
                }
            }
            Ok(None) => None,
            Err(e) => {
                warn!(series = %key, backend = %mode.primary, error = %e, "read failed");
                Some(e.to_string())
            }
        };

        match mode.fallback {
            Some(fallback) if mode.primary == BackendKind::Database => {
                match self.store(fallback).get(&key, limit) {
                    Ok(frame) => ReadOutcome {
                        backend: frame.as_ref().map(|_| fallback),
                        degraded: frame.is_some(),
                        frame,
                        error: primary_error,
                    },
                    Err(e) => {
                        warn!(series = %key, backend = %fallback, error = %e, "fallback read failed");
                        ReadOutcome {
                            error: Some(match primary_error {
                                Some(p) => format!("{p}; fallback: {e}"),
                                None => e.to_string(),
                            }),
                            ..ReadOutcome::default()
                        }
                    }
                }
            }
            _ => ReadOutcome {
                error: primary_error,
                ..ReadOutcome::default()
            },
        }
    }

    fn store(&self, kind: BackendKind) -> &Arc<dyn BarStore> {
        match kind {
            BackendKind::Database => &self.database,
            BackendKind::File => &self.file,
        }
    }
}
