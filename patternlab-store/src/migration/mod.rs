//! Schema bootstrap and one-shot backfill from the legacy file layout.
//!
//! Every per-timeframe step is isolated: an error is logged and recorded as
//! `false` for that item, and the remaining items still run.

pub mod legacy;
pub mod schema;

use crate::backend::sqlite::CHUNK_SIZE;
use crate::backend::{BarStore, FileStore, SeriesKey, SqliteDb, SqliteStore};
use crate::error::StoreError;
use crate::settings::{
    FileStoragePaths, SettingsStore, StorageModeSetting, DATABASE_VERSION, DATABASE_VERSION_KEY,
    FILE_PATHS_KEY, STORAGE_MODE_KEY,
};
use chrono::Duration;
use legacy::{png_files_by_timeframe, AnalysisDocument, LegacyLayout, PatternBlob, PatternMetadata};
use patternlab_core::pipeline::timestamp::format_timestamp;
use patternlab_core::Timeframe;
use rusqlite::{params, OptionalExtension};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct VisualizationCounts {
    pub pattern: usize,
    pub analysis: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MigrationSummary {
    pub database_initialized: bool,
    pub processed_data: BTreeMap<String, bool>,
    pub patterns: BTreeMap<String, bool>,
    pub analysis: BTreeMap<String, bool>,
    pub visualizations: VisualizationCounts,
    pub success: bool,
}

pub struct MigrationCoordinator {
    db: Arc<SqliteDb>,
    layout: LegacyLayout,
    symbol: String,
}

impl MigrationCoordinator {
    pub fn new(db: Arc<SqliteDb>, base_dir: impl AsRef<Path>, symbol: impl Into<String>) -> Self {
        Self {
            db,
            layout: LegacyLayout::new(base_dir),
            symbol: symbol.into(),
        }
    }

    pub fn layout(&self) -> &LegacyLayout {
        &self.layout
    }

    /// Create the schema, seed default settings on an empty settings table
    /// and probe for a time-series extension.
    pub fn initialize_schema(&self) -> bool {
        match self.try_initialize_schema() {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, "database initialization failed");
                false
            }
        }
    }

    fn try_initialize_schema(&self) -> Result<(), StoreError> {
        self.db.run_migrations()?;
        info!("database schema ready");

        if self.db.setting_count()? == 0 {
            self.db.write_setting(
                STORAGE_MODE_KEY,
                &serde_json::to_value(StorageModeSetting::default())?,
                "Storage mode configuration",
            )?;
            self.db.write_setting(
                FILE_PATHS_KEY,
                &serde_json::to_value(FileStoragePaths::default())?,
                "File storage paths for fallback mode",
            )?;
            self.db.write_setting(
                DATABASE_VERSION_KEY,
                &serde_json::Value::from(DATABASE_VERSION),
                "Current database schema version",
            )?;
            info!("system settings initialized");
        }

        let extension = self
            .db
            .with_conn(|conn| Ok(schema::timeseries_extension_available(conn)))?;
        if extension {
            info!("time-series extension enabled");
        }
        Ok(())
    }

    pub fn migrate_processed(&self, timeframes: Option<&[String]>) -> BTreeMap<String, bool> {
        let available = self.layout.processed_timeframes();
        let store = SqliteStore::new(Arc::clone(&self.db));
        run_each("processed data", select(available, timeframes), |tf| {
            self.migrate_processed_one(&store, tf)
        })
    }

    fn migrate_processed_one(&self, store: &SqliteStore, label: &str) -> Result<(), StoreError> {
        let timeframe: Timeframe = label.parse()?;
        let key = SeriesKey::new(self.symbol.clone(), timeframe.clone());
        let path = self.layout.processed_path(&self.symbol, label);
        if !path.exists() {
            return Err(StoreError::NotFound(path.display().to_string()));
        }
        let files = FileStore::new(self.layout.processed_dir());
        let frame = files
            .get(&key, 0)?
            .ok_or_else(|| StoreError::NotFound(format!("{} has no rows", path.display())))?;
        let rows = store.save(&key, &frame)?;
        debug!(series = %key, rows, "processed rows copied");
        Ok(())
    }

    /// Replace each timeframe's patterns and instances with the legacy
    /// metadata + blob pair.
    pub fn migrate_patterns(&self, timeframes: Option<&[String]>) -> BTreeMap<String, bool> {
        let available = self.layout.pattern_timeframes();
        run_each("patterns", select(available, timeframes), |tf| {
            self.migrate_patterns_one(tf)
        })
    }

    fn migrate_patterns_one(&self, label: &str) -> Result<(), StoreError> {
        let timeframe: Timeframe = label.parse()?;
        let meta_path = self.layout.pattern_metadata_path(label);
        let blob_path = self.layout.pattern_blob_path(label);
        for path in [&meta_path, &blob_path] {
            if !path.exists() {
                return Err(StoreError::NotFound(path.display().to_string()));
            }
        }
        let meta = PatternMetadata::read(&meta_path)?;
        let blob = PatternBlob::read_parquet(&blob_path)?;

        let discovered = meta
            .extraction_date
            .clone()
            .unwrap_or_else(|| format_timestamp(&chrono::Local::now().naive_local()));
        let span = timeframe
            .nominal_interval()
            .map(|step| step * (meta.window_size.saturating_sub(1) as i32))
            .unwrap_or_else(Duration::zero);

        self.db.with_conn(|conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM patterns WHERE timeframe = ?1", [label])?;

            let mut pattern_ids = BTreeMap::new();
            {
                let mut insert = tx.prepare(
                    "INSERT INTO patterns (name, description, template_grid_dimensions,
                        discovery_timestamp, discovery_method, timeframe, window_size,
                        cluster_id, n_occurrences, visualization_path, pattern_data)
                     VALUES (?1, ?2, ?3, ?4, 'template_grid_clustering', ?5, ?6, ?7, ?8, ?9, ?10)",
                )?;
                for (cluster, count) in blob.cluster_counts() {
                    let rep = meta
                        .representatives
                        .get(&cluster.to_string())
                        .cloned()
                        .unwrap_or_default();
                    let pattern_data = serde_json::json!({
                        "extraction_date": discovered,
                        "representative_index": rep.index,
                        "representative_timestamp": rep.timestamp,
                    });
                    insert.execute(params![
                        format!("{label}_pattern_{cluster}"),
                        format!("Automatically discovered pattern in {label} timeframe, cluster {cluster}"),
                        format!("{}x{}", meta.grid_rows, meta.grid_cols),
                        discovered,
                        label,
                        meta.window_size as i64,
                        cluster,
                        count as i64,
                        format!("data/patterns/visualizations/{label}/cluster_{cluster}_pattern.png"),
                        pattern_data.to_string(),
                    ])?;
                    pattern_ids.insert(cluster, tx.last_insert_rowid());
                }

                let mut insert = tx.prepare(
                    "INSERT INTO pattern_instances (pattern_id, symbol, timeframe,
                        start_timestamp, end_timestamp, match_score, window_data)
                     VALUES (?1, ?2, ?3, ?4, ?5, 1.0, ?6)",
                )?;
                for (chunk_idx, chunk) in (0..blob.len())
                    .collect::<Vec<_>>()
                    .chunks(CHUNK_SIZE)
                    .enumerate()
                {
                    for &i in chunk {
                        let Some(pattern_id) = pattern_ids.get(&blob.cluster_labels[i]) else {
                            continue;
                        };
                        let end = blob.timestamps[i];
                        let window_data = serde_json::json!({
                            "window": blob.windows[i],
                            "index": i,
                        });
                        insert.execute(params![
                            pattern_id,
                            self.symbol,
                            label,
                            format_timestamp(&(end - span)),
                            format_timestamp(&end),
                            window_data.to_string(),
                        ])?;
                    }
                    debug!(timeframe = label, chunk = chunk_idx, rows = chunk.len(), "instances inserted");
                }
            }
            tx.commit()?;
            Ok(())
        })?;

        info!(
            timeframe = label,
            patterns = blob.cluster_counts().len(),
            instances = blob.len(),
            "patterns migrated"
        );
        Ok(())
    }

    /// Store each analysis document plus per-pattern performance rows. A
    /// timeframe with no migrated patterns fails.
    pub fn migrate_analysis(&self, timeframes: Option<&[String]>) -> BTreeMap<String, bool> {
        let available = self.layout.analysis_timeframes();
        run_each("analysis", select(available, timeframes), |tf| {
            self.migrate_analysis_one(tf)
        })
    }

    fn migrate_analysis_one(&self, label: &str) -> Result<(), StoreError> {
        let path = self.layout.analysis_path(label);
        if !path.exists() {
            return Err(StoreError::NotFound(path.display().to_string()));
        }
        let doc = AnalysisDocument::read(&path)?;

        let performances = self.db.with_conn(|conn| {
            let tx = conn.transaction()?;
            let patterns: Vec<(i64, i64)> = {
                let mut stmt = tx.prepare(
                    "SELECT pattern_id, cluster_id FROM patterns WHERE timeframe = ?1 ORDER BY cluster_id",
                )?;
                let rows = stmt
                    .query_map([label], |row| Ok((row.get(0)?, row.get(1)?)))?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            };
            if patterns.is_empty() {
                return Err(StoreError::NotFound(format!("no patterns for timeframe {label}")));
            }

            tx.execute(
                "INSERT INTO pattern_analyses (timeframe, analysis_date, lookahead_periods,
                    significance_threshold, min_occurrences, analysis_data)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(timeframe) DO UPDATE SET
                    analysis_date = excluded.analysis_date,
                    lookahead_periods = excluded.lookahead_periods,
                    significance_threshold = excluded.significance_threshold,
                    min_occurrences = excluded.min_occurrences,
                    analysis_data = excluded.analysis_data",
                params![
                    label,
                    doc.analysis_date,
                    doc.lookahead_periods,
                    doc.significance_threshold,
                    doc.min_occurrences,
                    doc.raw.to_string(),
                ],
            )?;

            let mut written = 0usize;
            {
                let mut insert = tx.prepare(
                    "INSERT OR REPLACE INTO pattern_performance
                        (pattern_id, timeframe, lookahead_periods, returns, significance)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )?;
                for (pattern_id, cluster) in &patterns {
                    let Some(returns) = doc.cluster_returns.get(&cluster.to_string()) else {
                        continue;
                    };
                    let significance = doc
                        .statistical_significance
                        .get(&cluster.to_string())
                        .map(|v| v.to_string());
                    insert.execute(params![
                        pattern_id,
                        label,
                        doc.lookahead_periods,
                        returns.to_string(),
                        significance,
                    ])?;
                    written += 1;
                }
            }
            tx.commit()?;
            Ok(written)
        })?;

        info!(timeframe = label, performances, "analysis migrated");
        Ok(())
    }

    /// Register existing chart images. Pattern images are linked to their
    /// pattern and skipped when it has not been migrated.
    pub fn migrate_visualizations(&self) -> VisualizationCounts {
        let mut counts = VisualizationCounts::default();

        for (label, files) in png_files_by_timeframe(&self.layout.patterns_viz_dir()) {
            for path in files {
                match self.register_pattern_image(&label, &path) {
                    Ok(true) => counts.pattern += 1,
                    Ok(false) => {}
                    Err(e) => {
                        error!(path = %path.display(), error = %e, "pattern visualization not migrated")
                    }
                }
            }
        }

        for (label, files) in png_files_by_timeframe(&self.layout.analysis_viz_dir()) {
            for path in files {
                match self.register_analysis_image(&label, &path) {
                    Ok(true) => counts.analysis += 1,
                    Ok(false) => {}
                    Err(e) => {
                        error!(path = %path.display(), error = %e, "analysis visualization not migrated")
                    }
                }
            }
        }

        counts.total = counts.pattern + counts.analysis;
        info!(
            pattern = counts.pattern,
            analysis = counts.analysis,
            total = counts.total,
            "visualization migration complete"
        );
        counts
    }

    /// `cluster_<id>_<kind>.png`
    fn register_pattern_image(&self, label: &str, path: &Path) -> Result<bool, StoreError> {
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            return Ok(false);
        };
        let mut parts = stem.split('_');
        if parts.next() != Some("cluster") {
            return Ok(false);
        }
        let cluster: i64 = match parts.next().map(str::parse) {
            Some(Ok(id)) => id,
            _ => return Ok(false),
        };
        let kind = parts.next().unwrap_or("pattern");

        let pattern_id: Option<i64> = self.db.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT pattern_id FROM patterns WHERE timeframe = ?1 AND cluster_id = ?2",
                    params![label, cluster],
                    |row| row.get(0),
                )
                .optional()?)
        })?;
        let Some(pattern_id) = pattern_id else {
            debug!(timeframe = label, cluster, "no pattern for visualization");
            return Ok(false);
        };

        let metadata = serde_json::json!({ "timeframe": label, "cluster_id": cluster });
        self.upsert_visualization(
            "pattern",
            Some(pattern_id.to_string()),
            &format!("pattern_{kind}"),
            path,
            &metadata,
        )?;
        Ok(true)
    }

    /// `<chart>_chart.png`
    fn register_analysis_image(&self, label: &str, path: &Path) -> Result<bool, StoreError> {
        let Some(name) = path.file_name().and_then(|s| s.to_str()) else {
            return Ok(false);
        };
        let Some(chart) = name.strip_suffix("_chart.png").and_then(|s| s.split('_').next()) else {
            return Ok(false);
        };

        let analysis_id: Option<i64> = self.db.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT analysis_id FROM pattern_analyses WHERE timeframe = ?1",
                    [label],
                    |row| row.get(0),
                )
                .optional()?)
        })?;

        let metadata = serde_json::json!({ "timeframe": label, "chart_type": chart });
        self.upsert_visualization(
            "analysis",
            analysis_id.map(|id| id.to_string()),
            &format!("analysis_{chart}"),
            path,
            &metadata,
        )?;
        Ok(true)
    }

    fn upsert_visualization(
        &self,
        entity_type: &str,
        entity_id: Option<String>,
        kind: &str,
        path: &Path,
        metadata: &serde_json::Value,
    ) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO visualizations
                    (related_entity_type, related_entity_id, visualization_type, file_path, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(file_path) DO UPDATE SET
                    related_entity_type = excluded.related_entity_type,
                    related_entity_id = excluded.related_entity_id,
                    visualization_type = excluded.visualization_type,
                    metadata = excluded.metadata",
                params![
                    entity_type,
                    entity_id,
                    kind,
                    path.display().to_string(),
                    metadata.to_string(),
                ],
            )?;
            Ok(())
        })
    }

    /// Initialize, then migrate processed data, patterns, analyses and
    /// visualizations in that order. Initialization failure aborts.
    pub fn migrate_all(&self, timeframes: Option<&[String]>) -> MigrationSummary {
        let mut summary = MigrationSummary {
            database_initialized: self.initialize_schema(),
            ..MigrationSummary::default()
        };
        if !summary.database_initialized {
            error!("database initialization failed, aborting migration");
            return summary;
        }

        summary.processed_data = self.migrate_processed(timeframes);
        summary.patterns = self.migrate_patterns(timeframes);
        summary.analysis = self.migrate_analysis(timeframes);
        summary.visualizations = self.migrate_visualizations();

        summary.success = [&summary.processed_data, &summary.patterns, &summary.analysis]
            .iter()
            .all(|results| results.values().all(|ok| *ok));

        info!(success = summary.success, "data migration complete");
        summary
    }
}

/// Available labels, narrowed to `requested` when given and non-empty.
fn select(available: Vec<String>, requested: Option<&[String]>) -> Vec<String> {
    let selected: Vec<String> = match requested {
        Some(req) if !req.is_empty() => available
            .into_iter()
            .filter(|tf| req.contains(tf))
            .collect(),
        _ => available,
    };
    if selected.is_empty() {
        warn!("no matching timeframes found for migration");
    }
    selected
}

fn run_each(
    what: &str,
    timeframes: Vec<String>,
    mut step: impl FnMut(&str) -> Result<(), StoreError>,
) -> BTreeMap<String, bool> {
    let mut results = BTreeMap::new();
    for tf in timeframes {
        info!(timeframe = %tf, "migrating {what}");
        let ok = match step(&tf) {
            Ok(()) => true,
            Err(e) => {
                error!(timeframe = %tf, error = %e, "{what} migration failed");
                false
            }
        };
        results.insert(tf, ok);
    }
    results
}
