//! Versioned relational schema.
//!
//! Each migration runs once and is recorded in `migrations`; re-running the
//! list is a no-op.

use crate::error::StoreError;
use rusqlite::Connection;
use tracing::{info, warn};

pub fn run_migrations(conn: &Connection) -> Result<(), StoreError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS migrations (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    run_migration(conn, "001_processed_data", CREATE_PROCESSED_DATA_TABLE)?;
    run_migration(conn, "002_system_settings", CREATE_SYSTEM_SETTINGS_TABLE)?;
    run_migration(conn, "003_patterns", CREATE_PATTERNS_TABLE)?;
    run_migration(conn, "004_pattern_instances", CREATE_PATTERN_INSTANCES_TABLE)?;
    run_migration(conn, "005_pattern_analyses", CREATE_PATTERN_ANALYSES_TABLE)?;
    run_migration(conn, "006_visualizations", CREATE_VISUALIZATIONS_TABLE)?;
    run_migration(conn, "007_processed_time_index", CREATE_PROCESSED_TIME_INDEX)?;

    Ok(())
}

fn run_migration(conn: &Connection, name: &str, sql: &str) -> Result<(), StoreError> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM migrations WHERE name = ?1)",
        [name],
        |row| row.get(0),
    )?;

    if !exists {
        info!(migration = name, "running migration");
        conn.execute_batch(sql)?;
        conn.execute("INSERT INTO migrations (name) VALUES (?1)", [name])?;
    }

    Ok(())
}

/// Probe for a time-series extension (partitioned time tables). SQLite has
/// none, so this reports `false` and the plain descending time index from
/// `007_processed_time_index` is what queries use.
pub fn timeseries_extension_available(conn: &Connection) -> bool {
    match conn.query_row(
        "SELECT extname FROM pg_extension WHERE extname = 'timescaledb'",
        [],
        |row| row.get::<_, String>(0),
    ) {
        Ok(_) => true,
        Err(e) => {
            warn!(error = %e, "time-series extension not available, using plain tables");
            false
        }
    }
}

pub fn applied_migrations(conn: &Connection) -> Result<Vec<String>, StoreError> {
    let mut stmt = conn.prepare("SELECT name FROM migrations ORDER BY id")?;
    let names = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(names)
}

const CREATE_PROCESSED_DATA_TABLE: &str = r#"
CREATE TABLE processed_data (
    timestamp TEXT NOT NULL,
    symbol TEXT NOT NULL,
    timeframe TEXT NOT NULL,
    open REAL,
    high REAL,
    low REAL,
    close REAL,
    volume REAL,
    sma_5 REAL,
    sma_10 REAL,
    sma_20 REAL,
    ema_5 REAL,
    ema_10 REAL,
    ema_20 REAL,
    rsi_14 REAL,
    macd REAL,
    macd_signal REAL,
    macd_hist REAL,
    bollinger_upper REAL,
    bollinger_middle REAL,
    bollinger_lower REAL,
    atr_14 REAL,
    norm_open REAL,
    norm_high REAL,
    norm_low REAL,
    norm_close REAL,
    norm_volume REAL,
    feature_data TEXT,
    PRIMARY KEY (timestamp, symbol, timeframe)
);
"#;

const CREATE_SYSTEM_SETTINGS_TABLE: &str = r#"
CREATE TABLE system_settings (
    setting_key TEXT PRIMARY KEY,
    setting_value TEXT NOT NULL,
    description TEXT,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

const CREATE_PATTERNS_TABLE: &str = r#"
CREATE TABLE patterns (
    pattern_id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    description TEXT,
    template_grid_dimensions TEXT,
    discovery_timestamp TEXT,
    discovery_method TEXT,
    timeframe TEXT NOT NULL,
    window_size INTEGER NOT NULL,
    cluster_id INTEGER NOT NULL,
    n_occurrences INTEGER NOT NULL,
    visualization_path TEXT,
    pattern_data TEXT,
    UNIQUE (timeframe, cluster_id)
);
"#;

const CREATE_PATTERN_INSTANCES_TABLE: &str = r#"
CREATE TABLE pattern_instances (
    instance_id INTEGER PRIMARY KEY AUTOINCREMENT,
    pattern_id INTEGER NOT NULL REFERENCES patterns(pattern_id) ON DELETE CASCADE,
    symbol TEXT NOT NULL,
    timeframe TEXT NOT NULL,
    start_timestamp TEXT NOT NULL,
    end_timestamp TEXT NOT NULL,
    match_score REAL NOT NULL,
    window_data TEXT NOT NULL
);
CREATE INDEX idx_pattern_instances_pattern ON pattern_instances(pattern_id);
"#;

const CREATE_PATTERN_ANALYSES_TABLE: &str = r#"
CREATE TABLE pattern_analyses (
    analysis_id INTEGER PRIMARY KEY AUTOINCREMENT,
    timeframe TEXT NOT NULL UNIQUE,
    analysis_date TEXT,
    lookahead_periods INTEGER,
    significance_threshold REAL,
    min_occurrences INTEGER,
    analysis_data TEXT NOT NULL
);
CREATE TABLE pattern_performance (
    performance_id INTEGER PRIMARY KEY AUTOINCREMENT,
    pattern_id INTEGER NOT NULL REFERENCES patterns(pattern_id) ON DELETE CASCADE,
    timeframe TEXT NOT NULL,
    lookahead_periods INTEGER,
    returns TEXT NOT NULL,
    significance TEXT,
    UNIQUE (pattern_id, lookahead_periods)
);
"#;

const CREATE_VISUALIZATIONS_TABLE: &str = r#"
CREATE TABLE visualizations (
    visualization_id INTEGER PRIMARY KEY AUTOINCREMENT,
    related_entity_type TEXT NOT NULL,
    related_entity_id TEXT,
    visualization_type TEXT NOT NULL,
    file_path TEXT NOT NULL UNIQUE,
    metadata TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

const CREATE_PROCESSED_TIME_INDEX: &str = r#"
CREATE INDEX idx_processed_data_series_time
    ON processed_data (symbol, timeframe, timestamp DESC);
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();
        let applied = applied_migrations(&conn).unwrap();
        assert_eq!(applied.len(), 7);
        assert_eq!(applied[0], "001_processed_data");
    }

    #[test]
    fn sqlite_has_no_timeseries_extension() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(!timeseries_extension_available(&conn));
    }
}
