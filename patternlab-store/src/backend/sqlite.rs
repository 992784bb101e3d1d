//! SQLite relational backend.
//!
//! `processed_data` is keyed by (timestamp, symbol, timeframe). A save
//! replaces the whole series: existing rows for the key are deleted and the
//! new rows inserted in fixed-size chunks, all in one transaction. Any
//! failure drops the transaction, which rolls it back.

use super::{BackendKind, BarStore, SeriesKey};
use crate::error::StoreError;
use crate::migration::schema;
use crate::record::{frame_from_records, records_from_frame, ProcessedRecord, NAMED_COLUMNS, NAMED_COUNT};
use crate::settings::SettingsStore;
use parking_lot::Mutex;
use patternlab_core::pipeline::timestamp::parse_any;
use patternlab_core::BarFrame;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Rows per insert chunk.
pub const CHUNK_SIZE: usize = 1000;

/// SQLite connection shared by the relational store, settings and migrations.
pub struct SqliteDb {
    conn: Mutex<Connection>,
}

impl SqliteDb {
    pub fn open(path: &Path, busy_timeout: Duration) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        conn.busy_timeout(busy_timeout)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.run_migrations()?;
        Ok(db)
    }

    pub fn run_migrations(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        schema::run_migrations(&conn)
    }

    /// Run `f` with exclusive access to the connection.
    pub fn with_conn<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut conn = self.conn.lock();
        f(&mut conn)
    }
}

impl SettingsStore for SqliteDb {
    fn read_setting(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
        let conn = self.conn.lock();
        let raw: Option<String> = conn
            .query_row(
                "SELECT setting_value FROM system_settings WHERE setting_key = ?1",
                [key],
                |row| row.get(0),
            )
            .optional()?;
        match raw {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    fn write_setting(
        &self,
        key: &str,
        value: &serde_json::Value,
        description: &str,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO system_settings (setting_key, setting_value, description, updated_at)
             VALUES (?1, ?2, ?3, datetime('now'))
             ON CONFLICT(setting_key) DO UPDATE SET
                setting_value = excluded.setting_value,
                description = excluded.description,
                updated_at = excluded.updated_at",
            params![key, serde_json::to_string(value)?, description],
        )?;
        Ok(())
    }

    fn setting_count(&self) -> Result<usize, StoreError> {
        let conn = self.conn.lock();
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM system_settings", [], |row| row.get(0))?;
        Ok(n as usize)
    }
}

fn insert_sql() -> String {
    let cols: Vec<&str> = ["timestamp", "symbol", "timeframe"]
        .into_iter()
        .chain(NAMED_COLUMNS)
        .chain(["feature_data"])
        .collect();
    let placeholders: Vec<String> = (1..=cols.len()).map(|i| format!("?{i}")).collect();
    format!(
        "INSERT OR REPLACE INTO processed_data ({}) VALUES ({})",
        cols.join(", "),
        placeholders.join(", ")
    )
}

fn select_sql(limited: bool) -> String {
    let mut sql = format!(
        "SELECT timestamp, {}, feature_data FROM processed_data
         WHERE symbol = ?1 AND timeframe = ?2
         ORDER BY timestamp DESC",
        NAMED_COLUMNS.join(", ")
    );
    if limited {
        sql.push_str(" LIMIT ?3");
    }
    sql
}

fn record_values(r: &ProcessedRecord) -> Result<Vec<Value>, StoreError> {
    let mut values = Vec::with_capacity(NAMED_COUNT + 4);
    values.push(Value::Text(r.timestamp_text()));
    values.push(Value::Text(r.symbol.clone()));
    values.push(Value::Text(r.timeframe.clone()));
    values.extend(r.named.iter().map(|v| match v {
        Some(x) => Value::Real(*x),
        None => Value::Null,
    }));
    values.push(Value::Text(r.feature_json()?));
    Ok(values)
}

type StoredRow = (String, [Option<f64>; NAMED_COUNT], Option<String>);

/// Relational [`BarStore`] over a shared [`SqliteDb`].
pub struct SqliteStore {
    db: Arc<SqliteDb>,
}

impl SqliteStore {
    pub fn new(db: Arc<SqliteDb>) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &Arc<SqliteDb> {
        &self.db
    }

    pub fn row_count(&self, key: &SeriesKey) -> Result<usize, StoreError> {
        self.db.with_conn(|conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM processed_data WHERE symbol = ?1 AND timeframe = ?2",
                params![key.symbol, key.timeframe.to_string()],
                |row| row.get(0),
            )?;
            Ok(n as usize)
        })
    }
}

impl BarStore for SqliteStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Database
    }

    fn save(&self, key: &SeriesKey, frame: &BarFrame) -> Result<usize, StoreError> {
        let records = records_from_frame(key, frame);
        let sql = insert_sql();
        self.db.with_conn(|conn| {
            let tx = conn.transaction()?;
            let replaced = tx.execute(
                "DELETE FROM processed_data WHERE symbol = ?1 AND timeframe = ?2",
                params![key.symbol, key.timeframe.to_string()],
            )?;
            debug!(series = %key, rows = replaced, "cleared previous rows");
            {
                let mut stmt = tx.prepare(&sql)?;
                for (n, chunk) in records.chunks(CHUNK_SIZE).enumerate() {
                    for record in chunk {
                        stmt.execute(params_from_iter(record_values(record)?))?;
                    }
                    debug!(series = %key, chunk = n + 1, rows = chunk.len(), "inserted chunk");
                }
            }
            tx.commit()?;
            Ok(())
        })?;
        info!(series = %key, rows = records.len(), "saved processed data to database");
        Ok(records.len())
    }

    fn get(&self, key: &SeriesKey, limit: usize) -> Result<Option<BarFrame>, StoreError> {
        let tf = key.timeframe.to_string();
        let mut records = self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&select_sql(limit > 0))?;
            let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<StoredRow> {
                let ts: String = row.get(0)?;
                let mut named = [None; NAMED_COUNT];
                for (i, slot) in named.iter_mut().enumerate() {
                    *slot = row.get::<_, Option<f64>>(i + 1)?;
                }
                let features: Option<String> = row.get(NAMED_COUNT + 1)?;
                Ok((ts, named, features))
            };
            let rows = if limit > 0 {
                stmt.query_map(params![key.symbol, tf, limit as i64], map_row)?
                    .collect::<Result<Vec<_>, _>>()?
            } else {
                stmt.query_map(params![key.symbol, tf], map_row)?
                    .collect::<Result<Vec<_>, _>>()?
            };

            rows.into_iter()
                .map(|(ts, named, features)| {
                    let timestamp = parse_any(&ts)
                        .ok_or_else(|| StoreError::storage(format!("bad stored timestamp '{ts}'")))?;
                    let feature_data: BTreeMap<String, Option<f64>> = match features {
                        Some(text) if !text.is_empty() => serde_json::from_str(&text)?,
                        _ => BTreeMap::new(),
                    };
                    Ok(ProcessedRecord {
                        timestamp,
                        symbol: key.symbol.clone(),
                        timeframe: tf.clone(),
                        named,
                        feature_data,
                    })
                })
                .collect::<Result<Vec<_>, StoreError>>()
        })?;

        if records.is_empty() {
            return Ok(None);
        }
        records.reverse();
        Ok(Some(frame_from_records(key.timeframe.clone(), &records)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, NaiveDate};

    fn frame(n: usize, offset: f64) -> BarFrame {
        let base = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let ts = (0..n).map(|i| base + ChronoDuration::hours(i as i64)).collect();
        let mut f = BarFrame::new("1h".parse().unwrap(), ts);
        f.set_column("close", (0..n).map(|i| offset + i as f64).collect())
            .unwrap();
        f.set_column("body_ratio", vec![0.5; n]).unwrap();
        f
    }

    fn store() -> SqliteStore {
        SqliteStore::new(Arc::new(SqliteDb::open_in_memory().unwrap()))
    }

    #[test]
    fn save_then_get_latest_ascending() {
        let s = store();
        let key = SeriesKey::new("XAU", "1h".parse().unwrap());
        assert_eq!(s.save(&key, &frame(2500, 0.0)).unwrap(), 2500);
        assert_eq!(s.row_count(&key).unwrap(), 2500);

        let got = s.get(&key, 3).unwrap().unwrap();
        assert_eq!(got.column("close").unwrap(), &[2497.0, 2498.0, 2499.0]);
        assert_eq!(got.column("body_ratio").unwrap(), &[0.5, 0.5, 0.5]);

        let all = s.get(&key, 0).unwrap().unwrap();
        assert_eq!(all.len(), 2500);
    }

    #[test]
    fn resave_overwrites_rows() {
        let s = store();
        let key = SeriesKey::new("XAU", "1h".parse().unwrap());
        s.save(&key, &frame(10, 0.0)).unwrap();
        s.save(&key, &frame(10, 100.0)).unwrap();
        assert_eq!(s.row_count(&key).unwrap(), 10);
        let got = s.get(&key, 1).unwrap().unwrap();
        assert_eq!(got.column("close").unwrap(), &[109.0]);
    }

    #[test]
    fn resave_drops_rows_missing_from_new_frame() {
        let s = store();
        let key = SeriesKey::new("XAU", "1h".parse().unwrap());
        let other = SeriesKey::new("XAU", "4h".parse().unwrap());
        s.save(&key, &frame(100, 0.0)).unwrap();
        s.save(&other, &frame(7, 0.0)).unwrap();

        let base = frame(40, 500.0);
        let later = base
            .timestamps()
            .iter()
            .map(|t| *t + ChronoDuration::hours(1000))
            .collect();
        let mut shifted = BarFrame::new(base.timeframe().clone(), later);
        shifted
            .set_column("close", base.column("close").unwrap().to_vec())
            .unwrap();
        s.save(&key, &shifted).unwrap();

        assert_eq!(s.row_count(&key).unwrap(), 40);
        assert_eq!(s.row_count(&other).unwrap(), 7);
        let got = s.get(&key, 0).unwrap().unwrap();
        assert_eq!(got.column("close").unwrap()[0], 500.0);
    }

    #[test]
    fn unknown_series_is_none() {
        let s = store();
        let key = SeriesKey::new("XAU", "1d".parse().unwrap());
        assert!(s.get(&key, 10).unwrap().is_none());
    }

    #[test]
    fn failed_write_rolls_back() {
        let s = store();
        let key = SeriesKey::new("XAU", "1h".parse().unwrap());
        s.save(&key, &frame(5, 0.0)).unwrap();
        s.db()
            .with_conn(|conn| {
                conn.execute_batch(
                    "CREATE TRIGGER reject_large BEFORE INSERT ON processed_data
                     WHEN NEW.close > 1500 BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
                )?;
                Ok(())
            })
            .unwrap();
        // the first 501 rows insert, then close 1501 aborts the whole transaction
        assert!(s.save(&key, &frame(2000, 1000.0)).is_err());
        let got = s.get(&key, 0).unwrap().unwrap();
        assert_eq!(got.len(), 5);
        assert_eq!(got.column("close").unwrap()[4], 4.0);
    }

    #[test]
    fn settings_upsert() {
        let db = SqliteDb::open_in_memory().unwrap();
        assert_eq!(db.setting_count().unwrap(), 0);
        db.write_setting("k", &serde_json::json!({"a": 1}), "d").unwrap();
        db.write_setting("k", &serde_json::json!({"a": 2}), "d").unwrap();
        assert_eq!(db.setting_count().unwrap(), 1);
        assert_eq!(db.read_setting("k").unwrap(), Some(serde_json::json!({"a": 2})));
        assert_eq!(db.read_setting("missing").unwrap(), None);
    }
}
