//! Property tests over the storage backends.

use chrono::{Duration, NaiveDate};
use patternlab_core::BarFrame;
use patternlab_store::{BarStore, FileStore, SeriesKey, SqliteDb, SqliteStore};
use proptest::prelude::*;
use std::sync::Arc;

fn frame(closes: &[f64]) -> BarFrame {
    frame_from(0, closes)
}

/// Bars every 15 minutes, the first `start` steps after 2023-06-01.
fn frame_from(start: usize, closes: &[f64]) -> BarFrame {
    let base = NaiveDate::from_ymd_opt(2023, 6, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    let ts = (start..start + closes.len())
        .map(|i| base + Duration::minutes(15 * i as i64))
        .collect();
    let mut f = BarFrame::new("15m".parse().unwrap(), ts);
    f.set_column("close", closes.to_vec()).unwrap();
    f
}

fn check_latest(store: &dyn BarStore, closes: &[f64], limit: usize) {
    let key = SeriesKey::new("XAU", "15m".parse().unwrap());
    store.save(&key, &frame(closes)).unwrap();

    let got = store.get(&key, limit).unwrap().unwrap();
    let expected = if limit == 0 { closes.len() } else { limit.min(closes.len()) };
    assert_eq!(got.len(), expected);
    assert!(got.timestamps().windows(2).all(|w| w[0] < w[1]));
    assert_eq!(got.column("close").unwrap(), &closes[closes.len() - expected..]);
}

/// The second save fully replaces the first.
fn check_overwrite(store: &dyn BarStore, first: (usize, &[f64]), second: (usize, &[f64])) {
    let key = SeriesKey::new("XAU", "15m".parse().unwrap());
    store.save(&key, &frame_from(first.0, first.1)).unwrap();
    store.save(&key, &frame_from(second.0, second.1)).unwrap();

    let expected = frame_from(second.0, second.1);
    let got = store.get(&key, 0).unwrap().unwrap();
    assert_eq!(got.timestamps(), expected.timestamps());
    assert_eq!(got.column("close").unwrap(), second.1);
}

fn quarters(raw: &[i32]) -> Vec<f64> {
    raw.iter().map(|c| *c as f64 / 4.0).collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn sqlite_get_returns_latest_rows(
        closes in prop::collection::vec(1.0f64..5000.0, 1..300),
        limit in 0usize..400,
    ) {
        let db = Arc::new(SqliteDb::open_in_memory().unwrap());
        check_latest(&SqliteStore::new(db), &closes, limit);
    }

    #[test]
    fn file_get_returns_latest_rows(
        closes in prop::collection::vec(-100i32..100_000, 1..300),
        limit in 0usize..400,
    ) {
        // Quarter steps are exact in both decimal and binary.
        let closes = quarters(&closes);
        let dir = tempfile::tempdir().unwrap();
        check_latest(&FileStore::new(dir.path()), &closes, limit);
    }

    #[test]
    fn sqlite_second_save_replaces_first(
        first in prop::collection::vec(-100i32..100_000, 1..200),
        second in prop::collection::vec(-100i32..100_000, 1..200),
        first_start in 0usize..300,
        second_start in 0usize..300,
    ) {
        let db = Arc::new(SqliteDb::open_in_memory().unwrap());
        let (a, b) = (quarters(&first), quarters(&second));
        check_overwrite(&SqliteStore::new(db), (first_start, &a), (second_start, &b));
    }

    #[test]
    fn file_second_save_replaces_first(
        first in prop::collection::vec(-100i32..100_000, 1..200),
        second in prop::collection::vec(-100i32..100_000, 1..200),
        first_start in 0usize..300,
        second_start in 0usize..300,
    ) {
        let dir = tempfile::tempdir().unwrap();
        let (a, b) = (quarters(&first), quarters(&second));
        check_overwrite(&FileStore::new(dir.path()), (first_start, &a), (second_start, &b));
    }
}
