//! Raw table → typed, ordered, gap-annotated `BarFrame`.
//!
//! Steps, in order: parse timestamps, fill missing values (linear
//! interpolation by position, then the configured policy for leading and
//! trailing gaps), drop duplicate timestamps keeping the first, drop rows
//! with non-numeric cells, sort ascending. Everything after timestamp
//! parsing runs as polars frame operations.

use super::config::MissingValuePolicy;
use super::timestamp::parse_column;
use crate::data::loader::TIMESTAMP_COL;
use crate::data::RawTable;
use crate::domain::frame::{CLOSE, HIGH, LOW, OPEN, VOLUME};
use crate::domain::{BarFrame, Timeframe};
use crate::error::PipelineError;
use chrono::{DateTime, NaiveDateTime};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

const FIELDS: [&str; 5] = [OPEN, HIGH, LOW, CLOSE, VOLUME];

/// Sort/dedupe key: timestamp as epoch microseconds.
const KEY: &str = "ts_key";

/// A hole in the bar sequence larger than the timeframe's nominal interval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GapEvent {
    pub gap_start: NaiveDateTime,
    pub gap_end: NaiveDateTime,
    pub bars_missing: i64,
}

/// What the cleaner did to a table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleaningReport {
    pub input_rows: usize,
    pub output_rows: usize,
    pub missing_cells: usize,
    pub interpolated: usize,
    pub zero_filled: usize,
    pub dropped_missing: usize,
    pub duplicates_removed: usize,
    pub invalid_rows_dropped: usize,
    pub gaps: Vec<GapEvent>,
}

#[derive(Debug, Clone, Default)]
pub struct DataCleaner {
    policy: MissingValuePolicy,
}

impl DataCleaner {
    pub fn new(policy: MissingValuePolicy) -> Self {
        Self { policy }
    }

    pub fn clean(&self, raw: &RawTable) -> Result<(BarFrame, CleaningReport), PipelineError> {
        let mut report = CleaningReport {
            input_rows: raw.len(),
            ..Default::default()
        };
        if raw.is_empty() {
            return Err(PipelineError::validation(format!(
                "no rows for timeframe {}",
                raw.timeframe
            )));
        }

        let ts_cells: Vec<&str> = raw
            .frame
            .column(TIMESTAMP_COL)?
            .str()?
            .into_iter()
            .map(|v| v.unwrap_or(""))
            .collect();
        let keys: Vec<i64> = parse_column(&ts_cells)?
            .iter()
            .map(|ts| ts.and_utc().timestamp_micros())
            .collect();

        let mut typed = raw.frame.clone();
        typed.with_column(Column::new(KEY.into(), keys))?;

        // Missing values.
        let filled = typed
            .lazy()
            .select(typed_columns(raw.has_volume))
            .with_columns(
                FIELDS
                    .iter()
                    .map(|f| col(*f).interpolate(InterpolationMethod::Linear))
                    .collect::<Vec<_>>(),
            )
            .collect()?;

        let mut unfilled = 0;
        for f in FIELDS {
            let missing = filled.column(&missing_flag(f))?.bool()?;
            let values = filled.column(f)?.f64()?;
            for (m, v) in missing.into_iter().zip(values.into_iter()) {
                if m != Some(true) {
                    continue;
                }
                report.missing_cells += 1;
                match v {
                    Some(_) => report.interpolated += 1,
                    None => unfilled += 1,
                }
            }
        }

        let filled = match self.policy {
            MissingValuePolicy::ZeroFill => {
                report.zero_filled = unfilled;
                filled
                    .lazy()
                    .with_columns(
                        FIELDS
                            .iter()
                            .map(|f| col(*f).fill_null(lit(0.0)))
                            .collect::<Vec<_>>(),
                    )
                    .collect()?
            }
            MissingValuePolicy::DropRows => {
                let unfilled_row = any_horizontal(
                    FIELDS
                        .iter()
                        .map(|f| col(missing_flag(f)).and(col(*f).is_null()))
                        .collect::<Vec<_>>(),
                )?;
                let kept = filled.lazy().filter(unfilled_row.not()).collect()?;
                report.dropped_missing = raw.len() - kept.height();
                kept
            }
        };

        // Duplicates, first occurrence wins.
        let before = filled.height();
        let unique = filled
            .lazy()
            .unique_stable(Some(vec![KEY.into()]), UniqueKeepStrategy::First)
            .collect()?;
        report.duplicates_removed = before - unique.height();

        // Non-numeric cells.
        let before = unique.height();
        let invalid_row = any_horizontal(
            FIELDS
                .iter()
                .map(|f| col(invalid_flag(f)))
                .collect::<Vec<_>>(),
        )?;
        let valid = unique
            .lazy()
            .filter(invalid_row.not())
            .sort(
                [KEY],
                SortMultipleOptions::default().with_maintain_order(true),
            )
            .collect()?;
        report.invalid_rows_dropped = before - valid.height();

        if valid.height() == 0 {
            return Err(PipelineError::validation(format!(
                "no valid rows left after cleaning timeframe {}",
                raw.timeframe
            )));
        }

        let frame = to_bar_frame(&valid, &raw.timeframe)?;

        report.output_rows = frame.len();
        report.gaps = detect_gaps(frame.timestamps(), &raw.timeframe);
        if !report.gaps.is_empty() {
            warn!(
                timeframe = %raw.timeframe,
                gaps = report.gaps.len(),
                "gaps detected in bar sequence"
            );
        }
        info!(
            timeframe = %raw.timeframe,
            input = report.input_rows,
            output = report.output_rows,
            interpolated = report.interpolated,
            zero_filled = report.zero_filled,
            duplicates = report.duplicates_removed,
            invalid = report.invalid_rows_dropped,
            "cleaned raw bars"
        );

        Ok((frame, report))
    }
}

fn missing_flag(field: &str) -> String {
    format!("{field}_missing")
}

fn invalid_flag(field: &str) -> String {
    format!("{field}_invalid")
}

/// Null, blank, `nan` or `null` in any case.
fn is_missing(text: Expr) -> Expr {
    let lower = text.clone().str().to_lowercase();
    text.is_null()
        .or(lower.clone().eq(lit("")))
        .or(lower.clone().eq(lit("nan")))
        .or(lower.eq(lit("null")))
}

/// Key, each field as nullable `f64`, and per-field missing/invalid flags.
/// A cell is invalid when it is present but not a finite number.
fn typed_columns(has_volume: bool) -> Vec<Expr> {
    let mut exprs = vec![col(KEY)];
    for f in FIELDS {
        if f == VOLUME && !has_volume {
            exprs.push(lit(0.0).alias(f));
            exprs.push(lit(false).alias(missing_flag(f)));
            exprs.push(lit(false).alias(invalid_flag(f)));
            continue;
        }
        let parsed = col(f).cast(DataType::Float64);
        let value = when(parsed.clone().is_finite())
            .then(parsed)
            .otherwise(lit(NULL));
        exprs.push(value.clone().alias(f));
        exprs.push(is_missing(col(f)).alias(missing_flag(f)));
        exprs.push(
            is_missing(col(f))
                .not()
                .and(value.is_null())
                .alias(invalid_flag(f)),
        );
    }
    exprs
}

fn to_bar_frame(df: &DataFrame, timeframe: &Timeframe) -> Result<BarFrame, PipelineError> {
    let timestamps = df
        .column(KEY)?
        .i64()?
        .into_iter()
        .map(|k| {
            k.and_then(DateTime::from_timestamp_micros)
                .map(|dt| dt.naive_utc())
                .ok_or_else(|| PipelineError::validation("timestamp out of range"))
        })
        .collect::<Result<Vec<NaiveDateTime>, _>>()?;

    let mut frame = BarFrame::new(timeframe.clone(), timestamps);
    for f in FIELDS {
        let values = df
            .column(f)?
            .f64()?
            .into_iter()
            .map(|v| v.unwrap_or(f64::NAN))
            .collect();
        frame.set_column(f, values)?;
    }
    Ok(frame)
}

fn detect_gaps(timestamps: &[NaiveDateTime], timeframe: &Timeframe) -> Vec<GapEvent> {
    let Some(interval) = timeframe.nominal_interval() else {
        return Vec::new();
    };
    let step = interval.num_seconds();
    if step <= 0 {
        return Vec::new();
    }
    timestamps
        .windows(2)
        .filter_map(|w| {
            let delta = (w[1] - w[0]).num_seconds();
            (delta > step).then(|| GapEvent {
                gap_start: w[0],
                gap_end: w[1],
                bars_missing: delta / step - 1,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::RawBar;
    use crate::indicators::{assert_approx, DEFAULT_EPSILON};

    fn bar(ts: &str, o: &str, h: &str, l: &str, c: &str, v: &str) -> RawBar {
        RawBar {
            timestamp: ts.into(),
            open: o.into(),
            high: h.into(),
            low: l.into(),
            close: c.into(),
            volume: v.into(),
        }
    }

    fn table(bars: Vec<RawBar>) -> RawTable {
        RawTable::from_bars("1h".parse().unwrap(), &bars, true).unwrap()
    }

    #[test]
    fn sorts_and_dedupes_keeping_first() {
        let raw = table(vec![
            bar("2024.01.01 02:00", "3", "3", "3", "3", "1"),
            bar("2024.01.01 00:00", "1", "1", "1", "1", "1"),
            bar("2024.01.01 01:00", "2", "2", "2", "2", "1"),
            bar("2024.01.01 00:00", "9", "9", "9", "9", "1"),
        ]);
        let (frame, report) = DataCleaner::default().clean(&raw).unwrap();
        assert_eq!(frame.len(), 3);
        assert_eq!(frame.column(CLOSE).unwrap(), &[1.0, 2.0, 3.0]);
        assert_eq!(report.duplicates_removed, 1);
        assert!(frame.timestamps().windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn interpolates_internal_and_zero_fills_edges() {
        let raw = table(vec![
            bar("2024.01.01 00:00", "", "1", "1", "1", "1"),
            bar("2024.01.01 01:00", "2", "1", "1", "1", "1"),
            bar("2024.01.01 02:00", "", "1", "1", "1", "1"),
            bar("2024.01.01 03:00", "", "1", "1", "1", "1"),
            bar("2024.01.01 04:00", "8", "1", "1", "1", ""),
        ]);
        let (frame, report) = DataCleaner::default().clean(&raw).unwrap();
        let open = frame.column(OPEN).unwrap();
        assert_approx(open[0], 0.0, DEFAULT_EPSILON);
        assert_approx(open[2], 4.0, DEFAULT_EPSILON);
        assert_approx(open[3], 6.0, DEFAULT_EPSILON);
        assert_approx(frame.column(VOLUME).unwrap()[4], 0.0, DEFAULT_EPSILON);
        assert_eq!(report.interpolated, 2);
        assert_eq!(report.zero_filled, 2);
        assert_eq!(report.missing_cells, 4);
    }

    #[test]
    fn nan_tokens_are_missing_and_infinities_invalid() {
        let raw = table(vec![
            bar("2024.01.01 00:00", "1", "1", "1", "1", "1"),
            bar("2024.01.01 01:00", "NaN", "1", "1", "1", "null"),
            bar("2024.01.01 02:00", "3", "1", "1", "1", "1"),
            bar("2024.01.01 03:00", "4", "inf", "1", "1", "1"),
        ]);
        let (frame, report) = DataCleaner::default().clean(&raw).unwrap();
        assert_eq!(frame.len(), 3);
        assert_approx(frame.column(OPEN).unwrap()[1], 2.0, DEFAULT_EPSILON);
        assert_approx(frame.column(VOLUME).unwrap()[1], 1.0, DEFAULT_EPSILON);
        assert_eq!(report.missing_cells, 2);
        assert_eq!(report.interpolated, 2);
        assert_eq!(report.invalid_rows_dropped, 1);
    }

    #[test]
    fn missing_volume_column_is_zero() {
        let bars = vec![
            bar("2024.01.01 00:00", "1", "2", "0.5", "1.5", ""),
            bar("2024.01.01 01:00", "2", "3", "1.5", "2.5", ""),
        ];
        let raw = RawTable::from_bars("1h".parse().unwrap(), &bars, false).unwrap();
        let (frame, report) = DataCleaner::default().clean(&raw).unwrap();
        assert_eq!(frame.column(VOLUME).unwrap(), &[0.0, 0.0]);
        assert_eq!(report.missing_cells, 0);
    }

    #[test]
    fn drop_rows_policy() {
        let raw = table(vec![
            bar("2024.01.01 00:00", "", "1", "1", "1", "1"),
            bar("2024.01.01 01:00", "2", "1", "1", "1", "1"),
            bar("2024.01.01 02:00", "3", "1", "1", "1", "1"),
        ]);
        let (frame, report) = DataCleaner::new(MissingValuePolicy::DropRows)
            .clean(&raw)
            .unwrap();
        assert_eq!(frame.len(), 2);
        assert_eq!(report.dropped_missing, 1);
    }

    #[test]
    fn non_numeric_rows_dropped() {
        let raw = table(vec![
            bar("2024.01.01 00:00", "1", "1", "1", "1", "1"),
            bar("2024.01.01 01:00", "abc", "1", "1", "1", "1"),
            bar("2024.01.01 02:00", "3", "1", "1", "1", "1"),
        ]);
        let (frame, report) = DataCleaner::default().clean(&raw).unwrap();
        assert_eq!(frame.len(), 2);
        assert_eq!(report.invalid_rows_dropped, 1);
    }

    #[test]
    fn unparseable_timestamp_is_parse_error() {
        let raw = table(vec![
            bar("2024.01.01 00:00", "1", "1", "1", "1", "1"),
            bar("yesterday", "1", "1", "1", "1", "1"),
        ]);
        assert!(matches!(
            DataCleaner::default().clean(&raw),
            Err(PipelineError::Parse { .. })
        ));
    }

    #[test]
    fn all_invalid_is_validation_error() {
        let raw = table(vec![bar("2024.01.01 00:00", "x", "1", "1", "1", "1")]);
        assert!(matches!(
            DataCleaner::default().clean(&raw),
            Err(PipelineError::Validation(_))
        ));
        assert!(matches!(
            DataCleaner::default().clean(&table(Vec::new())),
            Err(PipelineError::Validation(_))
        ));
    }

    #[test]
    fn reports_gaps() {
        let raw = table(vec![
            bar("2024.01.01 00:00", "1", "1", "1", "1", "1"),
            bar("2024.01.01 01:00", "1", "1", "1", "1", "1"),
            bar("2024.01.01 04:00", "1", "1", "1", "1", "1"),
        ]);
        let (_, report) = DataCleaner::default().clean(&raw).unwrap();
        assert_eq!(report.gaps.len(), 1);
        assert_eq!(report.gaps[0].bars_missing, 2);
    }
}
