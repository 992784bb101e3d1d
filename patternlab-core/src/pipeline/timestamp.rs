//! Timestamp parsing for raw and legacy files.

use crate::error::PipelineError;
use chrono::{DateTime, NaiveDate, NaiveDateTime};

/// Format used by the raw source files: `2004.06.11 07:00`.
pub const PRIMARY_FORMAT: &str = "%Y.%m.%d %H:%M";

/// Canonical format written to processed files.
pub const OUTPUT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const DATETIME_FORMATS: [&str; 10] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y.%m.%d %H:%M:%S",
    "%Y.%m.%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%d.%m.%Y %H:%M:%S",
    "%d.%m.%Y %H:%M",
];

const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%Y.%m.%d", "%Y/%m/%d", "%d.%m.%Y"];

/// Parse a single value with any known format.
pub fn parse_any(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_utc());
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(dt);
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(value, fmt) {
            return d.and_hms_opt(0, 0, 0);
        }
    }
    None
}

/// Parse a whole column: the primary format first; if any value fails it,
/// the whole column is re-parsed with the generic parser.
pub fn parse_column(values: &[&str]) -> Result<Vec<NaiveDateTime>, PipelineError> {
    let primary: Option<Vec<NaiveDateTime>> = values
        .iter()
        .map(|v| NaiveDateTime::parse_from_str(v.trim(), PRIMARY_FORMAT).ok())
        .collect();
    if let Some(parsed) = primary {
        return Ok(parsed);
    }

    values
        .iter()
        .map(|v| parse_any(v).ok_or_else(|| PipelineError::parse(*v)))
        .collect()
}

pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(OUTPUT_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(y: i32, m: u32, d: u32, h: u32, mi: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, mi, 0)
            .unwrap()
    }

    #[test]
    fn primary_format() {
        let out = parse_column(&["2004.06.11 07:00", "2004.06.11 08:15"]).unwrap();
        assert_eq!(out, vec![dt(2004, 6, 11, 7, 0), dt(2004, 6, 11, 8, 15)]);
    }

    #[test]
    fn falls_back_for_whole_column() {
        let out = parse_column(&["2004.06.11 07:00", "2004-06-11 08:00:00"]).unwrap();
        assert_eq!(out, vec![dt(2004, 6, 11, 7, 0), dt(2004, 6, 11, 8, 0)]);
    }

    #[test]
    fn generic_variants() {
        assert_eq!(parse_any("2024-01-02T03:04:00Z"), Some(dt(2024, 1, 2, 3, 4)));
        assert_eq!(parse_any("2024-01-02"), Some(dt(2024, 1, 2, 0, 0)));
        assert_eq!(parse_any("2024/01/02 03:04"), Some(dt(2024, 1, 2, 3, 4)));
        assert_eq!(parse_any("02.01.2024 03:04"), Some(dt(2024, 1, 2, 3, 4)));
        assert_eq!(parse_any("not a date"), None);
    }

    #[test]
    fn error_names_offending_value() {
        let err = parse_column(&["2004.06.11 07:00", "garbage"]).unwrap_err();
        match err {
            PipelineError::Parse { value } => assert_eq!(value, "garbage"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn format_roundtrip() {
        let ts = dt(2024, 3, 4, 5, 6);
        assert_eq!(parse_any(&format_timestamp(&ts)), Some(ts));
    }
}
