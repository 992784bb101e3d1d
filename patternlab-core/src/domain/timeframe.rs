//! Bar timeframe labels (`15m`, `1h`, `4h`, `1d`, `1w`, `1M`).

use crate::error::PipelineError;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TimeUnit {
    Minute,
    Hour,
    Day,
    Week,
    Month,
}

impl TimeUnit {
    fn from_suffix(c: char) -> Option<Self> {
        match c {
            'm' => Some(Self::Minute),
            'h' | 'H' => Some(Self::Hour),
            'd' | 'D' => Some(Self::Day),
            'w' | 'W' => Some(Self::Week),
            'M' => Some(Self::Month),
            _ => None,
        }
    }

    fn suffix(self) -> char {
        match self {
            Self::Minute => 'm',
            Self::Hour => 'h',
            Self::Day => 'd',
            Self::Week => 'w',
            Self::Month => 'M',
        }
    }
}

/// A validated timeframe label.
///
/// Ordering is by unit, then amount, so `15m < 1h < 4h < 1d < 1w`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Timeframe {
    unit: TimeUnit,
    amount: u32,
}

impl Timeframe {
    pub fn new(amount: u32, unit: TimeUnit) -> Result<Self, PipelineError> {
        if amount == 0 {
            return Err(PipelineError::InvalidTimeframe(format!(
                "0{}",
                unit.suffix()
            )));
        }
        Ok(Self { unit, amount })
    }

    pub fn amount(&self) -> u32 {
        self.amount
    }

    pub fn unit(&self) -> TimeUnit {
        self.unit
    }

    /// Nominal spacing between consecutive bars. Months have no fixed length.
    pub fn nominal_interval(&self) -> Option<Duration> {
        let n = i64::from(self.amount);
        match self.unit {
            TimeUnit::Minute => Some(Duration::minutes(n)),
            TimeUnit::Hour => Some(Duration::hours(n)),
            TimeUnit::Day => Some(Duration::days(n)),
            TimeUnit::Week => Some(Duration::weeks(n)),
            TimeUnit::Month => None,
        }
    }

    pub fn label(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.unit.suffix())
    }
}

impl FromStr for Timeframe {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || PipelineError::InvalidTimeframe(s.to_string());
        let suffix = s.chars().last().ok_or_else(invalid)?;
        let unit = TimeUnit::from_suffix(suffix).ok_or_else(invalid)?;
        let digits = &s[..s.len() - suffix.len_utf8()];
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        let amount: u32 = digits.parse().map_err(|_| invalid())?;
        Self::new(amount, unit).map_err(|_| invalid())
    }
}

impl TryFrom<String> for Timeframe {
    type Error = PipelineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Timeframe> for String {
    fn from(tf: Timeframe) -> Self {
        tf.to_string()
    }
}
