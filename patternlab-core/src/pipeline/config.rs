//! Serializable pipeline configuration.

use serde::{Deserialize, Serialize};

/// What to do with cells still missing after linear interpolation
/// (leading and trailing gaps).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MissingValuePolicy {
    /// Replace with 0.0.
    #[default]
    ZeroFill,
    /// Drop the affected rows.
    DropRows,
}

/// Whether each run refits the min-max scaler or reuses a stored one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScalerPolicy {
    #[default]
    Refit,
    /// Reuse the registered state for the timeframe; refit when none exists.
    ReuseStored,
}

/// Where normalized values go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NormalizeMode {
    /// Overwrite the source columns.
    #[default]
    InPlace,
    /// Keep source columns and add `norm_<col>` counterparts.
    Counterpart,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorConfig {
    /// Windows for `sma_w`, `volatility_w` and `range_w`.
    pub ma_windows: Vec<usize>,
    pub rsi_period: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub atr_period: usize,
    /// Extra `ema_w` columns. Empty by default.
    pub ema_windows: Vec<usize>,
    /// Adds `bollinger_upper/middle/lower`.
    pub bollinger: bool,
    pub bollinger_period: usize,
    pub bollinger_k: f64,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            ma_windows: vec![5, 10, 20],
            rsi_period: 14,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            atr_period: 14,
            ema_windows: Vec::new(),
            bollinger: false,
            bollinger_period: 20,
            bollinger_k: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub missing_values: MissingValuePolicy,
    pub scaler: ScalerPolicy,
    pub normalize_mode: NormalizeMode,
    pub indicators: IndicatorConfig,
    pub window_size: usize,
    /// Columns sliced into pattern windows.
    pub pattern_columns: Vec<String>,
    /// Explicit normalization columns. `None` selects by name rules.
    pub normalize_columns: Option<Vec<String>>,
}

pub const DEFAULT_PATTERN_COLUMNS: [&str; 9] = [
    "open",
    "high",
    "low",
    "close",
    "body_size",
    "body_ratio",
    "direction",
    "upper_shadow_ratio",
    "lower_shadow_ratio",
];

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            missing_values: MissingValuePolicy::default(),
            scaler: ScalerPolicy::default(),
            normalize_mode: NormalizeMode::default(),
            indicators: IndicatorConfig::default(),
            window_size: 5,
            pattern_columns: DEFAULT_PATTERN_COLUMNS.iter().map(|s| s.to_string()).collect(),
            normalize_columns: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.window_size, 5);
        assert_eq!(cfg.missing_values, MissingValuePolicy::ZeroFill);
        assert_eq!(cfg.scaler, ScalerPolicy::Refit);
        assert_eq!(cfg.indicators.ma_windows, vec![5, 10, 20]);
        assert!(!cfg.indicators.bollinger);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg: PipelineConfig =
            serde_json::from_str(r#"{"window_size": 8, "missing_values": "DROP_ROWS"}"#).unwrap();
        assert_eq!(cfg.window_size, 8);
        assert_eq!(cfg.missing_values, MissingValuePolicy::DropRows);
        assert_eq!(cfg.indicators.rsi_period, 14);
        assert_eq!(cfg.pattern_columns.len(), 9);
    }

    #[test]
    fn serde_roundtrip() {
        let mut cfg = PipelineConfig::default();
        cfg.indicators.bollinger = true;
        cfg.normalize_mode = NormalizeMode::Counterpart;
        let json = serde_json::to_string(&cfg).unwrap();
        let back: PipelineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg, back);
    }
}
