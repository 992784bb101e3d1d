//! Per-timeframe min-max scaling with retained, invertible state.
//!
//! x' = (x - min) / (max - min); a constant column maps to 0.
//! Fitted values lie in [0, 1]. Applying a stored state to new data can
//! fall outside that range.

use super::config::NormalizeMode;
use crate::domain::frame::{CLOSE, HIGH, LOW, OPEN};
use crate::domain::{BarFrame, Timeframe};
use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// Columns always normalized when present.
pub const BASE_COLUMNS: [&str; 7] = [
    OPEN,
    HIGH,
    LOW,
    CLOSE,
    "body_size",
    "upper_shadow",
    "lower_shadow",
];

/// Any column whose name contains one of these is normalized too.
pub const DERIVED_MARKERS: [&str; 6] = ["ma_", "volatility_", "range_", "atr_", "rsi_", "macd"];

pub const NORM_PREFIX: &str = "norm_";

/// Default normalization targets for a frame, in frame column order.
pub fn designated_columns(frame: &BarFrame) -> Vec<String> {
    frame
        .column_names()
        .into_iter()
        .filter(|name| {
            !name.starts_with(NORM_PREFIX)
                && (BASE_COLUMNS.contains(name) || DERIVED_MARKERS.iter().any(|m| name.contains(m)))
        })
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColumnBounds {
    pub min: f64,
    pub max: f64,
}

impl ColumnBounds {
    pub fn scale(&self, x: f64) -> f64 {
        let range = self.max - self.min;
        if range == 0.0 {
            0.0
        } else {
            (x - self.min) / range
        }
    }

    pub fn unscale(&self, y: f64) -> f64 {
        self.min + y * (self.max - self.min)
    }
}

/// Fitted scaler bounds for one timeframe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalerState {
    pub timeframe: Timeframe,
    pub mode: NormalizeMode,
    pub columns: BTreeMap<String, ColumnBounds>,
}

impl ScalerState {
    /// Fit bounds over the non-NaN values of each listed column.
    pub fn fit(
        frame: &BarFrame,
        columns: &[String],
        mode: NormalizeMode,
    ) -> Result<Self, PipelineError> {
        let mut bounds = BTreeMap::new();
        for name in columns {
            let values = frame.require(name)?;
            let (min, max) = values
                .iter()
                .filter(|v| !v.is_nan())
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                    (lo.min(v), hi.max(v))
                });
            if min > max {
                warn!(column = %name, "column has no values to fit, skipping");
                continue;
            }
            bounds.insert(name.clone(), ColumnBounds { min, max });
        }
        Ok(Self {
            timeframe: frame.timeframe().clone(),
            mode,
            columns: bounds,
        })
    }

    fn target_name(&self, column: &str) -> String {
        match self.mode {
            NormalizeMode::InPlace => column.to_string(),
            NormalizeMode::Counterpart => format!("{NORM_PREFIX}{column}"),
        }
    }

    /// Scale a frame with these bounds. Columns absent from the frame are skipped.
    pub fn apply(&self, frame: &BarFrame) -> Result<BarFrame, PipelineError> {
        let mut out = frame.clone();
        for (name, b) in &self.columns {
            let Some(values) = frame.column(name) else {
                warn!(column = %name, "scaler column not in frame");
                continue;
            };
            let scaled = values.iter().map(|&v| b.scale(v)).collect();
            out.set_column(self.target_name(name), scaled)?;
        }
        Ok(out)
    }

    /// Invert [`apply`](Self::apply): scaled values are mapped back to the
    /// original columns.
    pub fn denormalize(&self, frame: &BarFrame) -> Result<BarFrame, PipelineError> {
        let mut out = frame.clone();
        for (name, b) in &self.columns {
            let Some(values) = frame.column(&self.target_name(name)) else {
                continue;
            };
            let restored = values.iter().map(|&v| b.unscale(v)).collect();
            out.set_column(name.clone(), restored)?;
        }
        Ok(out)
    }

    pub fn save(&self, path: &Path) -> Result<(), PipelineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Scaler states kept across runs, one per timeframe.
#[derive(Debug, Clone, Default)]
pub struct ScalerRegistry {
    states: BTreeMap<Timeframe, ScalerState>,
}

impl ScalerRegistry {
    pub fn get(&self, timeframe: &Timeframe) -> Option<&ScalerState> {
        self.states.get(timeframe)
    }

    pub fn insert(&mut self, state: ScalerState) {
        self.states.insert(state.timeframe.clone(), state);
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScalerState> {
        self.states.values()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    mode: NormalizeMode,
}

impl Normalizer {
    pub fn new(mode: NormalizeMode) -> Self {
        Self { mode }
    }

    /// Fit a fresh scaler on `frame` and apply it. `None` selects the
    /// designated columns.
    pub fn normalize(
        &self,
        frame: &BarFrame,
        columns: Option<&[String]>,
    ) -> Result<(BarFrame, ScalerState), PipelineError> {
        let columns = match columns {
            Some(c) => c.to_vec(),
            None => designated_columns(frame),
        };
        let state = ScalerState::fit(frame, &columns, self.mode)?;
        let out = state.apply(frame)?;
        debug!(
            timeframe = %frame.timeframe(),
            columns = state.columns.len(),
            "normalized frame"
        );
        Ok((out, state))
    }
}
