//! Load → clean → engineer → normalize, per timeframe.

pub mod clean;
pub mod config;
pub mod features;
pub mod normalize;
pub mod timestamp;
pub mod windows;

pub use clean::{CleaningReport, DataCleaner, GapEvent};
pub use config::{IndicatorConfig, MissingValuePolicy, NormalizeMode, PipelineConfig, ScalerPolicy};
pub use features::FeatureEngineer;
pub use normalize::{designated_columns, ColumnBounds, Normalizer, ScalerRegistry, ScalerState};
pub use windows::{extract_windows, WindowExtractor};

use crate::data::{RawDataLoader, RawTable};
use crate::domain::{BarFrame, PatternWindow, Timeframe};
use crate::error::PipelineError;
use tracing::{error, info};

/// Everything one timeframe's run produced.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub timeframe: Timeframe,
    /// Feature frame after normalization.
    pub frame: BarFrame,
    pub scaler: ScalerState,
    pub report: CleaningReport,
    pub warmup_rows_dropped: usize,
}

impl PipelineRun {
    pub fn windows(
        &self,
        columns: &[String],
        window_size: usize,
    ) -> Result<Vec<PatternWindow>, PipelineError> {
        extract_windows(&self.frame, columns, window_size)
    }
}

/// Owns the pipeline configuration and the scaler states from earlier runs.
pub struct Pipeline {
    config: PipelineConfig,
    loader: RawDataLoader,
    cleaner: DataCleaner,
    engineer: FeatureEngineer,
    normalizer: Normalizer,
    scalers: ScalerRegistry,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, loader: RawDataLoader) -> Self {
        Self {
            cleaner: DataCleaner::new(config.missing_values),
            engineer: FeatureEngineer::new(config.indicators.clone()),
            normalizer: Normalizer::new(config.normalize_mode),
            scalers: ScalerRegistry::default(),
            config,
            loader,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn loader(&self) -> &RawDataLoader {
        &self.loader
    }

    pub fn scalers(&self) -> &ScalerRegistry {
        &self.scalers
    }

    pub fn scalers_mut(&mut self) -> &mut ScalerRegistry {
        &mut self.scalers
    }

    /// Run one timeframe, or every available one. A failing timeframe does
    /// not stop the others; its error is returned in its slot.
    pub fn run(
        &mut self,
        timeframe: Option<&Timeframe>,
    ) -> Result<Vec<(Timeframe, Result<PipelineRun, PipelineError>)>, PipelineError> {
        let tables = self.loader.load(timeframe)?;
        let mut results = Vec::with_capacity(tables.len());
        for (tf, table) in tables {
            let outcome = self.process(&table);
            if let Err(e) = &outcome {
                error!(timeframe = %tf, error = %e, "pipeline run failed");
            }
            results.push((tf, outcome));
        }
        Ok(results)
    }

    /// Clean, engineer and normalize one raw table.
    pub fn process(&mut self, raw: &RawTable) -> Result<PipelineRun, PipelineError> {
        let (cleaned, report) = self.cleaner.clean(raw)?;
        let features = self.engineer.engineer(&cleaned)?;
        let warmup_rows_dropped = cleaned.len() - features.len();

        let explicit = self.config.normalize_columns.as_deref();
        let stored = match self.config.scaler {
            ScalerPolicy::ReuseStored => self.scalers.get(&raw.timeframe).cloned(),
            ScalerPolicy::Refit => None,
        };
        let (frame, scaler) = match stored {
            Some(state) => (state.apply(&features)?, state),
            None => self.normalizer.normalize(&features, explicit)?,
        };
        self.scalers.insert(scaler.clone());

        info!(
            timeframe = %raw.timeframe,
            rows = frame.len(),
            warmup_dropped = warmup_rows_dropped,
            columns = frame.columns().len(),
            "pipeline run complete"
        );

        Ok(PipelineRun {
            timeframe: raw.timeframe.clone(),
            frame,
            scaler,
            report,
            warmup_rows_dropped,
        })
    }
}
