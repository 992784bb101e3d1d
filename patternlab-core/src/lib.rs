//! PatternLab core: turns raw per-timeframe OHLCV files into cleaned,
//! feature-engineered, normalized frames and fixed-length pattern windows.
//!
//! Stage order: `data::RawDataLoader` → `pipeline::DataCleaner` →
//! `pipeline::FeatureEngineer` → `pipeline::Normalizer` →
//! `pipeline::WindowExtractor`. `pipeline::Pipeline` wires them together.

pub mod data;
pub mod domain;
pub mod error;
pub mod indicators;
pub mod pipeline;

pub use domain::{BarFrame, PatternWindow, Timeframe};
pub use error::PipelineError;
