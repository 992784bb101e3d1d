use thiserror::Error;

/// Errors raised by the loading/cleaning/feature stages.
///
/// Any of these aborts the run for the affected timeframe; nothing partial is
/// handed downstream.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("unparseable timestamp '{value}'")]
    Parse { value: String },

    #[error("validation error: {0}")]
    Validation(String),

    #[error("invalid timeframe '{0}'")]
    InvalidTimeframe(String),

    #[error("no raw data file for timeframe '{0}'")]
    MissingSource(String),

    #[error("polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn parse(value: impl Into<String>) -> Self {
        Self::Parse {
            value: value.into(),
        }
    }
}
