//! Error types shared across the pipeline.

use thiserror::Error;

/// Rejected camera source reconfiguration. The previous source stays in place.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid IP camera address {input:?}: enter last two octets like 0.212")]
    NetworkOctets { input: String },
}

/// Malformed landmark input handed to a classifier.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClassifyError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Source could not be opened, or stopped delivering frames.
    #[error("camera source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("capture loop panicked on {0}")]
    LoopPanicked(String),
}
