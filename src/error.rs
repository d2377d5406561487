//! Error types for Session Lens

use thiserror::Error;

/// Errors that can occur while preparing or running an analysis
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Failed to parse session input: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid pattern '{name}': {source}")]
    InvalidPattern {
        name: String,
        #[source]
        source: regex::Error,
    },

    #[error("Insufficient events for computation: {0}")]
    InsufficientEvents(String),

    #[error("Detector '{detector}' failed: {reason}")]
    DetectorFailed { detector: String, reason: String },
}
