// src/error.rs
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AnalysisError>;

#[derive(Debug, Error)]
pub enum AnalysisError {
    /// No landmark estimator could be resolved at construction time.
    #[error("landmark estimation capability unavailable: {0}")]
    CapabilityUnavailable(String),

    #[error("could not open video: {0}")]
    MediaOpen(String),

    #[error("failed to decode frame {index}: {reason}")]
    FrameDecode { index: usize, reason: String },

    #[error("feature computation fault: {0}")]
    FeatureComputation(String),

    #[error("landmark detector error: {0}")]
    Landmark(String),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("analysis timed out after {0} seconds")]
    Timeout(u64),
}

impl AnalysisError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AnalysisError::Io {
            path: path.into(),
            source,
        }
    }
}
