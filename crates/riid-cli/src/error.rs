//! CLI error types

use thiserror::Error;

/// CLI error type
#[derive(Error, Debug)]
pub enum CliError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Detector error: {0}")]
    Detector(#[from] riid_detector::DetectorError),

    #[error("Unsupported file format: '{0}' (expected .json)")]
    UnsupportedFormat(String),

    #[error("Invalid spectrum file {path}: {detail}")]
    InvalidSpectra { path: String, detail: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;
