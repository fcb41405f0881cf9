use thiserror::Error;

use crate::measurement::MeasurementId;

/// Errors from the event detector.
///
/// Every variant is raised before any state is touched, so a rejected call
/// leaves the detector exactly as it was.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DetectorError {
    #[error("spectrum shape mismatch: expected {expected} channels, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    #[error("invalid live time: {0} (must be finite and > 0)")]
    InvalidLiveTime(f64),

    #[error("invalid count at channel {channel}: {value} (must be finite and >= 0)")]
    InvalidCounts { channel: usize, value: f64 },

    #[error("out-of-order measurement: {received} does not follow {last}")]
    OutOfOrderMeasurement {
        last: MeasurementId,
        received: MeasurementId,
    },

    #[error("configuration error: {field} -- {detail}")]
    ConfigurationError { field: String, detail: String },

    #[error("config file error: {0}")]
    ConfigIo(String),
}

impl DetectorError {
    pub(crate) fn config(field: &str, detail: impl Into<String>) -> Self {
        DetectorError::ConfigurationError {
            field: field.to_string(),
            detail: detail.into(),
        }
    }
}

impl From<std::io::Error> for DetectorError {
    fn from(e: std::io::Error) -> Self {
        DetectorError::ConfigIo(e.to_string())
    }
}

impl From<serde_json::Error> for DetectorError {
    fn from(e: serde_json::Error) -> Self {
        DetectorError::ConfigIo(e.to_string())
    }
}

/// Convenience type alias for detector results.
pub type DetectorResult<T> = Result<T, DetectorError>;
