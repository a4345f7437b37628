//! Error types for pyramid tile store operations.

use thiserror::Error;

/// Result type alias using CoverageError.
pub type Result<T> = std::result::Result<T, CoverageError>;

/// Primary error type for pyramid, reader and writer operations.
///
/// Reads outside every pyramid are not errors; they produce an empty result.
#[derive(Debug, Error)]
pub enum CoverageError {
    /// Invalid grid size, tile size, scale or configuration value.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("No such pyramid: {0}")]
    NoSuchPyramid(String),

    #[error("No such mosaic: {0}")]
    NoSuchMosaic(String),

    /// Band count or sample type differs from the mosaic's fixed model.
    #[error("Incompatible sample model: expected {expected}, found {found}")]
    IncompatibleSampleModel { expected: String, found: String },

    /// No usable transform between two coordinate reference systems.
    #[error("Unsupported CRS: {0}")]
    UnsupportedCrs(String),

    /// Backend or codec failure. Never retried by the store.
    #[error("I/O failure: {0}")]
    Io(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

impl CoverageError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self::Io(msg.into())
    }

    pub fn incompatible(expected: impl ToString, found: impl ToString) -> Self {
        Self::IncompatibleSampleModel {
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }
}

impl From<std::io::Error> for CoverageError {
    fn from(err: std::io::Error) -> Self {
        CoverageError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for CoverageError {
    fn from(err: serde_json::Error) -> Self {
        CoverageError::Io(format!("JSON error: {}", err))
    }
}

impl From<crate::crs::CrsParseError> for CoverageError {
    fn from(err: crate::crs::CrsParseError) -> Self {
        CoverageError::UnsupportedCrs(err.to_string())
    }
}
