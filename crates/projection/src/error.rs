//! Errors raised by coordinate operations.

use coverage_common::CoverageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProjectionError {
    /// No operation links the two systems.
    #[error("no coordinate operation from {source_crs} to {target_crs}")]
    Unsupported {
        source_crs: String,
        target_crs: String,
    },

    /// The point lies outside the domain of the operation.
    #[error("point ({x}, {y}) outside the domain of {operation}")]
    OutOfDomain { operation: String, x: f64, y: f64 },

    #[error("envelope cannot be transformed: {0}")]
    InvalidEnvelope(String),
}

impl From<ProjectionError> for CoverageError {
    fn from(err: ProjectionError) -> Self {
        CoverageError::UnsupportedCrs(err.to_string())
    }
}
