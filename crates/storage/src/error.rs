//! Storage error types.

use coverage_common::CoverageError;
use thiserror::Error;

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend could not be configured or reached.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("failed to read {path}: {message}")]
    Read { path: String, message: String },

    #[error("failed to write {path}: {message}")]
    Write { path: String, message: String },
}

impl From<StorageError> for CoverageError {
    fn from(err: StorageError) -> Self {
        CoverageError::Io(err.to_string())
    }
}
