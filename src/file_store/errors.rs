//! # File Store Errors

use thiserror::Error;

/// Result type for file store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// File store errors
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Path resolves outside the storage root
    #[error("Invalid path: {0}")]
    PathEscape(String),

    /// Operation would act on the storage root itself
    #[error("Invalid path: {0} refers to the storage root")]
    RootTarget(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Missing parameter: {0}")]
    MissingParameter(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl StoreError {
    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            StoreError::PathEscape(_) => 400,
            StoreError::RootTarget(_) => 400,
            StoreError::MissingParameter(_) => 400,
            StoreError::NotFound(_) => 404,
            StoreError::Io(_) => 500,
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e.to_string())
    }
}
