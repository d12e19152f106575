//! Crate-level error type and serialisable error bodies

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::query::QueryError;
use crate::repository::{RepositoryError, RepositoryErrorKind};

/// Result type alias using the crate error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the crate
///
/// Large error variants are boxed to reduce stack size
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(Box<figment::Error>),

    /// Repository operation failed
    #[error("{0}")]
    Repository(#[from] RepositoryError),

    /// Query text could not be parsed
    #[error("Invalid query: {0}")]
    Query(#[from] QueryError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// Manual From implementation for the boxed error
impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Error::Config(Box::new(err))
    }
}

impl Error {
    /// Stable machine-readable code of the error
    pub fn code(&self) -> &'static str {
        match self {
            Error::Config(_) => "CONFIG_ERROR",
            Error::Repository(e) => match e.kind {
                RepositoryErrorKind::NotFound => "NOT_FOUND",
                RepositoryErrorKind::DuplicateResource => "DUPLICATE_RESOURCE",
                RepositoryErrorKind::ValidationFailed => "VALIDATION_ERROR",
                RepositoryErrorKind::UnsupportedOperation => "UNSUPPORTED_OPERATION",
                RepositoryErrorKind::StorageError => "STORAGE_ERROR",
            },
            Error::Query(_) => "VALIDATION_ERROR",
            Error::Io(_) => "IO_ERROR",
            Error::Json(_) => "JSON_ERROR",
        }
    }

    /// Serialisable form of the error
    pub fn to_body(&self) -> ErrorBody {
        ErrorBody::new(self.to_string(), self.code())
    }
}

/// Error body written by front-ends
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Error message
    pub error: String,

    /// Error code
    pub code: String,
}

impl ErrorBody {
    /// Create a new error body
    pub fn new(error: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
        }
    }
}
