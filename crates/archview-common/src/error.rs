//! Error types for archview

use thiserror::Error;

/// Main error type for archview
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// A persisted cache record exists but cannot be decoded
    #[error("Parse error: {0}")]
    Parse(String),

    /// The external query layer failed
    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Decompression error: {0}")]
    Decompression(String),

    #[error("Template error: {0}")]
    Template(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias for archview
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Config(_) => 500,
            Error::Database(_) => 500,
            Error::Storage(_) => 500,
            Error::Validation(_) => 400,
            Error::NotFound(_) => 404,
            Error::Parse(_) => 500,
            Error::Upstream(_) => 500,
            Error::Decompression(_) => 500,
            Error::Template(_) => 500,
            Error::Internal(_) => 500,
            Error::Other(_) => 500,
        }
    }

    /// Returns the error code string
    pub fn code(&self) -> &'static str {
        match self {
            Error::Config(_) => "config_error",
            Error::Database(_) => "database_error",
            Error::Storage(_) => "storage_error",
            Error::Validation(_) => "invalid_request",
            Error::NotFound(_) => "not_found",
            Error::Parse(_) => "corrupt_cache_record",
            Error::Upstream(_) => "upstream_error",
            Error::Decompression(_) => "decompression_failed",
            Error::Template(_) => "template_error",
            Error::Internal(_) => "unknown",
            Error::Other(_) => "unknown",
        }
    }

    /// Whether this error means "nothing there" rather than a failure
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}
