//! Error types for codegate

use thiserror::Error;

/// Result type alias for codegate operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for codegate operations
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The reviewer could not be reached or rejected the request
    #[error("Reviewer error: {0}")]
    Reviewer(String),

    /// Git repository error
    #[error("Git error: {0}")]
    Git(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl From<git2::Error> for Error {
    fn from(err: git2::Error) -> Self {
        Error::Git(err.message().to_string())
    }
}
