//! Error types for reviewer API calls

use thiserror::Error;

/// Result type for reviewer API calls
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while calling a reviewer endpoint
#[derive(Error, Debug)]
pub enum Error {
    /// Transport failure, including timeouts
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The endpoint answered with a non-success status
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// No API key in the environment or config
    #[error("Missing API key for {provider}: set {env} or reviewer.api_key")]
    MissingApiKey { provider: String, env: String },

    /// Base URL is not a valid URL
    #[error("Invalid base URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// Response body did not have the expected shape
    #[error("Parse error: {0}")]
    Parse(String),

    /// Invalid reviewer configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<Error> for codegate_core::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Config(message) => codegate_core::Error::Config(message),
            other => codegate_core::Error::Reviewer(other.to_string()),
        }
    }
}

impl From<codegate_core::Error> for Error {
    fn from(err: codegate_core::Error) -> Self {
        match err {
            codegate_core::Error::Config(message) => Error::Config(message),
            other => Error::Config(other.to_string()),
        }
    }
}
