use thiserror::Error;

use crate::client::is_retriable_status;

/// Errors that can occur when interacting with the Content Understanding API.
#[derive(Error, Debug)]
pub enum CuError {
    /// The request failed due to an HTTP error.
    #[error("HTTP error: {status} - {message}")]
    Http { status: u16, message: String },

    /// Authentication failed.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The request payload could not be serialized, or a response body
    /// could not be decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The HTTP request failed at the transport level.
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    /// The endpoint URL is invalid.
    #[error("Invalid endpoint URL: {message}")]
    InvalidEndpoint {
        message: String,
        #[source]
        source: Option<url::ParseError>,
    },

    /// A required configuration value is missing.
    #[error("Missing configuration: {0}")]
    MissingConfig(String),

    /// The API returned an error response with a structured error body.
    #[error("API error ({code}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    /// A response was missing a header the operation depends on.
    #[error("Missing response header: {0}")]
    MissingHeader(&'static str),

    /// A request builder was given invalid or incomplete values.
    #[error("Invalid request: {0}")]
    Builder(String),

    /// A caller-supplied input (file path, URL, template) cannot be used.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Reading a local file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CuError {
    /// Create an [`CuError::Http`] error.
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
        }
    }

    /// Create an [`CuError::InvalidEndpoint`] error without an underlying cause.
    pub fn invalid_endpoint(message: impl Into<String>) -> Self {
        Self::InvalidEndpoint {
            message: message.into(),
            source: None,
        }
    }

    /// Create an [`CuError::InvalidEndpoint`] error wrapping a URL parse failure.
    pub fn invalid_endpoint_with_source(message: impl Into<String>, source: url::ParseError) -> Self {
        Self::InvalidEndpoint {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Returns `true` if the failure is transient and the request may succeed
    /// when sent again.
    ///
    /// Connection failures, timeouts, and responses whose HTTP status is
    /// accepted by [`is_retriable_status`] are transient. Authentication
    /// failures, client errors and undecodable bodies are not.
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Http { status, .. } | Self::Api { status, .. } => is_retriable_status(*status),
            Self::Request(e) => {
                e.is_connect()
                    || e.is_timeout()
                    || e.status().is_some_and(|s| is_retriable_status(s.as_u16()))
            }
            _ => false,
        }
    }
}

/// Result type alias for Content Understanding operations.
pub type CuResult<T> = std::result::Result<T, CuError>;
