//! Error types for the paper monitor.
//!
//! None of these escape `fetch` or `filter` under ordinary failures: sources and
//! relevance strategies log them and degrade to empty or error-flavored results.

use std::path::PathBuf;
use std::time::Duration;

/// Errors from the HTTP client layer.
#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    /// Connection, DNS, TLS or timeout failure
    #[error("Transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// Retry middleware gave up
    #[error("Request failed after retries: {0}")]
    Middleware(#[from] reqwest_middleware::Error),

    /// Provider signalled a rate limit (429)
    #[error("Rate limited (Retry-After {retry_after:?})")]
    RateLimited {
        /// Wait the provider asked for, when it sent one
        retry_after: Option<Duration>,
    },

    /// Request body too large for the remote model (413 response)
    #[error("Payload too large: {message}")]
    PayloadTooLarge {
        /// Error message from API
        message: String,
    },

    /// Endpoint or record missing (404)
    #[error("Not found: {resource}")]
    NotFound {
        /// Response body
        resource: String,
    },

    /// Query rejected (400, or an arXiv error entry)
    #[error("Bad request: {message}")]
    BadRequest {
        /// What the remote complained about
        message: String,
    },

    /// Body is not the JSON we expected
    #[error("Invalid JSON response: {0}")]
    Parse(#[from] serde_json::Error),

    /// Atom feed parsing error
    #[error("Failed to parse feed: {0}")]
    Feed(#[from] feed_rs::parser::ParseFeedError),

    /// Response decoded but did not have the expected structure
    #[error("Unexpected response shape: {0}")]
    Shape(String),

    /// Remote is down or overloaded (5xx)
    #[error("Server error {status}: {message}")]
    Server {
        /// Status code
        status: u16,
        /// Response body
        message: String,
    },

    /// Any other non-success status
    #[error("Unexpected status {status}: {message}")]
    UnexpectedStatus {
        /// Status code
        status: u16,
        /// Response body
        message: String,
    },
}

impl ClientError {
    /// Create a rate limited error with an optional retry-after in seconds.
    #[must_use]
    pub fn rate_limited(seconds: Option<u64>) -> Self {
        Self::RateLimited { retry_after: seconds.map(Duration::from_secs) }
    }

    /// Create a payload too large error.
    #[must_use]
    pub fn payload_too_large(message: impl Into<String>) -> Self {
        Self::PayloadTooLarge { message: message.into() }
    }

    /// Create a not found error.
    #[must_use]
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound { resource: resource.into() }
    }

    /// Create a bad request error.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest { message: message.into() }
    }

    /// Create a server error.
    #[must_use]
    pub fn server(status: u16, message: impl Into<String>) -> Self {
        Self::Server { status, message: message.into() }
    }

    /// Create a response shape error.
    #[must_use]
    pub fn shape(message: impl Into<String>) -> Self {
        Self::Shape(message.into())
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Server { .. })
    }

    /// Get the retry-after duration if this is a rate limit error.
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// Errors raised while loading or validating configuration.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("Failed to read config file {path}: {source}")]
    Read {
        /// Path that failed
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// Config file is not valid TOML or does not match the schema
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        /// Path that failed
        path: PathBuf,
        /// Underlying TOML error
        source: toml::de::Error,
    },

    /// A credential the selected strategy cannot exist without
    #[error("Missing credential: set {env_var}")]
    MissingCredential {
        /// Environment variable expected to hold it
        env_var: &'static str,
    },

    /// A setting has a value the strategy cannot work with
    #[error("Invalid value for '{field}': {message}")]
    Invalid {
        /// Setting name
        field: String,
        /// What is wrong with it
        message: String,
    },
}

impl ConfigError {
    /// Create an invalid value error.
    #[must_use]
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid { field: field.into(), message: message.into() }
    }
}

/// Errors from relevance strategies.
#[derive(thiserror::Error, Debug)]
pub enum RelevanceError {
    /// Keyword filter invoked with an empty keyword list
    #[error("No keywords configured")]
    NoKeywords,

    /// Embedding model or encoding failed for the whole batch
    #[error("Embedding failed: {0}")]
    Embedding(String),

    /// Error from the API client
    #[error("API error: {0}")]
    Client(#[from] ClientError),

    /// Strategy could not be constructed
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl RelevanceError {
    /// Create an embedding error.
    #[must_use]
    pub fn embedding(message: impl Into<String>) -> Self {
        Self::Embedding(message.into())
    }
}

/// Errors from handing results downstream.
#[derive(thiserror::Error, Debug)]
pub enum DeliveryError {
    /// Output could not be written
    #[error("Failed to write {path}: {source}")]
    Write {
        /// Destination path
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// Output could not be serialized
    #[error("Failed to serialize output: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Result type alias for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Result type alias for relevance operations.
pub type RelevanceResult<T> = Result<T, RelevanceError>;
