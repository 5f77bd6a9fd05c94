//! Error types for search-harvest
//!
//! This module provides error handling for the library, including:
//! - The crate-wide [`Error`] used by every public operation
//! - [`UpstreamError`], the tagged classification consumed by the backoff policy
//! - [`StorageError`] for object-store failures
//! - HTTP status code mapping and structured JSON error bodies for the API layer

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use utoipa::ToSchema;

/// Result type alias for search-harvest operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for search-harvest
#[derive(Debug, Error)]
pub enum Error {
    /// A job is already active; start/resume was rejected without touching state
    #[error("a job is already running")]
    Busy,

    /// Lifecycle control invoked from a state that forbids it
    #[error("cannot {operation} job in state {current}")]
    IllegalState {
        /// The operation that was attempted (e.g., "pause", "resume", "cancel")
        operation: String,
        /// The job status at the time of the call
        current: String,
    },

    /// Required upstream credentials or settings are absent
    #[error("missing configuration: {key}")]
    ConfigurationMissing {
        /// The setting that is missing (e.g., "REDDIT_CLIENT_ID")
        key: String,
    },

    /// Configuration or request parameters are invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the problem
        message: String,
        /// The configuration key or parameter that caused the error
        key: Option<String>,
    },

    /// Classified failure from the search API
    #[error("upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    /// Object storage failure
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Requested resource does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// CSV encoding or decoding error
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// HTTP transport error outside of the classified upstream path
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Shutdown in progress - not accepting new jobs
    #[error("shutdown in progress: not accepting new jobs")]
    ShuttingDown,

    /// API server error
    #[error("API server error: {0}")]
    ApiServerError(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for an [`Error::IllegalState`] built from a status value
    pub fn illegal_state(operation: &str, current: impl std::fmt::Display) -> Self {
        Error::IllegalState {
            operation: operation.to_string(),
            current: current.to_string(),
        }
    }
}

/// Failure reported by the search provider, tagged for the backoff policy
#[derive(Debug, Clone, Error, PartialEq)]
pub enum UpstreamError {
    /// The API asked us to slow down
    ///
    /// `retry_after` carries the machine-readable hint (e.g. a `Retry-After` header).
    /// When absent, `message` may still contain a free-text hint such as
    /// "try again in 3 minutes".
    #[error("rate limited: {message}")]
    RateLimited {
        /// Structured wait hint, if the API supplied one
        retry_after: Option<Duration>,
        /// Raw message from the API
        message: String,
    },

    /// 5xx response
    #[error("server error (HTTP {status})")]
    Server {
        /// HTTP status code
        status: u16,
    },

    /// Connection, timeout or protocol failure
    #[error("network failure: {0}")]
    Network(String),

    /// Forbidden, missing, private or legally restricted resource
    #[error("access denied (HTTP {status})")]
    AccessDenied {
        /// HTTP status code
        status: u16,
    },

    /// Anything else the provider could not classify
    #[error("{0}")]
    Other(String),
}

/// Object storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// Object does not exist
    #[error("object {0} not found")]
    NotFound(String),

    /// Compose was called with more sources than the store accepts
    #[error("compose of {count} sources exceeds the fan-in limit of {limit}")]
    FanInExceeded {
        /// Number of sources supplied
        count: usize,
        /// Maximum accepted per call
        limit: usize,
    },

    /// Backend failure (filesystem, remote API)
    #[error("storage backend failure on {path}: {reason}")]
    Backend {
        /// Object path involved
        path: String,
        /// Description of the failure
        reason: String,
    },

    /// Operation the backend cannot perform
    #[error("unsupported storage operation: {0}")]
    Unsupported(String),
}

/// API error response format
///
/// # Example JSON Response
///
/// ```json
/// {
///   "error": {
///     "code": "busy",
///     "message": "a job is already running"
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// The error details
    pub error: ErrorDetail,
}

/// Detailed error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "not_found", "busy")
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional context about the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with code and message
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    /// Create a "not found" error
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::new("not_found", format!("{} not found", resource.into()))
    }

    /// Create a "validation error" error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new("validation_error", message)
    }

    /// Create an "internal server error"
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new("internal_error", message)
    }
}

/// Convert errors to HTTP status codes for API responses
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            Error::Config { .. } => 400,

            Error::Busy => 409,
            Error::IllegalState { .. } => 409,

            Error::NotFound(_) => 404,
            Error::Storage(StorageError::NotFound(_)) => 404,

            Error::ConfigurationMissing { .. } => 500,
            Error::Storage(_) => 500,
            Error::Io(_) => 500,
            Error::Serialization(_) => 500,
            Error::Csv(_) => 500,
            Error::ApiServerError(_) => 500,
            Error::Other(_) => 500,

            // External service errors
            Error::Upstream(_) => 502,
            Error::Network(_) => 502,

            Error::ShuttingDown => 503,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Busy => "busy",
            Error::IllegalState { .. } => "illegal_state",
            Error::ConfigurationMissing { .. } => "configuration_missing",
            Error::Config { .. } => "config_error",
            Error::Upstream(e) => match e {
                UpstreamError::RateLimited { .. } => "rate_limited",
                UpstreamError::Server { .. } => "upstream_server_error",
                UpstreamError::Network(_) => "upstream_network_error",
                UpstreamError::AccessDenied { .. } => "upstream_access_denied",
                UpstreamError::Other(_) => "upstream_error",
            },
            Error::Storage(StorageError::NotFound(_)) => "not_found",
            Error::Storage(_) => "storage_error",
            Error::NotFound(_) => "not_found",
            Error::Io(_) => "io_error",
            Error::Serialization(_) => "serialization_error",
            Error::Csv(_) => "csv_error",
            Error::Network(_) => "network_error",
            Error::ShuttingDown => "shutting_down",
            Error::ApiServerError(_) => "api_server_error",
            Error::Other(_) => "internal_error",
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let code = error.error_code().to_string();
        let message = error.to_string();

        let details = match &error {
            Error::IllegalState { operation, current } => Some(serde_json::json!({
                "operation": operation,
                "current_state": current,
            })),
            Error::ConfigurationMissing { key } => Some(serde_json::json!({
                "key": key,
            })),
            Error::Config { key: Some(key), .. } => Some(serde_json::json!({
                "key": key,
            })),
            _ => None,
        };

        ApiError {
            error: ErrorDetail {
                code,
                message,
                details,
            },
        }
    }
}
