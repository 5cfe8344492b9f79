//! Error types for the case simulator client.
//!
//! Covers configuration, transport, HTTP status, session and streaming
//! failures. Malformed stream records are not errors; they are skipped and
//! counted by the stream itself.

use thiserror::Error;

/// Result type alias for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Error type for case simulator client operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Configuration error (missing base URL, bad timeout, etc.)
    #[error("Configuration error: {message}")]
    Configuration {
        /// Error message describing the configuration issue.
        message: String,
    },

    /// Network/connection error.
    #[error("Network error: {message}")]
    Network {
        /// Error message.
        message: String,
    },

    /// Request timed out.
    #[error("Request timeout: {message}")]
    Timeout {
        /// Error message.
        message: String,
    },

    /// Non-success HTTP status.
    #[error("HTTP {status}: {message}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Error message, usually the response body or its `detail` field.
        message: String,
    },

    /// The backend rejected the stored credentials (HTTP 401).
    #[error("Session expired: please log in again")]
    SessionExpired,

    /// Streaming transport error after the stream was established.
    #[error("Stream error: {message}")]
    Stream {
        /// Error message.
        message: String,
    },

    /// Serialization/deserialization error.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error message.
        message: String,
    },
}

impl ClientError {
    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        ClientError::Configuration {
            message: message.into(),
        }
    }

    /// Creates an HTTP status error.
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        ClientError::Http {
            status,
            message: message.into(),
        }
    }

    /// Returns the HTTP status carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Http { status, .. } => Some(*status),
            ClientError::SessionExpired => Some(401),
            _ => None,
        }
    }

    /// Returns true if the caller may reasonably retry the same operation.
    ///
    /// The client itself never retries; this only informs the UI layer.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClientError::Network { .. }
                | ClientError::Timeout { .. }
                | ClientError::Stream { .. }
                | ClientError::Http { status: 500..=599, .. }
        )
    }
}

/// Error body shape returned by the backend on failures.
#[derive(Debug, serde::Deserialize)]
pub struct ApiErrorBody {
    /// Human-readable error detail.
    pub detail: Option<String>,
    /// Alternative message field used by some endpoints.
    pub message: Option<String>,
}

impl ApiErrorBody {
    /// Extracts the best available message from a raw response body.
    pub fn message_from(body: &[u8]) -> String {
        serde_json::from_slice::<ApiErrorBody>(body)
            .ok()
            .and_then(|b| b.detail.or(b.message))
            .unwrap_or_else(|| String::from_utf8_lossy(body).trim().to_string())
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ClientError::Timeout {
                message: err.to_string(),
            }
        } else if let Some(status) = err.status() {
            ClientError::Http {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            ClientError::Network {
                message: err.to_string(),
            }
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<url::ParseError> for ClientError {
    fn from(err: url::ParseError) -> Self {
        ClientError::Configuration {
            message: format!("Invalid URL: {}", err),
        }
    }
}
