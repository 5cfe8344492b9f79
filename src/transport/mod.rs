//! HTTP transport layer for the case simulator client.
//!
//! Provides the HTTP transport abstraction, the authenticated request layer
//! every service call goes through, and the framing used by streaming
//! responses.

mod authenticated;
mod http;
mod streaming;

pub use authenticated::{ApiRequest, AuthenticatedTransport};
pub use http::{HttpMethod, HttpRequest, HttpResponse, HttpTransport, HttpTransportImpl};
pub use streaming::{
    parse_batch_line, ByteStream, ImageBatchStream, LineFramer, StreamingResponse, Utf8Decoder,
    DATA_PREFIX,
};

use std::time::Duration;

/// Transport error types.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Connection error.
    #[error("Connection error: {message}")]
    Connection {
        /// Error message.
        message: String,
    },

    /// Timeout error.
    #[error("Timeout after {timeout:?}")]
    Timeout {
        /// Timeout duration.
        timeout: Duration,
    },

    /// Invalid response or interrupted body.
    #[error("Invalid response: {message}")]
    InvalidResponse {
        /// Error message.
        message: String,
    },
}

impl From<TransportError> for crate::errors::ClientError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Timeout { .. } => crate::errors::ClientError::Timeout {
                message: err.to_string(),
            },
            TransportError::Connection { .. } | TransportError::InvalidResponse { .. } => {
                crate::errors::ClientError::Network {
                    message: err.to_string(),
                }
            }
        }
    }
}
