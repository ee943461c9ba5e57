//! Relay error types with HTTP status code mapping.
//!
//! [`RelayError`] is the central error type for the relay. Session loops use
//! it to describe why a connection ended; the HTTP surface maps each variant
//! to a status code and structured JSON error response.

use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::domain::SessionId;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 3001,
///     "message": "hub is not running"
///   }
/// }
/// ```
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Numeric error code.
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Relay error enum.
///
/// # Error Code Ranges
///
/// | Range     | Category            |
/// |-----------|---------------------|
/// | 1000–1999 | Malformed peer input |
/// | 2000–2999 | Transport / deadline |
/// | 3000–3999 | Server              |
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// The WebSocket transport failed while reading or writing.
    #[error("transport error: {0}")]
    Transport(#[from] axum::Error),

    /// A peer sent a message larger than the configured limit.
    #[error("message of {size} bytes exceeds the {limit} byte limit")]
    MessageTooLarge {
        /// Size of the rejected message in bytes.
        size: usize,
        /// Configured maximum in bytes.
        limit: usize,
    },

    /// No pong arrived before the read deadline expired.
    #[error("no pong received within {0:?}")]
    ReadTimeout(Duration),

    /// A write did not complete before the write deadline expired.
    #[error("write did not complete within {0:?}")]
    WriteTimeout(Duration),

    /// An inbound message was not a JSON object.
    #[error("invalid envelope: {0}")]
    InvalidEnvelope(#[from] serde_json::Error),

    /// The session's write loop stopped, so the connection is finished.
    #[error("outbound side of the session stopped")]
    WriterStopped,

    /// A session's outbound queue could not accept another message.
    #[error("outbound queue for session {0} is full")]
    QueueSaturated(SessionId),

    /// The hub control loop is no longer running.
    #[error("hub is not running")]
    HubClosed,

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl RelayError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidEnvelope(_) => 1001,
            Self::MessageTooLarge { .. } => 1002,
            Self::Transport(_) => 2001,
            Self::ReadTimeout(_) => 2002,
            Self::WriteTimeout(_) => 2003,
            Self::QueueSaturated(_) => 2004,
            Self::WriterStopped => 2005,
            Self::HubClosed => 3001,
            Self::InvalidConfig(_) => 3002,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidEnvelope(_) => StatusCode::BAD_REQUEST,
            Self::MessageTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Transport(_)
            | Self::ReadTimeout(_)
            | Self::WriteTimeout(_)
            | Self::WriterStopped => {
                StatusCode::BAD_GATEWAY
            }
            Self::QueueSaturated(_) | Self::HubClosed => StatusCode::SERVICE_UNAVAILABLE,
            Self::InvalidConfig(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details: None,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}
