use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::{messages::unix_now, validate::ValidationError};

/// Gateway failures with their client-facing status codes.
#[derive(Debug, Error)]
pub(crate) enum GatewayError {
    /// The request violated a constraint; the backend was never contacted.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The backend did not produce a response (or the next piece of a
    /// stream) within the configured timeout.
    #[error("backend did not respond within the configured timeout")]
    BackendTimeout,

    /// The backend was reachable but answered with a failure status.
    #[error("backend error ({status}): {message}")]
    Backend { status: u16, message: String },

    /// Anything uncategorized, including unexpected backend payloads.
    /// If Some(message), the detail is safe to show to the client.
    #[error("internal server error")]
    Internal(Option<String>),
}

impl GatewayError {
    /// Get the appropriate HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::BackendTimeout => StatusCode::GATEWAY_TIMEOUT,
            // Pass the backend's own status through where possible.
            Self::Backend { status, .. } => StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY),
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error type string for the response.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::BackendTimeout => "backend_timeout",
            Self::Backend { .. } => "backend_error",
            Self::Internal(_) => "internal_error",
        }
    }

    fn detail(&self) -> String {
        match self {
            Self::Internal(Some(message)) => message.clone(),
            Self::Internal(None) => "internal server error".to_string(),
            _ => self.to_string(),
        }
    }

    /// Build the JSON error response for a non-streaming request.
    pub fn into_response(self, path: &str) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            log::error!("server error ({}) on {path}: {}", status.as_u16(), self.detail());
        } else {
            log::debug!("request to {path} rejected ({}): {}", status.as_u16(), self.detail());
        }

        let body = ErrorBody {
            detail: self.detail(),
            path: path.to_string(),
            timestamp: unix_now(),
            r#type: self.error_type(),
        };

        (status, Json(body)).into_response()
    }

    /// Serialized error frame sent in-band once a streaming response has
    /// been committed and the status code can no longer change.
    pub fn stream_frame(&self) -> String {
        let frame = StreamErrorFrame {
            error: StreamErrorDetail {
                detail: self.detail(),
                r#type: self.error_type(),
            },
        };

        sonic_rs::to_string(&frame)
            .unwrap_or_else(|_| r#"{"error":{"detail":"internal server error","type":"internal_error"}}"#.to_string())
    }
}

/// Error response body for non-streaming requests.
#[derive(Debug, Serialize)]
struct ErrorBody {
    detail: String,
    path: String,
    timestamp: u64,
    r#type: &'static str,
}

#[derive(Debug, Serialize)]
struct StreamErrorFrame {
    error: StreamErrorDetail,
}

#[derive(Debug, Serialize)]
struct StreamErrorDetail {
    detail: String,
    r#type: &'static str,
}
