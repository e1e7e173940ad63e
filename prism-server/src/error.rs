//! HTTP error type and the mapping from core errors to status codes.

use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use prism_core::Error as CoreError;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Malformed multipart payload or missing field.
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Request body too large: {0}")]
    PayloadTooLarge(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: String,
    status: u16,
    /// Stable error type discriminant for client-side handling
    #[serde(rename = "type")]
    error_type: &'static str,
}

fn classify(err: &CoreError) -> (StatusCode, &'static str) {
    match err {
        CoreError::ConfigurationMissing(_) => {
            (StatusCode::SERVICE_UNAVAILABLE, "CONFIGURATION_MISSING")
        }
        CoreError::ResourceUnavailable(_) => {
            (StatusCode::SERVICE_UNAVAILABLE, "RESOURCE_UNAVAILABLE")
        }
        CoreError::InvalidParameter { .. } => (StatusCode::BAD_REQUEST, "INVALID_PARAMETER"),
        CoreError::Decode(_) => (StatusCode::BAD_REQUEST, "DECODE_ERROR"),
        CoreError::ResourceLoadFailed { .. } => {
            (StatusCode::INTERNAL_SERVER_ERROR, "RESOURCE_LOAD_FAILED")
        }
        CoreError::ExternalCallFailed(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "EXTERNAL_CALL_FAILED")
        }
        CoreError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "IO_ERROR"),
    }
}

impl HttpError {
    pub fn status(&self) -> StatusCode {
        match self {
            HttpError::Core(err) => classify(err).0,
            HttpError::BadRequest(_) => StatusCode::BAD_REQUEST,
            HttpError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            HttpError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            HttpError::Core(err) => classify(err),
            HttpError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            HttpError::PayloadTooLarge(_) => (StatusCode::PAYLOAD_TOO_LARGE, "PAYLOAD_TOO_LARGE"),
            HttpError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL"),
        };

        if status.is_server_error() {
            tracing::error!(%status, error = %self, "request failed");
        } else {
            tracing::debug!(%status, error = %self, "request rejected");
        }

        let body = ErrorBody {
            error: self.to_string(),
            status: status.as_u16(),
            error_type,
        };

        (status, axum::Json(body)).into_response()
    }
}

impl From<MultipartError> for HttpError {
    fn from(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            HttpError::PayloadTooLarge(err.body_text())
        } else {
            HttpError::BadRequest(err.body_text())
        }
    }
}

impl From<tokio::task::JoinError> for HttpError {
    fn from(err: tokio::task::JoinError) -> Self {
        HttpError::Internal(format!("background task failed: {err}"))
    }
}
