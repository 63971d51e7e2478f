//! HTTP error surface.
//!
//! DESIGN
//! ======
//! Subsystem errors stay `thiserror` enums and implement [`ErrorCode`] for a
//! grepable code plus a retryable hint. Route handlers convert them into
//! [`ApiError`], which renders a JSON body the UI shows in its error banner:
//! `{"code": "...", "message": "...", "retryable": false}`.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Grepable error code carried alongside the human-readable message.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn status(&self) -> StatusCode {
        StatusCode::INTERNAL_SERVER_ERROR
    }

    fn retryable(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
    pub retryable: bool,
}

/// Error returned by route handlers.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorBody,
}

impl ApiError {
    #[must_use]
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self { status, body: ErrorBody { code, message: message.into(), retryable: false } }
    }

    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "E_BAD_REQUEST", message)
    }

    #[must_use]
    pub fn from_code(err: &(impl ErrorCode + ?Sized)) -> Self {
        Self {
            status: err.status(),
            body: ErrorBody { code: err.error_code(), message: err.to_string(), retryable: err.retryable() },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(code = self.body.code, message = %self.body.message, "request failed");
        }
        (self.status, Json(self.body)).into_response()
    }
}

impl From<crate::services::ServiceError> for ApiError {
    fn from(err: crate::services::ServiceError) -> Self {
        Self::from_code(&err)
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
