//! API error types with HTTP status code mapping.
//!
//! [`ApiError`] is the unified error type for all endpoints. It implements
//! `axum::response::IntoResponse` to produce a structured JSON body
//! `{"success": false, "error": {code, message, details?}}`.

use axum::extract::rejection::JsonRejection;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use runlab_debug::DebugError;
use runlab_sandbox::SubmitError;

use crate::rate_limit::RateLimitDecision;

/// Structured error detail in API responses.
#[derive(Debug, Clone, Serialize)]
pub struct ApiErrorDetail {
    /// Machine-readable error code (e.g., "NOT_FOUND", "BAD_REQUEST").
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Unknown session (404).
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed body or invalid argument (400).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// A run is in flight, or the debugger is not in the required state (409).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Refused by the rate limiter (429).
    #[error("rate limit exceeded")]
    RateLimited(RateLimitDecision),

    #[error("internal error: {0}")]
    InternalError(String),
}

impl ApiError {
    fn detail(code: &str, message: String, details: Option<serde_json::Value>) -> ApiErrorDetail {
        ApiErrorDetail {
            code: code.to_string(),
            message,
            details,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        let (status, detail) = match &self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, Self::detail("NOT_FOUND", msg.clone(), None)),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, Self::detail("BAD_REQUEST", msg.clone(), None)),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, Self::detail("CONFLICT", msg.clone(), None)),
            ApiError::RateLimited(decision) => (
                StatusCode::TOO_MANY_REQUESTS,
                Self::detail("RATE_LIMITED", message, serde_json::to_value(decision).ok()),
            ),
            ApiError::InternalError(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Self::detail("INTERNAL_ERROR", msg.clone(), None),
            ),
        };

        let body = serde_json::json!({
            "success": false,
            "error": detail,
        });

        let mut response = (status, axum::Json(body)).into_response();
        if let ApiError::RateLimited(RateLimitDecision {
            retry_after: Some(secs),
            ..
        }) = &self
        {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

impl From<SubmitError> for ApiError {
    fn from(err: SubmitError) -> Self {
        ApiError::Conflict(err.to_string())
    }
}

impl From<DebugError> for ApiError {
    fn from(err: DebugError) -> Self {
        match err {
            DebugError::NotDebugging => ApiError::Conflict(err.to_string()),
            DebugError::IndexOutOfRange { .. } | DebugError::NothingToReplay => {
                ApiError::BadRequest(err.to_string())
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}
