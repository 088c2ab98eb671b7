//! API error types.

use std::sync::atomic::{AtomicBool, Ordering};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use framereel_media::ConversionError;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

pub type ApiResult<T> = Result<T, ApiError>;

static HIDE_INTERNAL_ERRORS: AtomicBool = AtomicBool::new(false);

/// Replace internal error details in response bodies with a generic message.
pub fn hide_internal_errors(hide: bool) {
    HIDE_INTERNAL_ERRORS.store(hide, Ordering::Relaxed);
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Conversion(#[from] ConversionError),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "bad_request",
            ApiError::RateLimited => "rate_limited",
            ApiError::Internal(_) => "internal_error",
            ApiError::Conversion(e) => e.kind(),
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Conversion(ConversionError::EncoderUnavailable) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Conversion(e) if e.is_client_error() => StatusCode::BAD_REQUEST,
            ApiError::Conversion(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn is_internal(&self) -> bool {
        matches!(
            self,
            ApiError::Internal(_)
                | ApiError::Conversion(ConversionError::Io(_))
                | ApiError::Conversion(ConversionError::Internal(_))
        )
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            match &self {
                ApiError::Conversion(e) => match e.diagnostics() {
                    Some(diagnostics) => error!(code = e.kind(), "Conversion error: {}\n{}", e, diagnostics),
                    None => error!(code = e.kind(), "Conversion error: {}", e),
                },
                other => error!("Request failed: {}", other),
            }
        } else {
            warn!(code = self.code(), "Rejected request: {}", self);
        }

        // Don't expose internal error details in production
        let message = if self.is_internal() && HIDE_INTERNAL_ERRORS.load(Ordering::Relaxed) {
            "An internal error occurred".to_string()
        } else {
            self.to_string()
        };

        let body = ErrorResponse {
            error: message,
            code: self.code(),
        };

        (status, Json(body)).into_response()
    }
}
