use std::fmt;

use axum::response::{IntoResponse, Response};
use axum::{http::StatusCode, Json};
use serde_json::json;

use crate::validate::FieldError;

/// Error kinds surfaced to callers. Each maps onto one callable status.
#[derive(Debug, PartialEq)]
pub enum AppError {
    Unauthenticated,
    InvalidArgument(String),
    NotFound(&'static str),
    PermissionDenied(&'static str),
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> &'static str {
        match self {
            AppError::Unauthenticated => "UNAUTHENTICATED",
            AppError::InvalidArgument(_) => "INVALID_ARGUMENT",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::PermissionDenied(_) => "PERMISSION_DENIED",
            AppError::Internal(_) => "INTERNAL",
        }
    }

    fn http_status(&self) -> StatusCode {
        match self {
            AppError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AppError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Unauthenticated => f.write_str("User must be authenticated."),
            AppError::InvalidArgument(msg) | AppError::Internal(msg) => f.write_str(msg),
            AppError::NotFound(msg) | AppError::PermissionDenied(msg) => f.write_str(msg),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let AppError::Internal(msg) = &self {
            tracing::error!(error = %msg, "internal error");
        }

        let body = json!({
            "error": {
                "status": self.status(),
                "message": self.to_string(),
            }
        });
        (self.http_status(), Json(body)).into_response()
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(err: rusqlite::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<FieldError> for AppError {
    fn from(err: FieldError) -> Self {
        AppError::InvalidArgument(err.to_string())
    }
}
