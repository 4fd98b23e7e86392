//! JSON error responses.
//!
//! Every failure leaves the API as
//! `{"errors":[{"status":"401","title":"unauthorized","detail":"..."}]}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::{error, warn};

use crate::auth::AuthError;
use crate::storage::RepoError;

/// An API error rendered as a JSON error document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    /// HTTP status.
    pub status: StatusCode,
    /// Short, status-derived title.
    pub title: &'static str,
    /// Human-readable detail.
    pub detail: String,
}

#[derive(Serialize)]
struct ErrorBody {
    status: String,
    title: &'static str,
    #[serde(skip_serializing_if = "String::is_empty")]
    detail: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    errors: [ErrorBody; 1],
}

impl ApiError {
    fn new(status: StatusCode, title: &'static str, detail: impl Into<String>) -> Self {
        Self {
            status,
            title,
            detail: detail.into(),
        }
    }

    /// 400.
    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad request", detail)
    }

    /// 401.
    pub fn unauthorized(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized", detail)
    }

    /// 404.
    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not found", detail)
    }

    /// 500.
    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal server error", detail)
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.detail.is_empty() {
            f.write_str(self.title)
        } else {
            write!(f, "{}: {}", self.title, self.detail)
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = self.status.as_u16(), error = %self, "request failed");
        } else {
            warn!(status = self.status.as_u16(), error = %self, "request failed");
        }
        let body = ErrorResponse {
            errors: [ErrorBody {
                status: self.status.as_u16().to_string(),
                title: self.title,
                detail: self.detail,
            }],
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        Self::unauthorized(e.to_string())
    }
}

impl From<RepoError> for ApiError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::NotFound(what) => Self::not_found(format!("couldn't find {what}")),
            RepoError::Database(err) => Self::internal(err.to_string()),
        }
    }
}
