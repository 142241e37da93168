use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use thiserror::Error;

/// Error taxonomy shared by the store, the query/export engines, and the
/// HTTP layer. Every variant maps to one status code; the boundary renders
/// all of them as the same structured envelope.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Missing/blank required field or malformed pagination.
    #[error("{0}")]
    Validation(String),

    /// Referenced locale/tag/translation does not exist, or an export query
    /// came back empty.
    #[error("{0}")]
    NotFound(String),

    /// Duplicate (key, locale, tag) or an attempt to delete a referenced row.
    #[error("{0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{0}")]
    Unexpected(String),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Conflict(_) => StatusCode::CONFLICT,
            ServiceError::Database(_) | ServiceError::Unexpected(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Wire shape of every error response.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub timestamp: String,
    pub status: u16,
    pub error: String,
    pub message: String,
    pub path: String,
}

impl ErrorBody {
    pub fn new(status: StatusCode, message: &str, path: &str) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            status: status.as_u16(),
            error: status.canonical_reason().unwrap_or("Unknown").to_string(),
            message: message.to_string(),
            path: path.to_string(),
        }
    }
}

/// Carried through response extensions so the path-attaching middleware can
/// rebuild the envelope with the request path filled in.
#[derive(Debug, Clone)]
pub struct ErrorParts {
    pub status: StatusCode,
    pub message: String,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();
        // The request path is not known here; the middleware in api.rs swaps
        // in a complete envelope when it sees ErrorParts.
        let body = ErrorBody::new(status, &message, "");
        (status, Extension(ErrorParts { status, message }), Json(body)).into_response()
    }
}
