use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use subtle::ConstantTimeEq;

use crate::api::AppState;
use crate::error::ErrorBody;

/// Constant-time string comparison to prevent timing attacks
/// Use this for comparing API keys and other sensitive values
pub fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Rejects API requests missing the configured bearer key. When no key is
/// configured the layer passes everything through — token issuance and user
/// management live outside this service.
pub async fn require_api_key(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    let Some(expected) = state.config.api_key.as_deref() else {
        return next.run(req).await;
    };

    let provided = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    match provided {
        Some(token) if constant_time_compare(token, expected) => next.run(req).await,
        _ => {
            let body = ErrorBody::new(
                StatusCode::UNAUTHORIZED,
                "Invalid or missing API key",
                req.uri().path(),
            );
            (StatusCode::UNAUTHORIZED, Json(body)).into_response()
        }
    }
}
