//! Bearer token authentication middleware.
//!
//! Applied to every API route except health. An empty token set disables
//! the check.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::warn;

use crate::http::responses::ApiError;
use crate::state::AppState;

/// Extract bearer token from the Authorization header.
fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Compare without short-circuiting on the first differing byte.
fn constant_time_eq(expected: &[u8], provided: &[u8]) -> bool {
    if expected.len() != provided.len() {
        return false;
    }
    expected
        .iter()
        .zip(provided)
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

fn token_accepted(tokens: &[String], provided: &str) -> bool {
    tokens
        .iter()
        .any(|t| constant_time_eq(t.as_bytes(), provided.as_bytes()))
}

pub async fn require_bearer(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let tokens = &state.config.auth_tokens;
    if tokens.is_empty() {
        return next.run(request).await;
    }

    match extract_bearer_token(request.headers()) {
        Some(token) if token_accepted(tokens, token) => next.run(request).await,
        Some(_) => {
            warn!(path = %request.uri().path(), "Invalid bearer token");
            unauthorized("invalid bearer token")
        }
        None => {
            warn!(path = %request.uri().path(), "Missing bearer token");
            unauthorized("missing bearer token")
        }
    }
}

fn unauthorized(message: &str) -> Response {
    ApiError::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message).into_response()
}
