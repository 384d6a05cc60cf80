//! Optional bearer-token authentication. `/health` is always open.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use tracing::warn;

use crate::routes::ErrorResponse;
use crate::AppState;

/// Environment variable holding the expected token.
pub const API_KEY_ENV: &str = "BUDDY_API_KEY";

#[derive(Debug, Clone)]
pub struct ApiKey {
    expected: Vec<u8>,
}

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            expected: key.into().into_bytes(),
        }
    }

    /// Read [`API_KEY_ENV`]; empty values count as unset.
    pub fn from_env() -> Option<Self> {
        std::env::var(API_KEY_ENV)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .map(Self::new)
    }

    /// Comparison time depends only on the length.
    fn matches(&self, provided: &[u8]) -> bool {
        if self.expected.len() != provided.len() {
            return false;
        }
        self.expected
            .iter()
            .zip(provided)
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

fn unauthorized(error: &str, code: &'static str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse {
            error: error.into(),
            code,
            reply: None,
        }),
    )
        .into_response()
}

pub async fn require_api_key(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(key) = &state.api_key else {
        return next.run(request).await;
    };
    if request.uri().path() == "/health" {
        return next.run(request).await;
    }

    match bearer_token(request.headers()) {
        Some(token) if key.matches(token.as_bytes()) => next.run(request).await,
        Some(_) => {
            warn!(path = %request.uri().path(), "Rejected request with wrong API key");
            unauthorized("Invalid API key", "invalid_api_key")
        }
        None => {
            warn!(path = %request.uri().path(), "Rejected request without API key");
            unauthorized(
                "Missing Authorization header. Use: Authorization: Bearer <key>",
                "missing_api_key",
            )
        }
    }
}
