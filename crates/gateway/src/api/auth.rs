//! API authentication middleware.
//!
//! Reads the env var named by `config.server.auth.token_env` once at
//! startup and caches the SHA-256 digest in `AppState::api_token_hash`.
//! Unlike a dev-mode open fallback, an unset token env var gates the
//! protected route tree closed — every request 401s — rather than
//! running unauthenticated.

use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::state::AppState;

pub async fn require_api_token(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let Some(expected_hash) = &state.api_token_hash else {
        return (
            StatusCode::UNAUTHORIZED,
            axum::Json(serde_json::json!({
                "error": "API bearer token not configured",
                "reason": "auth",
            })),
        )
            .into_response();
    };

    let provided = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or("");

    let provided_hash = Sha256::digest(provided.as_bytes());

    if !bool::from(provided_hash.ct_eq(expected_hash.as_slice())) {
        return (
            StatusCode::UNAUTHORIZED,
            axum::Json(serde_json::json!({
                "error": "invalid or missing API token",
                "reason": "auth",
            })),
        )
            .into_response();
    }

    next.run(req).await
}
