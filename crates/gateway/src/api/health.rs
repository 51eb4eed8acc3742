//! Liveness/readiness probes. Both are public — no bearer token required.

use axum::extract::State;
use axum::response::{IntoResponse, Json};

use crate::state::AppState;

/// `GET /v1/health` — process is up. Never checks collaborators.
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// `GET /v1/ready` — collaborators are actually usable: at least one LLM
/// provider initialized (or the startup policy explicitly allows none),
/// and the persistence stores opened without error (they did, by the
/// time `AppState` exists, so this just reports provider posture).
pub async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    let providers_ready = !state.providers.is_empty();
    let status = if providers_ready { "ok" } else { "degraded" };

    Json(serde_json::json!({
        "status": status,
        "providers": state.providers.list_providers(),
        "provider_init_errors": state.providers.init_errors().len(),
    }))
}
