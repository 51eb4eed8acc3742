pub mod auth;
pub mod error;
pub mod findings;
pub mod health;
pub mod jobs;
pub mod notifications;
pub mod projects;
pub mod resources;
pub mod stream;
pub mod threads;
pub mod ws;

use axum::middleware;
use axum::routing::{get, patch, post};
use axum::Router;

use crate::state::AppState;

/// Build the full API router.
///
/// Routes are split into **public** (no auth required) and **protected**
/// (gated behind the bearer-token middleware named by
/// `config.server.auth.token_env`).
pub fn router(state: AppState) -> Router<AppState> {
    let public = Router::new()
        .route("/v1/health", get(health::health))
        .route("/v1/ready", get(health::ready));

    let protected = Router::new()
        // Projects
        .route("/v1/projects", post(projects::create_project))
        .route("/v1/projects", get(projects::list_projects))
        // Threads
        .route("/v1/projects/{project_id}/threads", post(threads::create_thread))
        .route("/v1/projects/{project_id}/threads", get(threads::list_threads))
        .route(
            "/v1/projects/{project_id}/threads/{thread_id}",
            axum::routing::delete(threads::delete_thread),
        )
        .route(
            "/v1/projects/{project_id}/threads/{thread_id}/turns",
            get(threads::list_turns),
        )
        // Inline streaming query
        .route(
            "/v1/projects/{project_id}/threads/{thread_id}/query/stream",
            post(stream::stream_query),
        )
        // Jobs
        .route(
            "/v1/projects/{project_id}/threads/{thread_id}/jobs",
            post(jobs::create_job),
        )
        .route(
            "/v1/projects/{project_id}/threads/{thread_id}/jobs/active",
            get(jobs::active_for_thread),
        )
        .route(
            "/v1/projects/{project_id}/jobs/active",
            get(jobs::active_for_project),
        )
        .route("/v1/projects/{project_id}/jobs/{job_id}", get(jobs::get_job))
        .route(
            "/v1/projects/{project_id}/jobs/{job_id}",
            axum::routing::delete(jobs::cancel_job),
        )
        .route(
            "/v1/projects/{project_id}/jobs/{job_id}/start",
            post(jobs::start_job),
        )
        .route(
            "/v1/projects/{project_id}/jobs/{job_id}/progress",
            patch(jobs::progress_job),
        )
        .route(
            "/v1/projects/{project_id}/jobs/{job_id}/complete",
            post(jobs::complete_job),
        )
        .route(
            "/v1/projects/{project_id}/jobs/ws",
            get(ws::project_jobs_ws),
        )
        .route("/v1/projects/{project_id}/jobs/{job_id}/ws", get(ws::job_ws))
        // Resources
        .route(
            "/v1/projects/{project_id}/resources",
            get(resources::list_resources),
        )
        .route(
            "/v1/projects/{project_id}/resources/{resource_id}",
            get(resources::get_resource),
        )
        // Findings
        .route(
            "/v1/projects/{project_id}/findings",
            get(findings::list_findings),
        )
        // Notifications
        .route(
            "/v1/projects/{project_id}/notifications",
            get(notifications::list_notifications),
        )
        .route(
            "/v1/projects/{project_id}/notifications/{notification_id}/read",
            post(notifications::mark_read),
        )
        // Apply API auth middleware to all protected routes.
        .route_layer(middleware::from_fn_with_state(
            state,
            auth::require_api_token,
        ));

    public
        .merge(protected)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
