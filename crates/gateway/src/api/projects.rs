//! Project CRUD. Not named in the streaming/job surface table but required
//! to bootstrap anything under it — the same ambient-CRUD supplement as
//! `threads::list_threads`.

use axum::extract::State;
use axum::response::{IntoResponse, Json};
use serde::Deserialize;

use sa_domain::model::Project;

use crate::api::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub owner_user_id: String,
    pub name: String,
    #[serde(default)]
    pub instructions: Option<String>,
}

pub async fn create_project(
    State(state): State<AppState>,
    Json(body): Json<CreateProjectRequest>,
) -> ApiResult<impl IntoResponse> {
    let project = state
        .projects
        .create(body.owner_user_id, body.name, body.instructions)?;
    Ok(Json(project))
}

#[derive(Debug, Deserialize)]
pub struct ListProjectsQuery {
    pub owner_user_id: String,
}

pub async fn list_projects(
    State(state): State<AppState>,
    axum::extract::Query(q): axum::extract::Query<ListProjectsQuery>,
) -> impl IntoResponse {
    let projects: Vec<Project> = state.projects.list_for_owner(&q.owner_user_id);
    Json(projects)
}
