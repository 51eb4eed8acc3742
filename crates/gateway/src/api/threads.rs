//! Thread CRUD and turn listing (spec §3 Thread/Turn, §6 ambient surface).

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Json};
use serde::Deserialize;

use sa_domain::error::Error;
use sa_domain::model::Turn;

use crate::api::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateThreadRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub parent_thread_id: Option<String>,
    #[serde(default)]
    pub parent_turn_id: Option<String>,
    #[serde(default)]
    pub context_text: Option<String>,
}

pub async fn create_thread(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Json(body): Json<CreateThreadRequest>,
) -> ApiResult<impl IntoResponse> {
    state
        .projects
        .get(&project_id)
        .ok_or_else(|| Error::NotFound(format!("project {project_id} not found")))?;

    let thread = state.threads.create(
        project_id,
        body.title,
        body.parent_thread_id,
        body.parent_turn_id,
        body.context_text,
    )?;
    Ok(Json(thread))
}

pub async fn list_threads(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> impl IntoResponse {
    Json(state.threads.list_for_project(&project_id))
}

pub async fn delete_thread(
    State(state): State<AppState>,
    Path((project_id, thread_id)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    let thread = state
        .threads
        .get(&thread_id)
        .ok_or_else(|| Error::NotFound(format!("thread {thread_id} not found")))?;
    if thread.project_id != project_id {
        return Err(Error::NotFound(format!("thread {thread_id} not found")).into());
    }
    state.threads.soft_delete(&thread_id)?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

pub async fn list_turns(
    State(state): State<AppState>,
    Path((project_id, thread_id)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    let thread = state
        .threads
        .get(&thread_id)
        .ok_or_else(|| Error::NotFound(format!("thread {thread_id} not found")))?;
    if thread.project_id != project_id {
        return Err(Error::NotFound(format!("thread {thread_id} not found")).into());
    }
    let turns: Vec<Turn> = state.turns.list(&thread_id)?;
    Ok(Json(turns))
}
