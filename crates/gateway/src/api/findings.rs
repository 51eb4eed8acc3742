//! Finding listing (spec §3 Finding — durable tool-result records a
//! thread's tool calls append to, independent of the job that produced
//! them).

use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Json};
use serde::Deserialize;

use crate::api::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListFindingsQuery {
    #[serde(default)]
    pub thread_id: Option<String>,
}

pub async fn list_findings(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Query(q): Query<ListFindingsQuery>,
) -> ApiResult<impl IntoResponse> {
    let findings = state
        .findings
        .list_for_project(&project_id, q.thread_id.as_deref())?
        .into_iter()
        .filter(|f| f.project_id == project_id)
        .collect::<Vec<_>>();
    Ok(Json(findings))
}
