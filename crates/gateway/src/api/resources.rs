//! Resource listing (spec §3 Resource). Ingestion/upload pipelines that
//! populate resources are out of scope here — this surface only reads
//! what `ResourceStore` already holds.

use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Json};
use serde::Deserialize;

use sa_domain::error::Error;
use sa_domain::model::{ResourceStatus, ResourceType};

use crate::api::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListResourcesQuery {
    #[serde(default)]
    pub kind: Option<ResourceType>,
    #[serde(default)]
    pub status: Option<ResourceStatus>,
}

pub async fn list_resources(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Query(q): Query<ListResourcesQuery>,
) -> impl IntoResponse {
    let resources = state
        .resources
        .list_for_project(&project_id, q.kind, q.status);
    Json(resources)
}

pub async fn get_resource(
    State(state): State<AppState>,
    Path((project_id, resource_id)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    let resource = state
        .resources
        .get(&resource_id)
        .ok_or_else(|| Error::NotFound(format!("resource {resource_id} not found")))?;
    if resource.project_id != project_id {
        return Err(Error::NotFound(format!("resource {resource_id} not found")).into());
    }
    Ok(Json(resource))
}
