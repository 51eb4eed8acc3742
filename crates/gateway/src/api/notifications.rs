//! Notification listing and read-marking (spec §3 Notification, §5
//! Notification Policy).

use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Json};
use serde::Deserialize;

use crate::api::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListNotificationsQuery {
    #[serde(default)]
    pub unread_only: bool,
}

pub async fn list_notifications(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Query(q): Query<ListNotificationsQuery>,
) -> impl IntoResponse {
    let notifications = state
        .notifications
        .list_for_project(&project_id, q.unread_only);
    Json(notifications)
}

pub async fn mark_read(
    State(state): State<AppState>,
    Path((_project_id, notification_id)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    let notification = state.notifications.mark_read(&notification_id)?;
    Ok(Json(notification))
}
