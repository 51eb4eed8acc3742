//! Job lifecycle: create, start, poll, checkpoint, complete, cancel.
//!
//! `start`/`progress`/`complete` let a caller drive the agent loop itself
//! (e.g. a client doing its own model calls) instead of letting the
//! gateway run [`crate::runtime::job_runner::JobRunner`] end to end — the
//! inline streaming endpoint in `stream.rs` is the latter path.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Json};
use chrono::Utc;
use serde::Deserialize;

use sa_domain::error::Error;
use sa_domain::job_event::JobEvent;
use sa_domain::model::{Job, JobStatus, TurnRole};
use sa_domain::trace::TraceEvent;

use crate::api::error::ApiResult;
use crate::runtime::job_runner::JobRunner;
use crate::runtime::notifications::NotificationPolicy;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateJobRequest {
    pub question: String,
    #[serde(default)]
    pub context_only: bool,
    #[serde(default)]
    pub start_immediately: bool,
}

pub async fn create_job(
    State(state): State<AppState>,
    Path((project_id, thread_id)): Path<(String, String)>,
    Json(body): Json<CreateJobRequest>,
) -> ApiResult<impl IntoResponse> {
    let thread = state
        .threads
        .get(&thread_id)
        .ok_or_else(|| Error::NotFound(format!("thread {thread_id} not found")))?;
    if thread.project_id != project_id {
        return Err(Error::NotFound(format!("thread {thread_id} not found")).into());
    }

    if !body.context_only {
        state
            .turns
            .append(&thread_id, TurnRole::User, body.question.clone(), None, None)?;
    }

    let job = state.jobs.insert(Job {
        id: uuid::Uuid::new_v4().to_string(),
        project_id,
        thread_id: thread_id.clone(),
        status: JobStatus::Pending,
        question: body.question,
        context_only: body.context_only,
        started_at: None,
        completed_at: None,
        assistant_turn_id: None,
        partial_response: String::new(),
        sources: None,
        error_message: None,
        poll_watermark: Utc::now(),
        input_tokens: 0,
        output_tokens: 0,
        duration_ms: None,
        created_at: Utc::now(),
    });

    state.bus.ensure_job(&job.id, job.status);
    state
        .bus
        .publish_job_update(&job.project_id, &thread_id, &job.id, job.status);
    state.threads.touch(&thread_id).ok();

    TraceEvent::JobCreated {
        job_id: job.id.clone(),
        thread_id: thread_id.clone(),
        context_only: job.context_only,
    }
    .emit();

    if body.start_immediately {
        state.job_runner.clone().start(job.id.clone()).await;
    }

    Ok(Json(job))
}

pub async fn get_job(
    State(state): State<AppState>,
    Path((_project_id, job_id)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    let job = state
        .jobs
        .get(&job_id)
        .ok_or_else(|| Error::NotFound(format!("job {job_id} not found")))?;
    state.jobs.touch_poll_watermark(&job_id);
    Ok(Json(job))
}

pub async fn active_for_thread(
    State(state): State<AppState>,
    Path((_project_id, thread_id)): Path<(String, String)>,
) -> impl IntoResponse {
    Json(state.jobs.active_for_thread(&thread_id))
}

pub async fn active_for_project(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> impl IntoResponse {
    Json(state.jobs.active_for_project(&project_id))
}

pub async fn start_job(
    State(state): State<AppState>,
    Path((_project_id, job_id)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    let job = state
        .jobs
        .get(&job_id)
        .ok_or_else(|| Error::NotFound(format!("job {job_id} not found")))?;
    if job.status.is_terminal() {
        return Err(Error::Conflict(format!("job {job_id} already finished")).into());
    }
    let runner: Arc<JobRunner> = state.job_runner.clone();
    runner.start(job_id).await;
    Ok(axum::http::StatusCode::ACCEPTED)
}

#[derive(Debug, Deserialize)]
pub struct ProgressRequest {
    pub partial_response: String,
    #[serde(default)]
    pub sources: Option<serde_json::Value>,
}

/// `PATCH .../jobs/{j}/progress` — checkpoint for a caller-driven job.
/// Write-only; does not touch status.
pub async fn progress_job(
    State(state): State<AppState>,
    Path((_project_id, job_id)): Path<(String, String)>,
    Json(body): Json<ProgressRequest>,
) -> ApiResult<impl IntoResponse> {
    state
        .jobs
        .get(&job_id)
        .ok_or_else(|| Error::NotFound(format!("job {job_id} not found")))?;

    state.jobs.update(&job_id, |j| {
        j.partial_response = body.partial_response.clone();
        if body.sources.is_some() {
            j.sources = body.sources.clone();
        }
    });
    Ok(axum::http::StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct CompleteJobRequest {
    pub content: String,
    #[serde(default)]
    pub sources: Option<serde_json::Value>,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// `POST .../jobs/{j}/complete` — terminal write for a caller-driven job
/// that never ran through [`JobRunner::run_agent_loop`], so there is no
/// bus snapshot to read back; the request body carries the final state
/// directly.
pub async fn complete_job(
    State(state): State<AppState>,
    Path((_project_id, job_id)): Path<(String, String)>,
    Json(body): Json<CompleteJobRequest>,
) -> ApiResult<impl IntoResponse> {
    let job = state
        .jobs
        .get(&job_id)
        .ok_or_else(|| Error::NotFound(format!("job {job_id} not found")))?;
    if job.status.is_terminal() {
        return Err(Error::Conflict(format!("job {job_id} already finished")).into());
    }

    if let Some(message) = body.error_message {
        let updated = state.jobs.try_transition(&job_id, JobStatus::Failed, |j| {
            j.completed_at = Some(Utc::now());
            j.error_message = Some(message.clone());
        });
        state.bus.publish(
            &job.project_id,
            &job.thread_id,
            &job_id,
            JobEvent::Error { message: message.clone(), cancelled: false },
        );
        TraceEvent::JobFailed { job_id: job_id.clone(), reason: message }.emit();
        if let Some(updated) = &updated {
            let policy = NotificationPolicy::new(&state.config.notifications, &state.notifications);
            policy.on_failed(updated).ok();
        }
        return Ok(Json(updated.ok_or_else(|| Error::NotFound(format!("job {job_id} not found")))?));
    }

    let turn = state.turns.append(
        &job.thread_id,
        TurnRole::Assistant,
        body.content.clone(),
        body.sources.clone(),
        None,
    )?;

    let now = Utc::now();
    let duration_ms = job
        .started_at
        .map(|started| (now - started).num_milliseconds().max(0) as u64);
    let turn_id = turn.id.clone();
    let content = body.content.clone();
    let sources = body.sources.clone();

    let updated = state.jobs.try_transition(&job_id, JobStatus::Completed, |j| {
        j.completed_at = Some(now);
        j.assistant_turn_id = Some(turn_id.clone());
        j.partial_response = content.clone();
        j.sources = sources.clone();
        j.duration_ms = duration_ms;
    });

    state.bus.publish(
        &job.project_id,
        &job.thread_id,
        &job_id,
        JobEvent::Done,
    );
    TraceEvent::JobCompleted {
        job_id: job_id.clone(),
        duration_ms: duration_ms.unwrap_or(0),
        assistant_turn_id: turn.id.clone(),
    }
    .emit();

    if let Some(updated) = &updated {
        let policy = NotificationPolicy::new(&state.config.notifications, &state.notifications);
        policy.on_completed(updated, now).ok();
    }

    Ok(Json(updated.ok_or_else(|| Error::NotFound(format!("job {job_id} not found")))?))
}

pub async fn cancel_job(
    State(state): State<AppState>,
    Path((_project_id, job_id)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    let job = state
        .jobs
        .get(&job_id)
        .ok_or_else(|| Error::NotFound(format!("job {job_id} not found")))?;
    if job.status.is_terminal() {
        return Ok(axum::http::StatusCode::NO_CONTENT);
    }

    let handled = state.job_runner.cancel(&job_id).await;
    if !handled {
        if let Some(cancelled) = state.jobs.try_transition(&job_id, JobStatus::Cancelled, |j| {
            j.completed_at = Some(Utc::now());
        }) {
            if cancelled.status == JobStatus::Cancelled {
                state.bus.publish(
                    &cancelled.project_id,
                    &cancelled.thread_id,
                    &job_id,
                    JobEvent::Error { message: "job cancelled".into(), cancelled: true },
                );
                TraceEvent::JobCancelled { job_id: job_id.clone() }.emit();
            }
        }
    }

    Ok(axum::http::StatusCode::NO_CONTENT)
}
