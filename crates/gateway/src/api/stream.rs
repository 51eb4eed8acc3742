//! `POST /v1/projects/{p}/threads/{t}/query/stream` — create a job and
//! drive it through [`JobRunner::run_agent_loop`] inline, forwarding bus
//! events to the client as SSE frames as they're produced.

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Json};
use chrono::Utc;
use futures_util::stream::Stream;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use sa_domain::error::Error;
use sa_domain::job_event::JobEvent;
use sa_domain::model::{Job, JobStatus, TurnRole};
use sa_domain::trace::{JobStartSource, TraceEvent};

use crate::api::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct StreamQueryRequest {
    pub question: String,
}

pub async fn stream_query(
    State(state): State<AppState>,
    Path((project_id, thread_id)): Path<(String, String)>,
    Json(body): Json<StreamQueryRequest>,
) -> ApiResult<impl IntoResponse> {
    let thread = state
        .threads
        .get(&thread_id)
        .ok_or_else(|| Error::NotFound(format!("thread {thread_id} not found")))?;
    if thread.project_id != project_id {
        return Err(Error::NotFound(format!("thread {thread_id} not found")).into());
    }

    state
        .turns
        .append(&thread_id, TurnRole::User, body.question.clone(), None, None)?;

    let job = state.jobs.insert(Job {
        id: uuid::Uuid::new_v4().to_string(),
        project_id: project_id.clone(),
        thread_id: thread_id.clone(),
        status: JobStatus::Pending,
        question: body.question,
        context_only: false,
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

    TraceEvent::JobCreated {
        job_id: job.id.clone(),
        thread_id: thread_id.clone(),
        context_only: job.context_only,
    }
    .emit();

    let Some(running) = state.jobs.try_transition(&job.id, JobStatus::Running, |j| {
        j.started_at = Some(Utc::now());
    }) else {
        return Err(Error::NotFound(format!("job {} not found", job.id)).into());
    };
    TraceEvent::JobStarted { job_id: running.id.clone(), via: JobStartSource::InlineStream }.emit();

    let (snapshot, rx) = state.bus.subscribe(&running.id, running.status);
    state
        .bus
        .publish_job_update(&project_id, &thread_id, &running.id, running.status);

    let cancel = CancellationToken::new();
    let runner = state.job_runner.clone();
    let driver_job = running.clone();
    let driver_cancel = cancel.clone();
    tokio::spawn(async move {
        runner.run_agent_loop(driver_job, driver_cancel).await;
    });

    let stream = make_job_event_stream(snapshot, rx);
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn make_job_event_stream(
    snapshot: sa_domain::job_event::JobSnapshot,
    mut rx: tokio::sync::broadcast::Receiver<JobEvent>,
) -> impl Stream<Item = Result<Event, std::convert::Infallible>> {
    async_stream::stream! {
        let data = serde_json::to_string(&snapshot).unwrap_or_default();
        yield Ok(Event::default().event("job.snapshot").data(data));

        loop {
            match rx.recv().await {
                Ok(event) => {
                    let is_terminal = event.is_terminal();
                    let event_type = event_type_of(&event);
                    let data = serde_json::to_string(&event).unwrap_or_default();
                    yield Ok(Event::default().event(event_type).data(data));
                    if is_terminal {
                        break;
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    let msg = format!("{{\"warning\":\"missed {n} events\"}}");
                    yield Ok(Event::default().event("warning").data(msg));
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}

fn event_type_of(event: &JobEvent) -> &'static str {
    match event {
        JobEvent::Plan { .. } => "plan",
        JobEvent::Status { .. } => "status",
        JobEvent::ToolCall { .. } => "tool_call",
        JobEvent::ToolResult { .. } => "tool_result",
        JobEvent::Sources { .. } => "sources",
        JobEvent::Thinking { .. } => "thinking",
        JobEvent::Chunk { .. } => "chunk",
        JobEvent::Usage { .. } => "usage",
        JobEvent::Done => "done",
        JobEvent::Error { .. } => "error",
    }
}
