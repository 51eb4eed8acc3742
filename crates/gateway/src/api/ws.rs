//! WebSocket surface: a per-project subscriber for sidebar-style job
//! tracking, and a per-job late-joiner that snapshots then streams until
//! terminal.

use std::collections::HashSet;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use sa_domain::job_event::JobEvent;
use sa_domain::model::JobStatus;

use crate::runtime::bus::JobUpdate;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage {
    SubscribeThread { thread_id: String },
    UnsubscribeThread { thread_id: String },
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerMessage<'a> {
    ActiveJobs { jobs: &'a [sa_domain::model::Job] },
    JobUpdate { thread_id: String, job_id: String, status: JobStatus },
    Error { message: String },
}

/// `GET /v1/projects/{p}/jobs/ws` — subscribes to every job update in a
/// project; the client narrows to specific threads via `subscribe_thread`.
pub async fn project_jobs_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_project_socket(socket, state, project_id))
}

async fn handle_project_socket(socket: WebSocket, state: AppState, project_id: String) {
    let (mut sink, mut stream) = socket.split();

    let active = state.jobs.active_for_project(&project_id);
    let greeting = ServerMessage::ActiveJobs { jobs: &active };
    if send(&mut sink, &greeting).await.is_err() {
        return;
    }

    let subscribed: Arc<Mutex<HashSet<String>>> = Arc::new(Mutex::new(HashSet::new()));
    let mut rx = state.bus.subscribe_project(&project_id);

    let subscribed_writer = subscribed.clone();
    let writer = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(JobUpdate { thread_id, job_id, status }) => {
                    if !subscribed_writer.lock().contains(&thread_id) {
                        continue;
                    }
                    let msg = ServerMessage::JobUpdate { thread_id, job_id, status };
                    if send(&mut sink, &msg).await.is_err() {
                        break;
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    while let Some(Ok(msg)) = stream.next().await {
        match msg {
            Message::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(ClientMessage::SubscribeThread { thread_id }) => {
                    subscribed.lock().insert(thread_id);
                }
                Ok(ClientMessage::UnsubscribeThread { thread_id }) => {
                    subscribed.lock().remove(&thread_id);
                }
                Err(_) => {}
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    writer.abort();
}

/// `GET /v1/projects/{p}/jobs/{j}/ws` — snapshot then stream a single
/// job's events until terminal, then close.
pub async fn job_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path((project_id, job_id)): Path<(String, String)>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_job_socket(socket, state, project_id, job_id))
}

async fn handle_job_socket(socket: WebSocket, state: AppState, project_id: String, job_id: String) {
    let Some(job) = state.jobs.get(&job_id) else {
        let (mut sink, _) = socket.split();
        let _ = send(&mut sink, &ServerMessage::Error { message: "job not found".into() }).await;
        return;
    };
    if job.project_id != project_id {
        let (mut sink, _) = socket.split();
        let _ = send(&mut sink, &ServerMessage::Error { message: "job not found".into() }).await;
        return;
    }

    state.jobs.touch_poll_watermark(&job_id);
    let (mut sink, mut stream) = socket.split();

    let (snapshot, mut rx) = state.bus.subscribe(&job_id, job.status);
    #[derive(Serialize)]
    struct JobState<'a> {
        #[serde(rename = "type")]
        kind: &'static str,
        snapshot: &'a sa_domain::job_event::JobSnapshot,
    }
    if send(&mut sink, &JobState { kind: "job_state", snapshot: &snapshot }).await.is_err() {
        return;
    }

    let reader = tokio::spawn(async move { while stream.next().await.is_some() {} });

    loop {
        match rx.recv().await {
            Ok(event) => {
                let is_terminal = event.is_terminal();
                #[derive(Serialize)]
                struct JobEventMsg {
                    #[serde(rename = "type")]
                    kind: &'static str,
                    event: JobEvent,
                }
                if send(&mut sink, &JobEventMsg { kind: "job_event", event }).await.is_err() {
                    break;
                }
                if is_terminal {
                    break;
                }
            }
            Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }

    reader.abort();
}

async fn send(
    sink: &mut (impl SinkExt<Message> + Unpin),
    msg: &impl Serialize,
) -> Result<(), ()> {
    let json = serde_json::to_string(msg).map_err(|_| ())?;
    sink.send(Message::Text(json)).await.map_err(|_| ())
}
