//! Job Runner (worker pool).
//!
//! Drives a job from `pending`/`running` to a terminal state by invoking
//! the Agent Loop, mirroring every event to the Event Bus, checkpointing
//! periodically, and on completion writing the assistant Turn and
//! consulting the Notification Policy.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::StreamExt;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use sa_domain::capability::ToolCapability;
use sa_domain::config::{JobsConfig, NotificationsConfig, ToolsConfig};
use sa_domain::job_event::{JobEvent, JobPhaseStatus};
use sa_domain::message::Message;
use sa_domain::model::{Job, JobStatus, Project, Thread, TurnRole};
use sa_domain::tool::ToolContext;
use sa_domain::trace::{JobStartSource, TraceEvent};
use sa_providers::ProviderRegistry;
use sa_threads::{NotificationStore, ProjectStore, ResourceStore, ThreadStore, TurnStore};

use super::agent_loop::{self, AgentLoopInput};
use super::notifications::NotificationPolicy;
use super::{EventBus, JobStore, ToolRegistry};

struct JobHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

pub struct JobRunner {
    job_store: Arc<JobStore>,
    bus: Arc<EventBus>,
    projects: Arc<ProjectStore>,
    threads: Arc<ThreadStore>,
    turns: Arc<TurnStore>,
    resources: Arc<ResourceStore>,
    notifications: Arc<NotificationStore>,
    tool_registry: Arc<ToolRegistry>,
    providers: Arc<ProviderRegistry>,
    jobs_config: JobsConfig,
    tools_config: ToolsConfig,
    notifications_config: NotificationsConfig,
    semaphore: Arc<Semaphore>,
    handles: Mutex<HashMap<String, JobHandle>>,
}

#[allow(clippy::too_many_arguments)]
impl JobRunner {
    pub fn new(
        job_store: Arc<JobStore>,
        bus: Arc<EventBus>,
        projects: Arc<ProjectStore>,
        threads: Arc<ThreadStore>,
        turns: Arc<TurnStore>,
        resources: Arc<ResourceStore>,
        notifications: Arc<NotificationStore>,
        tool_registry: Arc<ToolRegistry>,
        providers: Arc<ProviderRegistry>,
        jobs_config: JobsConfig,
        tools_config: ToolsConfig,
        notifications_config: NotificationsConfig,
    ) -> Arc<Self> {
        let max_concurrent = jobs_config.clamped().max_concurrent;
        Arc::new(Self {
            job_store,
            bus,
            projects,
            threads,
            turns,
            resources,
            notifications,
            tool_registry,
            providers,
            jobs_config,
            tools_config,
            notifications_config,
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            handles: Mutex::new(HashMap::new()),
        })
    }

    /// Hand the job to the worker pool. Idempotent: a job already running
    /// or terminal is a silent no-op (checked again inside `execute`, since
    /// the handle map alone doesn't survive a process restart).
    pub async fn start(self: &Arc<Self>, job_id: String) {
        let mut handles = self.handles.lock().await;
        if handles.contains_key(&job_id) {
            return;
        }
        let cancel = CancellationToken::new();
        let runner = self.clone();
        let task_cancel = cancel.clone();
        let task_job_id = job_id.clone();
        let task = tokio::spawn(async move {
            runner.execute(task_job_id, task_cancel, JobStartSource::Worker).await;
        });
        handles.insert(job_id, JobHandle { cancel, task });
    }

    /// Cancel a running job: trip the cooperative token so the Agent Loop
    /// stops at its next stream poll, then abort the task handle as a hard
    /// backstop. Publishes a terminal cancelled event immediately since the
    /// aborted task may never reach its own terminal handling.
    pub async fn cancel(&self, job_id: &str) -> bool {
        let handle = self.handles.lock().await.remove(job_id);
        let Some(handle) = handle else { return false };
        handle.cancel.cancel();
        handle.task.abort();

        if let Some(job) = self.job_store.try_transition(job_id, JobStatus::Cancelled, |j| {
            j.completed_at = Some(Utc::now());
        }) {
            if job.status == JobStatus::Cancelled {
                self.bus.publish(
                    &job.project_id,
                    &job.thread_id,
                    job_id,
                    JobEvent::Error {
                        message: "job cancelled".into(),
                        cancelled: true,
                    },
                );
                TraceEvent::JobCancelled { job_id: job_id.to_owned() }.emit();
            }
        }
        true
    }

    async fn execute(self: Arc<Self>, job_id: String, cancel: CancellationToken, via: JobStartSource) {
        let _permit = match self.semaphore.acquire().await {
            Ok(permit) => permit,
            Err(_) => return,
        };

        let Some(job) = self.job_store.get(&job_id) else {
            self.handles.lock().await.remove(&job_id);
            return;
        };
        if job.status.is_terminal() {
            self.handles.lock().await.remove(&job_id);
            return;
        }

        let Some(job) = self.job_store.try_transition(&job_id, JobStatus::Running, |j| {
            j.started_at = Some(Utc::now());
        }) else {
            self.handles.lock().await.remove(&job_id);
            return;
        };
        if job.status != JobStatus::Running {
            // Already running (duplicate start) or raced to terminal.
            self.handles.lock().await.remove(&job_id);
            return;
        }
        TraceEvent::JobStarted { job_id: job_id.clone(), via }.emit();

        self.bus.publish(
            &job.project_id,
            &job.thread_id,
            &job_id,
            JobEvent::Status { status: JobPhaseStatus::Running },
        );

        self.run_agent_loop(job, cancel).await;
        self.handles.lock().await.remove(&job_id);
    }

    /// Runs the Agent Loop for a job already transitioned to `running`,
    /// mirroring events to the bus and handling the terminal event. Shared
    /// by the worker path and the inline streaming endpoint (the latter
    /// calls this after performing its own CAS via [`JobStore::try_transition`]).
    pub async fn run_agent_loop(&self, job: Job, cancel: CancellationToken) {
        let project = self.projects.get(&job.project_id);
        let history = self.turns.list(&job.thread_id).unwrap_or_default();
        let ancestors = self.threads.ancestors(&job.thread_id);
        let resources = self.resources.list_for_project(&job.project_id, None, None);

        let system_prompt = build_system_prompt(project.as_ref(), &ancestors);
        let messages: Vec<Message> = history.iter().map(turn_to_message).collect();
        let available = available_capabilities(&self.tools_config);

        let tool_ctx = ToolContext {
            project_id: job.project_id.clone(),
            thread_id: job.thread_id.clone(),
            job_id: job.id.clone(),
            available,
            resources,
        };

        let Some((_, provider)) = self.providers.iter().next() else {
            self.finish_error(&job, "no LLM provider configured".into(), false).await;
            return;
        };

        let input = AgentLoopInput {
            system_prompt,
            history: messages,
            question: job.question.clone(),
            tool_ctx,
        };

        let mut stream = agent_loop::run(
            provider.clone(),
            self.tool_registry.clone(),
            input,
            self.jobs_config.max_loop_iterations,
            cancel,
        );

        let mut last_checkpoint_len = 0usize;
        let mut final_event = None;

        while let Some(event) = stream.next().await {
            let is_terminal = event.is_terminal();
            self.bus.publish(&job.project_id, &job.thread_id, &job.id, event.clone());

            if let JobEvent::Usage { input_tokens, output_tokens, .. } = &event {
                self.job_store.update(&job.id, |j| {
                    j.input_tokens = *input_tokens;
                    j.output_tokens = *output_tokens;
                });
            }

            let should_checkpoint = matches!(event, JobEvent::Sources { .. } | JobEvent::Usage { .. });
            if matches!(event, JobEvent::Chunk { .. }) || should_checkpoint {
                if let Some(snapshot) = self.bus.snapshot(&job.id) {
                    let grown = snapshot.content.len().saturating_sub(last_checkpoint_len);
                    if should_checkpoint || grown >= self.jobs_config.checkpoint_bytes {
                        last_checkpoint_len = snapshot.content.len();
                        let content = snapshot.content.clone();
                        self.job_store.update(&job.id, |j| j.partial_response = content);
                    }
                }
            }

            if is_terminal {
                final_event = Some(event);
                break;
            }
        }

        match final_event {
            Some(JobEvent::Done) => self.finish_done(&job).await,
            Some(JobEvent::Error { message, cancelled }) => self.finish_error(&job, message, cancelled).await,
            _ => self.finish_error(&job, "agent loop ended without a terminal event".into(), false).await,
        }
    }

    async fn finish_done(&self, job: &Job) {
        let snapshot = self.bus.snapshot(&job.id).unwrap_or_else(|| {
            sa_domain::job_event::JobSnapshot::new(JobStatus::Completed)
        });

        let tool_calls = serde_json::to_value(&snapshot.activity).ok();
        let sources = serde_json::to_value(&snapshot.sources).ok();

        let turn = match self.turns.append(
            &job.thread_id,
            TurnRole::Assistant,
            snapshot.content.clone(),
            sources.clone(),
            tool_calls,
        ) {
            Ok(turn) => turn,
            Err(e) => {
                self.finish_error(job, format!("failed to persist assistant turn: {e}"), false).await;
                return;
            }
        };

        let now = Utc::now();
        let duration_ms = job
            .started_at
            .map(|started| (now - started).num_milliseconds().max(0) as u64);
        let content = snapshot.content.clone();
        let turn_id = turn.id.clone();

        let updated = self.job_store.try_transition(&job.id, JobStatus::Completed, |j| {
            j.completed_at = Some(now);
            j.assistant_turn_id = Some(turn_id.clone());
            j.partial_response = content.clone();
            j.sources = sources.clone();
            j.duration_ms = duration_ms;
        });

        TraceEvent::JobCompleted {
            job_id: job.id.clone(),
            duration_ms: duration_ms.unwrap_or(0),
            assistant_turn_id: turn.id.clone(),
        }
        .emit();

        if let Some(updated) = updated {
            let policy = NotificationPolicy::new(&self.notifications_config, &self.notifications);
            if let Err(e) = policy.on_completed(&updated, now) {
                tracing::warn!(job_id = %job.id, error = %e, "notification policy failed on completion");
            }
        }
    }

    async fn finish_error(&self, job: &Job, message: String, cancelled: bool) {
        let next_status = if cancelled { JobStatus::Cancelled } else { JobStatus::Failed };
        let now = Utc::now();
        let error_message = message.clone();

        let updated = self.job_store.try_transition(&job.id, next_status, |j| {
            j.completed_at = Some(now);
            j.error_message = Some(error_message.clone());
        });

        if cancelled {
            TraceEvent::JobCancelled { job_id: job.id.clone() }.emit();
        } else {
            TraceEvent::JobFailed { job_id: job.id.clone(), reason: message }.emit();
            if let Some(updated) = &updated {
                let policy = NotificationPolicy::new(&self.notifications_config, &self.notifications);
                if let Err(e) = policy.on_failed(updated) {
                    tracing::warn!(job_id = %job.id, error = %e, "notification policy failed on failure");
                }
            }
        }
    }
}

fn available_capabilities(config: &ToolsConfig) -> HashSet<ToolCapability> {
    let mut set = HashSet::new();
    // Local document retrieval has no enable flag of its own; it's gated
    // purely by whether the project has indexed resources.
    set.insert(ToolCapability::Retriever);
    if config.web_search.enabled {
        set.insert(ToolCapability::WebSearch);
    }
    if config.vision.enabled {
        set.insert(ToolCapability::VisionClient);
    }
    if config.data_sandbox.enabled {
        set.insert(ToolCapability::DataSandbox);
    }
    set
}

fn turn_to_message(turn: &sa_domain::model::Turn) -> Message {
    match turn.role {
        TurnRole::User => Message::user(turn.content.clone()),
        TurnRole::Assistant => Message::assistant(turn.content.clone()),
    }
}

fn build_system_prompt(project: Option<&Project>, ancestors: &[Thread]) -> String {
    let mut sections = Vec::new();
    if let Some(project) = project {
        if let Some(instructions) = &project.instructions {
            sections.push(instructions.clone());
        }
    }
    for ancestor in ancestors.iter().rev() {
        if let Some(context_text) = &ancestor.context_text {
            sections.push(format!("Context inherited from parent thread: {context_text}"));
        }
    }
    sections.join("\n\n")
}

/// Idle-worker pruning: sweeps finished handles out of the map. Workers
/// remove themselves on completion; this is a periodic safety net for
/// handles that panicked rather than returning cleanly.
pub async fn prune_idle_handles(runner: &Arc<JobRunner>) {
    let mut handles = runner.handles.lock().await;
    handles.retain(|_, h| !h.task.is_finished());
}

pub fn spawn_pruning_task(runner: Arc<JobRunner>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            prune_idle_handles(&runner).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sa_domain::capability::LlmCapabilities;
    use sa_domain::config::BusConfig;
    use sa_domain::error::Result;
    use sa_domain::model::JobStatus;
    use sa_domain::stream::{BoxStream, StreamEvent, Usage};
    use sa_providers::{ChatRequest, ChatResponse, EmbeddingsRequest, EmbeddingsResponse, LlmProvider};
    use sa_threads::FindingStore;
    use std::collections::HashMap;

    struct StubProvider {
        capabilities: LlmCapabilities,
    }

    #[async_trait]
    impl LlmProvider for StubProvider {
        async fn chat(&self, _req: ChatRequest) -> Result<ChatResponse> {
            unimplemented!()
        }

        async fn chat_stream(&self, _req: ChatRequest) -> Result<BoxStream<'static, Result<StreamEvent>>> {
            let events: Vec<Result<StreamEvent>> = vec![
                Ok(StreamEvent::Token { text: "The answer is 42.".into() }),
                Ok(StreamEvent::Done {
                    usage: Some(Usage { prompt_tokens: 12, completion_tokens: 6, total_tokens: 18 }),
                    finish_reason: Some("stop".into()),
                }),
            ];
            Ok(Box::pin(futures_util::stream::iter(events)))
        }

        async fn embeddings(&self, _req: EmbeddingsRequest) -> Result<EmbeddingsResponse> {
            unimplemented!()
        }

        fn capabilities(&self) -> &LlmCapabilities {
            &self.capabilities
        }

        fn provider_id(&self) -> &str {
            "stub"
        }
    }

    fn build_runner(dir: &std::path::Path) -> Arc<JobRunner> {
        let job_store = Arc::new(JobStore::new(dir).unwrap());
        let bus = Arc::new(EventBus::new(&BusConfig::default()));
        let projects = Arc::new(ProjectStore::new(dir).unwrap());
        let threads = Arc::new(ThreadStore::new(dir).unwrap());
        let turns = Arc::new(TurnStore::new(dir).unwrap());
        let resources = Arc::new(ResourceStore::new(dir).unwrap());
        let notifications = Arc::new(NotificationStore::new(dir).unwrap());
        let findings = Arc::new(FindingStore::new(dir).unwrap());
        let tool_registry = Arc::new(ToolRegistry::new(&Default::default(), findings).unwrap());

        let mut providers: HashMap<String, Arc<dyn LlmProvider>> = HashMap::new();
        providers.insert(
            "stub".into(),
            Arc::new(StubProvider { capabilities: LlmCapabilities::default() }) as Arc<dyn LlmProvider>,
        );
        let providers = Arc::new(ProviderRegistry::from_providers(providers));

        JobRunner::new(
            job_store,
            bus,
            projects,
            threads,
            turns,
            resources,
            notifications,
            tool_registry,
            providers,
            JobsConfig::default(),
            ToolsConfig::default(),
            NotificationsConfig::default(),
        )
    }

    fn pending_job(project_id: &str, thread_id: &str, question: &str) -> Job {
        let now = Utc::now();
        Job {
            id: uuid::Uuid::new_v4().to_string(),
            project_id: project_id.into(),
            thread_id: thread_id.into(),
            status: JobStatus::Pending,
            question: question.into(),
            context_only: false,
            started_at: None,
            completed_at: None,
            assistant_turn_id: None,
            partial_response: String::new(),
            sources: None,
            error_message: None,
            poll_watermark: now,
            input_tokens: 0,
            output_tokens: 0,
            duration_ms: None,
            created_at: now,
        }
    }

    #[tokio::test]
    async fn run_job_completes_and_writes_assistant_turn() {
        let dir = tempfile::tempdir().unwrap();
        let runner = build_runner(dir.path());

        let project = runner.projects.create("u1".into(), "proj".into(), None).unwrap();
        let thread = runner
            .threads
            .create(project.id.clone(), Some("t".into()), None, None, None)
            .unwrap();
        let job = pending_job(&project.id, &thread.id, "What is the answer?");
        let job_id = job.id.clone();
        runner.job_store.insert(job);

        runner.start(job_id.clone()).await;

        let mut job = runner.job_store.get(&job_id).unwrap();
        for _ in 0..50 {
            if job.status.is_terminal() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            job = runner.job_store.get(&job_id).unwrap();
        }

        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.assistant_turn_id.is_some());
        assert!(job.partial_response.contains("42"));

        let turns = runner.turns.list(&thread.id).unwrap();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].role, TurnRole::Assistant);
    }

    #[tokio::test]
    async fn run_job_fails_cleanly_with_no_providers() {
        let dir = tempfile::tempdir().unwrap();
        let job_store = Arc::new(JobStore::new(dir.path()).unwrap());
        let bus = Arc::new(EventBus::new(&BusConfig::default()));
        let projects = Arc::new(ProjectStore::new(dir.path()).unwrap());
        let threads = Arc::new(ThreadStore::new(dir.path()).unwrap());
        let turns = Arc::new(TurnStore::new(dir.path()).unwrap());
        let resources = Arc::new(ResourceStore::new(dir.path()).unwrap());
        let notifications = Arc::new(NotificationStore::new(dir.path()).unwrap());
        let findings = Arc::new(FindingStore::new(dir.path()).unwrap());
        let tool_registry = Arc::new(ToolRegistry::new(&Default::default(), findings).unwrap());
        let providers = Arc::new(ProviderRegistry::from_providers(HashMap::new()));

        let runner = JobRunner::new(
            job_store,
            bus,
            projects.clone(),
            threads.clone(),
            turns,
            resources,
            notifications,
            tool_registry,
            providers,
            JobsConfig::default(),
            ToolsConfig::default(),
            NotificationsConfig::default(),
        );

        let project = projects.create("u1".into(), "proj".into(), None).unwrap();
        let thread = threads.create(project.id.clone(), Some("t".into()), None, None, None).unwrap();
        let job = pending_job(&project.id, &thread.id, "hello");
        let job_id = job.id.clone();
        runner.job_store.insert(job);

        runner.start(job_id.clone()).await;

        let mut job = runner.job_store.get(&job_id).unwrap();
        for _ in 0..50 {
            if job.status.is_terminal() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            job = runner.job_store.get(&job_id).unwrap();
        }

        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error_message.unwrap().contains("no LLM provider"));
    }

    #[tokio::test]
    async fn duplicate_start_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let runner = build_runner(dir.path());
        let project = runner.projects.create("u1".into(), "proj".into(), None).unwrap();
        let thread = runner
            .threads
            .create(project.id.clone(), Some("t".into()), None, None, None)
            .unwrap();
        let job = pending_job(&project.id, &thread.id, "hi");
        let job_id = job.id.clone();
        runner.job_store.insert(job);

        runner.start(job_id.clone()).await;
        runner.start(job_id.clone()).await;

        let mut job = runner.job_store.get(&job_id).unwrap();
        for _ in 0..50 {
            if job.status.is_terminal() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            job = runner.job_store.get(&job_id).unwrap();
        }
        assert_eq!(job.status, JobStatus::Completed);

        let turns = runner.turns.list(&thread.id).unwrap();
        assert_eq!(turns.len(), 1, "duplicate start must not produce a second turn");
    }
}
