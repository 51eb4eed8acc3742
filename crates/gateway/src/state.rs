use std::sync::Arc;

use sa_domain::config::Config;
use sa_providers::ProviderRegistry;
use sa_threads::{
    FindingStore, NotificationStore, ProjectStore, ResourceStore, ThreadStore, TurnStore,
};
use sha2::{Digest, Sha256};

use crate::runtime::{EventBus, JobRunner, JobStore, ToolRegistry};

/// Shared application state passed to all API handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub providers: Arc<ProviderRegistry>,

    pub projects: Arc<ProjectStore>,
    pub threads: Arc<ThreadStore>,
    pub turns: Arc<TurnStore>,
    pub resources: Arc<ResourceStore>,
    pub notifications: Arc<NotificationStore>,
    pub findings: Arc<FindingStore>,

    pub bus: Arc<EventBus>,
    pub jobs: Arc<JobStore>,
    pub tool_registry: Arc<ToolRegistry>,
    pub job_runner: Arc<JobRunner>,

    /// SHA-256 hash of the API bearer token. `None` means the token's env
    /// var was unset at startup — the protected route tree rejects every
    /// request rather than running open.
    pub api_token_hash: Option<Vec<u8>>,
}

impl AppState {
    pub fn build(config: Config) -> sa_domain::error::Result<Self> {
        let config = Arc::new(config);
        let state_dir = &config.persistence.state_dir;

        let providers = Arc::new(ProviderRegistry::from_config(&config.llm)?);

        let projects = Arc::new(ProjectStore::new(state_dir)?);
        let threads = Arc::new(ThreadStore::new(state_dir)?);
        let turns = Arc::new(TurnStore::new(state_dir)?);
        let resources = Arc::new(ResourceStore::new(state_dir)?);
        let notifications = Arc::new(NotificationStore::new(state_dir)?);
        let findings = Arc::new(FindingStore::new(state_dir)?);

        let bus = Arc::new(EventBus::new(&config.bus));
        let jobs = Arc::new(JobStore::new(state_dir)?);
        let tool_registry = Arc::new(ToolRegistry::new(&config.tools, findings.clone())?);

        let job_runner = JobRunner::new(
            jobs.clone(),
            bus.clone(),
            projects.clone(),
            threads.clone(),
            turns.clone(),
            resources.clone(),
            notifications.clone(),
            tool_registry.clone(),
            providers.clone(),
            config.jobs.clone(),
            config.tools.clone(),
            config.notifications.clone(),
        );

        let api_token_hash = std::env::var(&config.server.auth.token_env)
            .ok()
            .map(|token| Sha256::digest(token.as_bytes()).to_vec());

        Ok(Self {
            config,
            providers,
            projects,
            threads,
            turns,
            resources,
            notifications,
            findings,
            bus,
            jobs,
            tool_registry,
            job_runner,
            api_token_hash,
        })
    }
}
