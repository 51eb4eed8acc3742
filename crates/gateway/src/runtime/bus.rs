//! In-process Event Bus.
//!
//! One broadcast channel + one state snapshot per job, a per-project
//! terse-update channel, and a single global channel. Mirrors the
//! teacher's per-run broadcast channel in `runs.rs`, generalised to three
//! tiers and to applying state mutations atomically with publish.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::broadcast;

use sa_domain::config::BusConfig;
use sa_domain::job_event::{JobEvent, JobSnapshot};
use sa_domain::model::JobStatus;

/// Terse per-project update, used by sidebar indicators.
#[derive(Debug, Clone, Serialize)]
pub struct JobUpdate {
    pub thread_id: String,
    pub job_id: String,
    pub status: JobStatus,
}

/// Cross-project global update.
#[derive(Debug, Clone, Serialize)]
pub struct GlobalJobUpdate {
    pub project_id: String,
    pub thread_id: String,
    pub job_id: String,
    pub status: JobStatus,
}

struct JobChannel {
    tx: broadcast::Sender<JobEvent>,
    snapshot: JobSnapshot,
    expires_at: Instant,
}

/// In-process pub/sub + state-snapshot store for jobs.
pub struct EventBus {
    jobs: RwLock<HashMap<String, JobChannel>>,
    project_channels: RwLock<HashMap<String, broadcast::Sender<JobUpdate>>>,
    global_tx: broadcast::Sender<GlobalJobUpdate>,
    snapshot_ttl: Duration,
    channel_capacity: usize,
    activity_seq: AtomicU64,
}

impl EventBus {
    pub fn new(config: &BusConfig) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            project_channels: RwLock::new(HashMap::new()),
            global_tx: broadcast::channel(config.channel_capacity).0,
            snapshot_ttl: Duration::from_secs(config.snapshot_ttl_secs),
            channel_capacity: config.channel_capacity,
            activity_seq: AtomicU64::new(0),
        }
    }

    fn next_activity_id(&self) -> String {
        self.activity_seq.fetch_add(1, Ordering::Relaxed).to_string()
    }

    /// Create the bus-side state for a newly created job. Idempotent if
    /// called twice for the same id (refreshes the TTL only).
    pub fn ensure_job(&self, job_id: &str, status: JobStatus) {
        let mut jobs = self.jobs.write();
        jobs.entry(job_id.to_owned()).or_insert_with(|| JobChannel {
            tx: broadcast::channel(self.channel_capacity).0,
            snapshot: JobSnapshot::new(status),
            expires_at: Instant::now() + self.snapshot_ttl,
        });
    }

    /// Publish one event for a job: apply its state mutation, broadcast the
    /// raw event, refresh the TTL, and mirror terse updates on the project
    /// and global channels. `project_id`/`thread_id` identify the owning
    /// scope for the terse channels.
    pub fn publish(&self, project_id: &str, thread_id: &str, job_id: &str, event: JobEvent) {
        let now = Utc::now();
        let status = {
            let mut jobs = self.jobs.write();
            let entry = jobs.entry(job_id.to_owned()).or_insert_with(|| JobChannel {
                tx: broadcast::channel(self.channel_capacity).0,
                snapshot: JobSnapshot::new(JobStatus::Pending),
                expires_at: Instant::now() + self.snapshot_ttl,
            });

            entry.snapshot.apply(&event, now, || self.next_activity_id());
            entry.expires_at = Instant::now() + self.snapshot_ttl;
            let status = entry.snapshot.status;
            let _ = entry.tx.send(event);
            status
        };

        self.publish_job_update(project_id, thread_id, job_id, status);
    }

    /// Mirror a terse status update without touching the job's snapshot
    /// (e.g. on the `pending -> running` transition before the first
    /// Agent Loop event arrives).
    pub fn publish_job_update(&self, project_id: &str, thread_id: &str, job_id: &str, status: JobStatus) {
        let update = JobUpdate {
            thread_id: thread_id.to_owned(),
            job_id: job_id.to_owned(),
            status,
        };
        let projects = self.project_channels.read();
        if let Some(tx) = projects.get(project_id) {
            let _ = tx.send(update);
        }
        drop(projects);

        let _ = self.global_tx.send(GlobalJobUpdate {
            project_id: project_id.to_owned(),
            thread_id: thread_id.to_owned(),
            job_id: job_id.to_owned(),
            status,
        });
    }

    /// Subscribe to a job's live event stream. Returns the snapshot at
    /// attach time plus a receiver for events strictly after it.
    pub fn subscribe(&self, job_id: &str, status_if_absent: JobStatus) -> (JobSnapshot, broadcast::Receiver<JobEvent>) {
        let mut jobs = self.jobs.write();
        let entry = jobs.entry(job_id.to_owned()).or_insert_with(|| JobChannel {
            tx: broadcast::channel(self.channel_capacity).0,
            snapshot: JobSnapshot::new(status_if_absent),
            expires_at: Instant::now() + self.snapshot_ttl,
        });
        (entry.snapshot.clone(), entry.tx.subscribe())
    }

    pub fn snapshot(&self, job_id: &str) -> Option<JobSnapshot> {
        self.jobs.read().get(job_id).map(|e| e.snapshot.clone())
    }

    pub fn subscribe_project(&self, project_id: &str) -> broadcast::Receiver<JobUpdate> {
        let mut projects = self.project_channels.write();
        let tx = projects
            .entry(project_id.to_owned())
            .or_insert_with(|| broadcast::channel(self.channel_capacity).0);
        tx.subscribe()
    }

    pub fn subscribe_global(&self) -> broadcast::Receiver<GlobalJobUpdate> {
        self.global_tx.subscribe()
    }

    /// Drop bus state for a job, typically after a grace period following
    /// a terminal event.
    pub fn clear(&self, job_id: &str) {
        self.jobs.write().remove(job_id);
    }

    /// Sweep jobs whose snapshot TTL has elapsed. Call periodically from a
    /// background task; cheap no-op when nothing has expired.
    pub fn prune_expired(&self) {
        let now = Instant::now();
        self.jobs.write().retain(|_, chan| chan.expires_at > now);
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use sa_domain::job_event::JobPhaseStatus;

    fn bus() -> EventBus {
        EventBus::new(&BusConfig {
            snapshot_ttl_secs: 3600,
            channel_capacity: 64,
        })
    }

    #[test]
    fn fresh_subscriber_gets_initializing_snapshot() {
        let bus = bus();
        let (snap, _rx) = bus.subscribe("j1", JobStatus::Pending);
        assert_eq!(snap.status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn subscriber_sees_event_after_publish() {
        let bus = bus();
        let (_snap, mut rx) = bus.subscribe("j1", JobStatus::Pending);

        bus.publish(
            "p1",
            "t1",
            "j1",
            JobEvent::Status {
                status: JobPhaseStatus::Running,
            },
        );

        let event = rx.recv().await.unwrap();
        assert!(matches!(
            event,
            JobEvent::Status {
                status: JobPhaseStatus::Running
            }
        ));

        let snap = bus.snapshot("j1").unwrap();
        assert_eq!(snap.status, JobStatus::Running);
    }

    #[tokio::test]
    async fn project_channel_receives_terse_update() {
        let bus = bus();
        let mut rx = bus.subscribe_project("p1");

        bus.publish("p1", "t1", "j1", JobEvent::Done);

        let update = rx.recv().await.unwrap();
        assert_eq!(update.thread_id, "t1");
        assert_eq!(update.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn global_channel_receives_every_project() {
        let bus = bus();
        let mut rx = bus.subscribe_global();

        bus.publish("p1", "t1", "j1", JobEvent::Done);
        bus.publish("p2", "t2", "j2", JobEvent::Done);

        let u1 = rx.recv().await.unwrap();
        let u2 = rx.recv().await.unwrap();
        assert_eq!(u1.project_id, "p1");
        assert_eq!(u2.project_id, "p2");
    }

    #[test]
    fn clear_drops_job_state() {
        let bus = bus();
        bus.ensure_job("j1", JobStatus::Pending);
        assert!(bus.snapshot("j1").is_some());
        bus.clear("j1");
        assert!(bus.snapshot("j1").is_none());
    }
}
