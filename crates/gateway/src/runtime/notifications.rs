//! Notification Policy.
//!
//! Decides whether a completed job should surface a notification, based
//! on whether the job's `poll_watermark` suggests a viewer is actively
//! watching it.

use chrono::{DateTime, Utc};

use sa_domain::config::NotificationsConfig;
use sa_domain::error::Result;
use sa_domain::model::{Job, NotificationKind};
use sa_domain::trace::TraceEvent;
use sa_threads::NotificationStore;

pub struct NotificationPolicy<'a> {
    config: &'a NotificationsConfig,
    store: &'a NotificationStore,
}

impl<'a> NotificationPolicy<'a> {
    pub fn new(config: &'a NotificationsConfig, store: &'a NotificationStore) -> Self {
        Self { config, store }
    }

    /// A job just completed successfully. Suppresses the notification if
    /// `poll_watermark` was touched within `suppression_window_secs` of
    /// now (the viewer is presumed to still be watching).
    pub fn on_completed(&self, job: &Job, now: DateTime<Utc>) -> Result<()> {
        let elapsed = (now - job.poll_watermark).num_seconds();
        if elapsed < self.config.suppression_window_secs {
            TraceEvent::NotificationSuppressed {
                job_id: job.id.clone(),
                seconds_since_poll: elapsed,
            }
            .emit();
            return Ok(());
        }

        let title = format!("Job completed ({})", job.thread_id);
        let body = preview(&job.partial_response, self.config.body_preview_chars);
        self.create(job, NotificationKind::JobCompleted, title, body)
    }

    /// A job failed. Always notifies, regardless of poll watermark.
    pub fn on_failed(&self, job: &Job) -> Result<()> {
        let title = format!("Job failed ({})", job.thread_id);
        let body = job.error_message.clone().unwrap_or_else(|| "the job failed".into());
        self.create(job, NotificationKind::JobFailed, title, body)
    }

    fn create(&self, job: &Job, kind: NotificationKind, title: String, body: String) -> Result<()> {
        let kind_label = match kind {
            NotificationKind::JobCompleted => "job_completed",
            NotificationKind::JobFailed => "job_failed",
        };
        self.store.insert(sa_domain::model::Notification {
            id: uuid::Uuid::new_v4().to_string(),
            project_id: job.project_id.clone(),
            thread_id: job.thread_id.clone(),
            job_id: job.id.clone(),
            kind,
            title,
            body,
            read: false,
            created_at: Utc::now(),
        })?;
        TraceEvent::NotificationCreated {
            job_id: job.id.clone(),
            kind: kind_label.to_owned(),
        }
        .emit();
        Ok(())
    }
}

fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_owned();
    }
    let mut truncated: String = text.chars().take(max_chars).collect();
    truncated.push('…');
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;
    use sa_domain::model::{Job, JobStatus};

    fn job(poll_watermark: DateTime<Utc>) -> Job {
        let now = Utc::now();
        Job {
            id: "j1".into(),
            project_id: "p1".into(),
            thread_id: "t1".into(),
            status: JobStatus::Completed,
            question: "hi".into(),
            context_only: false,
            started_at: Some(now),
            completed_at: Some(now),
            assistant_turn_id: Some("turn-1".into()),
            partial_response: "the answer is 42".into(),
            sources: None,
            error_message: None,
            poll_watermark,
            input_tokens: 0,
            output_tokens: 0,
            duration_ms: Some(100),
            created_at: now,
        }
    }

    #[test]
    fn recent_poll_suppresses_completion_notification() {
        let dir = tempfile::tempdir().unwrap();
        let store = NotificationStore::new(dir.path()).unwrap();
        let config = NotificationsConfig::default();
        let policy = NotificationPolicy::new(&config, &store);

        let now = Utc::now();
        policy.on_completed(&job(now), now).unwrap();

        assert!(store.list_for_project("p1", false).is_empty());
    }

    #[test]
    fn stale_poll_creates_completion_notification() {
        let dir = tempfile::tempdir().unwrap();
        let store = NotificationStore::new(dir.path()).unwrap();
        let config = NotificationsConfig::default();
        let policy = NotificationPolicy::new(&config, &store);

        let now = Utc::now();
        let stale = now - chrono::Duration::seconds(config.suppression_window_secs + 5);
        policy.on_completed(&job(stale), now).unwrap();

        assert_eq!(store.list_for_project("p1", false).len(), 1);
    }

    #[test]
    fn failure_always_notifies() {
        let dir = tempfile::tempdir().unwrap();
        let store = NotificationStore::new(dir.path()).unwrap();
        let config = NotificationsConfig::default();
        let policy = NotificationPolicy::new(&config, &store);

        let now = Utc::now();
        let mut failed = job(now);
        failed.status = JobStatus::Failed;
        failed.error_message = Some("upstream timeout".into());
        policy.on_failed(&failed).unwrap();

        assert_eq!(store.list_for_project("p1", false).len(), 1);
    }
}
