use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Project
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The top-level ownership boundary. Every Thread, Job, Resource,
/// Notification, and Finding belongs to exactly one Project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub owner_user_id: String,
    pub name: String,
    /// Project-level instructions, prepended to the system prompt of
    /// every Job run within it.
    #[serde(default)]
    pub instructions: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Thread / Turn
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Maximum number of ancestor hops a subthread's context prefix walks
/// before stopping; bounds a malicious or accidental deep chain.
pub const MAX_THREAD_ANCESTORS: u32 = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thread {
    pub id: String,
    pub project_id: String,
    pub title: Option<String>,
    /// Present if this thread was spawned from another thread's turn.
    #[serde(default)]
    pub parent_thread_id: Option<String>,
    #[serde(default)]
    pub parent_turn_id: Option<String>,
    /// Short excerpt of the parent context that spawned this thread.
    #[serde(default)]
    pub context_text: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Soft-deleted threads are invisible but retained for FK integrity.
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Thread {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Assistant,
}

/// One persisted message in a thread. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub id: String,
    pub thread_id: String,
    pub role: TurnRole,
    pub content: String,
    /// Opaque to the core: source citations attached by the caller.
    #[serde(default)]
    pub sources: Option<serde_json::Value>,
    /// Opaque to the core: the tool-call transcript for an assistant turn.
    #[serde(default)]
    pub tool_calls: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Job
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled)
    }

    /// Legal transitions: pending -> running -> {completed, failed};
    /// any non-terminal -> cancelled.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        match (self, next) {
            (Pending, Running) => true,
            (Running, Completed) | (Running, Failed) => true,
            (Pending, Cancelled) | (Running, Cancelled) => true,
            _ => false,
        }
    }
}

/// The execution record for one user turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub project_id: String,
    pub thread_id: String,
    pub status: JobStatus,
    pub question: String,
    #[serde(default)]
    pub context_only: bool,

    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    /// Non-null iff status = completed.
    #[serde(default)]
    pub assistant_turn_id: Option<String>,
    /// Grows by append-only concatenation while running.
    #[serde(default)]
    pub partial_response: String,
    #[serde(default)]
    pub sources: Option<serde_json::Value>,
    #[serde(default)]
    pub error_message: Option<String>,

    /// Last time any observer (poller or subscriber) looked at this job.
    pub poll_watermark: DateTime<Utc>,

    #[serde(default)]
    pub input_tokens: u32,
    #[serde(default)]
    pub output_tokens: u32,
    #[serde(default)]
    pub duration_ms: Option<u64>,

    pub created_at: DateTime<Utc>,
}

impl Job {
    pub fn touch_poll_watermark(&mut self, now: DateTime<Utc>) {
        if now > self.poll_watermark {
            self.poll_watermark = now;
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Resource
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Document,
    Website,
    DataFile,
    Image,
    GitRepository,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    Uploaded,
    Extracting,
    Extracted,
    Stored,
    Indexing,
    Analyzing,
    Describing,
    Indexed,
    Analyzed,
    Described,
    Partial,
    Failed,
}

/// Flat projection the core consumes; ingestion owns the rest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    pub id: String,
    pub project_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ResourceType,
    pub status: ResourceStatus,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub file_path: Option<String>,
    /// Type-specific metadata (row counts, page counts, image dims, …).
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Notification
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    JobCompleted,
    JobFailed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub project_id: String,
    pub thread_id: String,
    pub job_id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Finding
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A short text excerpt saved during a job via the `save_finding` tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub id: String,
    pub project_id: String,
    pub thread_id: String,
    pub job_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_to_running_is_legal() {
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Running));
    }

    #[test]
    fn running_to_running_is_illegal() {
        assert!(!JobStatus::Running.can_transition_to(JobStatus::Running));
    }

    #[test]
    fn terminal_to_cancelled_is_illegal() {
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Cancelled));
        assert!(!JobStatus::Failed.can_transition_to(JobStatus::Cancelled));
        assert!(!JobStatus::Cancelled.can_transition_to(JobStatus::Cancelled));
    }

    #[test]
    fn pending_and_running_can_cancel() {
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Cancelled));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Cancelled));
    }

    #[test]
    fn is_terminal_covers_all_terminal_states() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
    }

    #[test]
    fn poll_watermark_only_advances() {
        let mut job = Job {
            id: "j1".into(),
            project_id: "p1".into(),
            thread_id: "t1".into(),
            status: JobStatus::Running,
            question: "q".into(),
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
        };
        let earlier = job.poll_watermark - chrono::Duration::seconds(30);
        job.touch_poll_watermark(earlier);
        assert!(job.poll_watermark > earlier);
    }
}
