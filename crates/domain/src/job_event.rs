use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Job-level event stream (Agent Loop output, Event Bus wire form)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Canonical event kind emitted by the Agent Loop and mirrored onto the
/// Event Bus. Also the SSE frame shape — one `data:` JSON per event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    Plan {
        acknowledgment: String,
    },
    Status {
        status: JobPhaseStatus,
    },
    ToolCall {
        tool: String,
        query: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },
    ToolResult {
        tool: String,
        found: bool,
        query: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        saved: Option<bool>,
        #[serde(skip_serializing_if = "Option::is_none")]
        finding_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        finding_content: Option<String>,
    },
    Sources {
        sources: Vec<serde_json::Value>,
    },
    Thinking {
        content: String,
    },
    Chunk {
        content: String,
    },
    Usage {
        input_tokens: u32,
        output_tokens: u32,
        total_tokens: u32,
    },
    Done,
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        cancelled: bool,
    },
}

impl JobEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobEvent::Done | JobEvent::Error { .. })
    }
}

/// Coarse-grained status carried by `status` events; distinct from
/// `JobStatus` (the persisted Job record's lifecycle state).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPhaseStatus {
    Running,
    Responding,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// State snapshot
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    Initializing,
    Planning,
    Searching,
    Thinking,
    Responding,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    PhaseChange,
    ToolCall,
    ToolResult,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityItem {
    pub id: String,
    pub kind: ActivityKind,
    pub timestamp: DateTime<Utc>,
    /// Opaque per-kind fields (tool name, query, found, …).
    #[serde(flatten)]
    pub fields: serde_json::Value,
}

/// The accumulated state of a job at a moment in time, sufficient for a
/// fresh subscriber to reconstruct the current view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub current_phase: JobPhase,
    #[serde(default)]
    pub current_action: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub sources: Vec<serde_json::Value>,
    #[serde(default)]
    pub thinking: String,
    #[serde(default)]
    pub activity: Vec<ActivityItem>,
    pub status: crate::model::JobStatus,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
}

impl JobSnapshot {
    pub fn new(status: crate::model::JobStatus) -> Self {
        Self {
            current_phase: JobPhase::Initializing,
            current_action: String::new(),
            content: String::new(),
            sources: Vec::new(),
            thinking: String::new(),
            activity: Vec::new(),
            status,
            started_at: None,
        }
    }

    /// Apply the event->state mutation table (spec §4.1) to this snapshot.
    /// `next_activity_id` is a caller-supplied id generator (e.g. a
    /// monotonic counter) used to stamp new activity entries.
    pub fn apply(&mut self, event: &JobEvent, now: DateTime<Utc>, next_activity_id: impl FnOnce() -> String) {
        match event {
            JobEvent::Status {
                status: JobPhaseStatus::Running,
            } => {
                self.status = crate::model::JobStatus::Running;
                if self.started_at.is_none() {
                    self.current_phase = JobPhase::Initializing;
                    self.started_at = Some(now);
                }
            }
            JobEvent::Status {
                status: JobPhaseStatus::Responding,
            } => {
                self.current_phase = JobPhase::Responding;
            }
            JobEvent::Plan { acknowledgment } => {
                self.current_phase = JobPhase::Planning;
                self.current_action = acknowledgment.clone();
            }
            JobEvent::ToolCall { tool, .. } => {
                self.current_phase = JobPhase::Searching;
                self.current_action = format!("Searching {tool}");
                self.activity.push(ActivityItem {
                    id: next_activity_id(),
                    kind: ActivityKind::ToolCall,
                    timestamp: now,
                    fields: serde_json::to_value(event).unwrap_or_default(),
                });
            }
            JobEvent::ToolResult { .. } => {
                self.current_phase = JobPhase::Thinking;
                self.current_action = "Processing results".into();
                self.activity.push(ActivityItem {
                    id: next_activity_id(),
                    kind: ActivityKind::ToolResult,
                    timestamp: now,
                    fields: serde_json::to_value(event).unwrap_or_default(),
                });
            }
            JobEvent::Thinking { content } => {
                self.current_phase = JobPhase::Thinking;
                self.current_action = "Deep thinking".into();
                self.thinking.push_str(content);
            }
            JobEvent::Chunk { content } => {
                if self.current_phase != JobPhase::Responding {
                    self.current_phase = JobPhase::Responding;
                }
                self.content.push_str(content);
            }
            JobEvent::Sources { sources } => {
                self.sources = sources.clone();
            }
            JobEvent::Usage { .. } => {}
            JobEvent::Done => {
                self.current_phase = JobPhase::Done;
                self.status = crate::model::JobStatus::Completed;
            }
            JobEvent::Error { cancelled, .. } => {
                self.current_phase = JobPhase::Done;
                self.status = if *cancelled {
                    crate::model::JobStatus::Cancelled
                } else {
                    crate::model::JobStatus::Failed
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::JobStatus;

    #[test]
    fn tool_call_sets_searching_phase_and_appends_activity() {
        let mut snap = JobSnapshot::new(JobStatus::Running);
        let mut n = 0u32;
        snap.apply(
            &JobEvent::ToolCall {
                tool: "search_documents".into(),
                query: "sales".into(),
                id: Some("c1".into()),
            },
            Utc::now(),
            || {
                n += 1;
                n.to_string()
            },
        );
        assert_eq!(snap.current_phase, JobPhase::Searching);
        assert_eq!(snap.activity.len(), 1);
        assert_eq!(snap.current_action, "Searching search_documents");
    }

    #[test]
    fn chunk_accumulates_content_and_sets_responding() {
        let mut snap = JobSnapshot::new(JobStatus::Running);
        snap.apply(&JobEvent::Chunk { content: "Hello, ".into() }, Utc::now(), || "x".into());
        snap.apply(&JobEvent::Chunk { content: "world".into() }, Utc::now(), || "y".into());
        assert_eq!(snap.content, "Hello, world");
        assert_eq!(snap.current_phase, JobPhase::Responding);
    }

    #[test]
    fn done_marks_terminal_completed() {
        let mut snap = JobSnapshot::new(JobStatus::Running);
        snap.apply(&JobEvent::Done, Utc::now(), || "x".into());
        assert_eq!(snap.status, JobStatus::Completed);
        assert_eq!(snap.current_phase, JobPhase::Done);
    }

    #[test]
    fn cancelled_error_marks_cancelled_not_failed() {
        let mut snap = JobSnapshot::new(JobStatus::Running);
        snap.apply(
            &JobEvent::Error {
                message: "cancelled".into(),
                cancelled: true,
            },
            Utc::now(),
            || "x".into(),
        );
        assert_eq!(snap.status, JobStatus::Cancelled);
    }

    #[test]
    fn done_event_serializes_without_extra_fields() {
        let json = serde_json::to_string(&JobEvent::Done).unwrap();
        assert_eq!(json, r#"{"type":"done"}"#);
    }
}
