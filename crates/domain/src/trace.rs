use serde::Serialize;

/// Structured trace events emitted across all gateway crates.
///
/// A closed vocabulary rather than prose logging: operators can filter
/// and aggregate on `event` without parsing message text.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    JobCreated {
        job_id: String,
        thread_id: String,
        context_only: bool,
    },
    JobStarted {
        job_id: String,
        via: JobStartSource,
    },
    JobCompleted {
        job_id: String,
        duration_ms: u64,
        assistant_turn_id: String,
    },
    JobFailed {
        job_id: String,
        reason: String,
    },
    JobCancelled {
        job_id: String,
    },
    NotificationSuppressed {
        job_id: String,
        seconds_since_poll: i64,
    },
    NotificationCreated {
        job_id: String,
        kind: String,
    },
    ToolDispatched {
        job_id: String,
        tool: String,
        success: bool,
    },
    BusSubscriberAttached {
        job_id: String,
        scope: String,
    },
    BusSubscriberLagged {
        scope: String,
        skipped: u64,
    },
    ConfigValidated {
        errors: usize,
        warnings: usize,
    },
}

/// Which path transitioned a job to `running`.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStartSource {
    InlineStream,
    Worker,
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "core_event");
    }
}
