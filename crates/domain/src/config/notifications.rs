use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Notification policy
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsConfig {
    /// If a job completes within this many seconds of its last poll
    /// watermark update, the viewer is presumed watching and no
    /// `job_completed` notification is created. Failures always notify.
    #[serde(default = "d_window")]
    pub suppression_window_secs: i64,
    /// Max chars of assistant content included as the notification body preview.
    #[serde(default = "d_preview")]
    pub body_preview_chars: usize,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            suppression_window_secs: d_window(),
            body_preview_chars: d_preview(),
        }
    }
}

fn d_window() -> i64 {
    10
}
fn d_preview() -> usize {
    200
}
