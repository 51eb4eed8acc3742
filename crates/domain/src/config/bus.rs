use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Event Bus
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// TTL (seconds) for a job's state snapshot after its last publish.
    #[serde(default = "d_ttl")]
    pub snapshot_ttl_secs: u64,
    /// Per-job/per-project/global broadcast channel capacity. A subscriber
    /// that falls more than this many events behind sees `Lagged` and
    /// resubscribes from the current snapshot.
    #[serde(default = "d_capacity")]
    pub channel_capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            snapshot_ttl_secs: d_ttl(),
            channel_capacity: d_capacity(),
        }
    }
}

fn d_ttl() -> u64 {
    3600
}
fn d_capacity() -> usize {
    256
}
