use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Job runner (worker pool) configuration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Worker-pool concurrency and timeout settings.
///
/// Workers bypass per-thread locking and use a single semaphore shared
/// across the pool, mirroring the gateway's existing task-queue shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    /// Maximum number of jobs executing concurrently across the pool.
    /// Clamped to `1..=64`.
    #[serde(default = "d_max_concurrent")]
    pub max_concurrent: usize,
    /// Hard ceiling on Agent Loop iterations for a single job.
    #[serde(default = "d_max_iterations")]
    pub max_loop_iterations: u32,
    /// Soft timeout (seconds): triggers cleanup-before-kill.
    #[serde(default = "d_soft_timeout")]
    pub soft_timeout_secs: u64,
    /// Hard timeout (seconds): the worker is killed unconditionally.
    #[serde(default = "d_hard_timeout")]
    pub hard_timeout_secs: u64,
    /// Checkpoint cadence: write a partial-response checkpoint to the
    /// Job Store every N accumulated content bytes.
    #[serde(default = "d_checkpoint_bytes")]
    pub checkpoint_bytes: usize,
    /// Interval (seconds) between idle-worker pruning sweeps.
    #[serde(default = "d_prune_interval")]
    pub prune_interval_secs: u64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            max_concurrent: d_max_concurrent(),
            max_loop_iterations: d_max_iterations(),
            soft_timeout_secs: d_soft_timeout(),
            hard_timeout_secs: d_hard_timeout(),
            checkpoint_bytes: d_checkpoint_bytes(),
            prune_interval_secs: d_prune_interval(),
        }
    }
}

impl JobsConfig {
    /// Clamp `max_concurrent` to the allowed range `1..=64`.
    pub fn clamped(&self) -> Self {
        Self {
            max_concurrent: self.max_concurrent.clamp(1, 64),
            ..self.clone()
        }
    }
}

fn d_max_concurrent() -> usize {
    8
}
fn d_max_iterations() -> u32 {
    25
}
fn d_soft_timeout() -> u64 {
    120
}
fn d_hard_timeout() -> u64 {
    300
}
fn d_checkpoint_bytes() -> usize {
    500
}
fn d_prune_interval() -> u64 {
    60
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_max_concurrent_is_eight() {
        assert_eq!(JobsConfig::default().max_concurrent, 8);
    }

    #[test]
    fn clamp_below_min() {
        let cfg = JobsConfig {
            max_concurrent: 0,
            ..JobsConfig::default()
        };
        assert_eq!(cfg.clamped().max_concurrent, 1);
    }

    #[test]
    fn clamp_above_max() {
        let cfg = JobsConfig {
            max_concurrent: 1000,
            ..JobsConfig::default()
        };
        assert_eq!(cfg.clamped().max_concurrent, 64);
    }

    #[test]
    fn deserialize_missing_fields_uses_defaults() {
        let cfg: JobsConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.max_concurrent, 8);
        assert_eq!(cfg.max_loop_iterations, 25);
    }
}
