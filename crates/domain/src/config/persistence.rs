use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Persistence (JSONL stores + bounded in-memory rings)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Root directory for all JSONL-backed stores.
    #[serde(default = "d_state_dir")]
    pub state_dir: PathBuf,
    /// In-memory ring size per store (oldest entries compacted out of
    /// memory once exceeded; the JSONL file remains the durable record).
    #[serde(default = "d_ring")]
    pub ring_size: usize,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            state_dir: d_state_dir(),
            ring_size: d_ring(),
        }
    }
}

fn d_state_dir() -> PathBuf {
    PathBuf::from("./state")
}
fn d_ring() -> usize {
    10_000
}
