//! Append-only Turn storage.
//!
//! Each thread gets a `<threadId>.jsonl` file; every turn (user or
//! assistant) is appended as a single JSON line, immutable once written.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde_json::Value;

use sa_domain::error::{Error, Result};
use sa_domain::model::{Turn, TurnRole};

/// Writes and reads append-only JSONL turn files.
pub struct TurnStore {
    base_dir: PathBuf,
}

impl TurnStore {
    pub fn new(state_dir: &Path) -> Result<Self> {
        let base_dir = state_dir.join("turns");
        std::fs::create_dir_all(&base_dir).map_err(Error::Io)?;
        Ok(Self { base_dir })
    }

    fn path_for(&self, thread_id: &str) -> PathBuf {
        self.base_dir.join(format!("{thread_id}.jsonl"))
    }

    /// Append a new turn. `sources`/`tool_calls` are opaque JSON payloads
    /// supplied by the caller.
    pub fn append(
        &self,
        thread_id: &str,
        role: TurnRole,
        content: String,
        sources: Option<Value>,
        tool_calls: Option<Value>,
    ) -> Result<Turn> {
        let turn = Turn {
            id: uuid::Uuid::new_v4().to_string(),
            thread_id: thread_id.to_owned(),
            role,
            content,
            sources,
            tool_calls,
            created_at: Utc::now(),
        };

        let json = serde_json::to_string(&turn)
            .map_err(|e| Error::Other(format!("serializing turn: {e}")))?;

        use std::io::Write;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path_for(thread_id))
            .map_err(Error::Io)?;
        writeln!(file, "{json}").map_err(Error::Io)?;

        Ok(turn)
    }

    /// Read every turn for a thread, in append order.
    pub fn list(&self, thread_id: &str) -> Result<Vec<Turn>> {
        let path = self.path_for(thread_id);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let raw = std::fs::read_to_string(&path).map_err(Error::Io)?;
        let mut turns = Vec::new();
        for line in raw.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Turn>(line) {
                Ok(turn) => turns.push(turn),
                Err(e) => {
                    tracing::warn!(thread_id, error = %e, "skipping malformed turn line");
                }
            }
        }
        Ok(turns)
    }

    /// The most recent turn in a thread, if any.
    pub fn last(&self, thread_id: &str) -> Result<Option<Turn>> {
        Ok(self.list(thread_id)?.into_iter().next_back())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_then_list_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = TurnStore::new(dir.path()).unwrap();

        store
            .append("t1", TurnRole::User, "hello".into(), None, None)
            .unwrap();
        store
            .append("t1", TurnRole::Assistant, "hi there".into(), None, None)
            .unwrap();

        let turns = store.list("t1").unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, TurnRole::User);
        assert_eq!(turns[1].role, TurnRole::Assistant);
    }

    #[test]
    fn list_on_unknown_thread_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = TurnStore::new(dir.path()).unwrap();
        assert!(store.list("nope").unwrap().is_empty());
    }

    #[test]
    fn last_returns_most_recent() {
        let dir = tempfile::tempdir().unwrap();
        let store = TurnStore::new(dir.path()).unwrap();
        store
            .append("t1", TurnRole::User, "first".into(), None, None)
            .unwrap();
        store
            .append("t1", TurnRole::Assistant, "second".into(), None, None)
            .unwrap();
        assert_eq!(store.last("t1").unwrap().unwrap().content, "second");
    }

    #[test]
    fn malformed_line_is_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let store = TurnStore::new(dir.path()).unwrap();
        store
            .append("t1", TurnRole::User, "good".into(), None, None)
            .unwrap();

        use std::io::Write;
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(dir.path().join("turns").join("t1.jsonl"))
            .unwrap();
        writeln!(file, "not json").unwrap();

        let turns = store.list("t1").unwrap();
        assert_eq!(turns.len(), 1);
    }
}
