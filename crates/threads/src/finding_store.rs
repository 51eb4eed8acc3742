//! Append-only Finding storage.
//!
//! Findings are saved by the `save_finding` tool during a job and never
//! mutated afterward, so they follow Turn's per-thread JSONL pattern rather
//! than the single-JSON-file one.

use std::path::{Path, PathBuf};

use chrono::Utc;

use sa_domain::error::{Error, Result};
use sa_domain::model::Finding;

pub struct FindingStore {
    base_dir: PathBuf,
}

impl FindingStore {
    pub fn new(state_dir: &Path) -> Result<Self> {
        let base_dir = state_dir.join("findings");
        std::fs::create_dir_all(&base_dir).map_err(Error::Io)?;
        Ok(Self { base_dir })
    }

    fn path_for(&self, thread_id: &str) -> PathBuf {
        self.base_dir.join(format!("{thread_id}.jsonl"))
    }

    pub fn append(
        &self,
        project_id: &str,
        thread_id: &str,
        job_id: &str,
        content: String,
    ) -> Result<Finding> {
        let finding = Finding {
            id: uuid::Uuid::new_v4().to_string(),
            project_id: project_id.to_owned(),
            thread_id: thread_id.to_owned(),
            job_id: job_id.to_owned(),
            content,
            created_at: Utc::now(),
        };

        let json = serde_json::to_string(&finding)
            .map_err(|e| Error::Other(format!("serializing finding: {e}")))?;

        use std::io::Write;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path_for(thread_id))
            .map_err(Error::Io)?;
        writeln!(file, "{json}").map_err(Error::Io)?;

        Ok(finding)
    }

    /// Findings for a single thread, in append order. `None` thread scans
    /// every thread file under the project's findings directory.
    pub fn list_for_project(&self, project_id: &str, thread_id: Option<&str>) -> Result<Vec<Finding>> {
        let mut findings = Vec::new();

        if let Some(thread_id) = thread_id {
            findings.extend(self.read_file(&self.path_for(thread_id))?);
        } else {
            let entries = std::fs::read_dir(&self.base_dir).map_err(Error::Io)?;
            for entry in entries {
                let entry = entry.map_err(Error::Io)?;
                findings.extend(self.read_file(&entry.path())?);
            }
        }

        findings.retain(|f| f.project_id == project_id);
        findings.sort_by_key(|f| f.created_at);
        Ok(findings)
    }

    fn read_file(&self, path: &Path) -> Result<Vec<Finding>> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        let raw = std::fs::read_to_string(path).map_err(Error::Io)?;
        let mut findings = Vec::new();
        for line in raw.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Finding>(line) {
                Ok(finding) => findings.push(finding),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping malformed finding line");
                }
            }
        }
        Ok(findings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_then_list_for_thread() {
        let dir = tempfile::tempdir().unwrap();
        let store = FindingStore::new(dir.path()).unwrap();
        store.append("p1", "t1", "j1", "finding one".into()).unwrap();
        store.append("p1", "t1", "j1", "finding two".into()).unwrap();

        let findings = store.list_for_project("p1", Some("t1")).unwrap();
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].content, "finding one");
    }

    #[test]
    fn list_for_project_scans_all_threads_when_thread_unset() {
        let dir = tempfile::tempdir().unwrap();
        let store = FindingStore::new(dir.path()).unwrap();
        store.append("p1", "t1", "j1", "a".into()).unwrap();
        store.append("p1", "t2", "j2", "b".into()).unwrap();
        store.append("p2", "t3", "j3", "c".into()).unwrap();

        let findings = store.list_for_project("p1", None).unwrap();
        assert_eq!(findings.len(), 2);
    }

    #[test]
    fn list_on_unknown_thread_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FindingStore::new(dir.path()).unwrap();
        assert!(store.list_for_project("p1", Some("nope")).unwrap().is_empty());
    }
}
