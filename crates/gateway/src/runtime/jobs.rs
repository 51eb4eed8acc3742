//! Job Store — persistent records for every agent turn execution.
//!
//! Mirrors `runs.rs`'s bounded ring + O(1) index + JSONL persistence, keyed
//! by job id (a string UUID) instead of `Uuid` directly, and adds the
//! start-once CAS the Job Runner needs to make `start` idempotent.

use std::collections::{HashMap, VecDeque};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use parking_lot::RwLock;

use sa_domain::error::{Error, Result};
use sa_domain::model::{Job, JobStatus};

const MAX_JOBS_IN_MEMORY: usize = 2000;

pub struct JobStore {
    inner: RwLock<JobStoreInner>,
    log_path: PathBuf,
}

/// Interior state behind the RwLock — same shape as `RunStoreInner`: a
/// VecDeque plus a HashMap index keyed by logical sequence number, so
/// popping the front never requires reindexing the rest.
struct JobStoreInner {
    jobs: VecDeque<Job>,
    index: HashMap<String, usize>,
    base_seq: usize,
}

impl JobStoreInner {
    fn new(jobs: VecDeque<Job>) -> Self {
        let mut index = HashMap::with_capacity(jobs.len());
        for (i, job) in jobs.iter().enumerate() {
            index.insert(job.id.clone(), i);
        }
        Self {
            jobs,
            index,
            base_seq: 0,
        }
    }

    fn deque_idx(&self, seq: usize) -> usize {
        seq - self.base_seq
    }

    fn get_mut(&mut self, job_id: &str) -> Option<&mut Job> {
        let seq = *self.index.get(job_id)?;
        let idx = self.deque_idx(seq);
        self.jobs.get_mut(idx)
    }

    fn get(&self, job_id: &str) -> Option<&Job> {
        let seq = *self.index.get(job_id)?;
        let idx = self.deque_idx(seq);
        self.jobs.get(idx)
    }

    fn push_back(&mut self, job: Job) {
        let seq = self.base_seq + self.jobs.len();
        self.index.insert(job.id.clone(), seq);
        self.jobs.push_back(job);
    }

    fn pop_front(&mut self) -> Option<Job> {
        let job = self.jobs.pop_front()?;
        self.index.remove(&job.id);
        self.base_seq += 1;
        Some(job)
    }
}

impl JobStore {
    pub fn new(state_dir: &Path) -> Result<Self> {
        let dir = state_dir.join("jobs");
        std::fs::create_dir_all(&dir).map_err(Error::Io)?;

        let log_path = dir.join("jobs.jsonl");
        let (jobs, total_on_disk) = Self::load_recent(&log_path);

        if total_on_disk > jobs.len() {
            tracing::info!(
                kept = jobs.len(),
                pruned = total_on_disk - jobs.len(),
                "pruning jobs JSONL on disk"
            );
            Self::rewrite_jsonl(&log_path, &jobs);
        }

        Ok(Self {
            inner: RwLock::new(JobStoreInner::new(jobs)),
            log_path,
        })
    }

    fn load_recent(path: &Path) -> (VecDeque<Job>, usize) {
        let mut jobs = VecDeque::new();
        let mut total = 0;
        if let Ok(content) = std::fs::read_to_string(path) {
            let lines: Vec<&str> = content.lines().collect();
            total = lines.len();
            for line in lines.iter().rev().take(MAX_JOBS_IN_MEMORY) {
                match serde_json::from_str::<Job>(line) {
                    Ok(job) => jobs.push_front(job),
                    Err(e) => tracing::warn!(error = %e, "skipping malformed job line"),
                }
            }
        }
        (jobs, total)
    }

    fn rewrite_jsonl(path: &Path, jobs: &VecDeque<Job>) {
        let tmp = path.with_extension("jsonl.tmp");
        let mut ok = false;
        if let Ok(mut f) = std::fs::File::create(&tmp) {
            ok = true;
            for job in jobs {
                if let Ok(json) = serde_json::to_string(job) {
                    if writeln!(f, "{json}").is_err() {
                        ok = false;
                        break;
                    }
                }
            }
        }
        if ok {
            let _ = std::fs::rename(&tmp, path);
        } else {
            let _ = std::fs::remove_file(&tmp);
        }
    }

    /// Append a job to the JSONL log.
    fn persist(&self, job: &Job) {
        if let Ok(json) = serde_json::to_string(job) {
            if let Ok(mut file) = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.log_path)
            {
                let _ = writeln!(file, "{json}");
            }
        }
    }

    /// Insert a newly created (pending) job, persisting it immediately.
    pub fn insert(&self, job: Job) -> Job {
        self.persist(&job);
        let mut inner = self.inner.write();
        inner.push_back(job.clone());
        if inner.jobs.len() > MAX_JOBS_IN_MEMORY {
            inner.pop_front();
        }
        job
    }

    pub fn get(&self, job_id: &str) -> Option<Job> {
        self.inner.read().get(job_id).cloned()
    }

    /// Most recent job for a thread, terminal or not.
    pub fn latest_for_thread(&self, thread_id: &str) -> Option<Job> {
        self.inner
            .read()
            .jobs
            .iter()
            .rev()
            .find(|j| j.thread_id == thread_id)
            .cloned()
    }

    /// Latest non-terminal job for a thread, the "active job" concept the
    /// streaming and polling endpoints expose.
    pub fn active_for_thread(&self, thread_id: &str) -> Option<Job> {
        self.inner
            .read()
            .jobs
            .iter()
            .rev()
            .find(|j| j.thread_id == thread_id && !j.status.is_terminal())
            .cloned()
    }

    /// Every non-terminal job in a project, most recently created first —
    /// the sidebar/aggregator view across all of a project's threads.
    pub fn active_for_project(&self, project_id: &str) -> Vec<Job> {
        self.inner
            .read()
            .jobs
            .iter()
            .rev()
            .filter(|j| j.project_id == project_id && !j.status.is_terminal())
            .cloned()
            .collect()
    }

    /// Attempt a status transition and persist the job if it occurs. Returns
    /// the job's state after the attempt. Making `start` go through this
    /// makes a duplicate trigger on an already-running job a no-op rather
    /// than a double execution.
    pub fn try_transition<F>(&self, job_id: &str, next: JobStatus, mutate: F) -> Option<Job>
    where
        F: FnOnce(&mut Job),
    {
        let mut inner = self.inner.write();
        let job = inner.get_mut(job_id)?;
        if !job.status.can_transition_to(next) {
            return Some(job.clone());
        }
        job.status = next;
        mutate(job);
        let snapshot = job.clone();
        drop(inner);
        self.persist(&snapshot);
        Some(snapshot)
    }

    /// Apply an in-place mutation without a status transition (checkpoint
    /// writes of `partial_response`, token counts, `poll_watermark`).
    pub fn update<F>(&self, job_id: &str, mutate: F) -> Option<Job>
    where
        F: FnOnce(&mut Job),
    {
        let mut inner = self.inner.write();
        let job = inner.get_mut(job_id)?;
        mutate(job);
        let snapshot = job.clone();
        drop(inner);
        self.persist(&snapshot);
        Some(snapshot)
    }

    /// Bump `poll_watermark` to now; called on every observer read.
    pub fn touch_poll_watermark(&self, job_id: &str) {
        let now = Utc::now();
        let mut inner = self.inner.write();
        if let Some(job) = inner.get_mut(job_id) {
            job.touch_poll_watermark(now);
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    fn new_job(id: &str, thread_id: &str) -> Job {
        let now = Utc::now();
        Job {
            id: id.into(),
            project_id: "p1".into(),
            thread_id: thread_id.into(),
            status: JobStatus::Pending,
            question: "hi".into(),
            context_only: false,
            started_at: None,
            completed_at: None,
            assistant_turn_id: None,
            partial_response: String::new(),
            sources: None,
            error_message: None,
            poll_watermark: now,
            input_tokens: 0,
            output_tokens: 0,
            duration_ms: None,
            created_at: now,
        }
    }

    #[test]
    fn insert_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = JobStore::new(dir.path()).unwrap();
        store.insert(new_job("j1", "t1"));
        assert_eq!(store.get("j1").unwrap().status, JobStatus::Pending);
    }

    #[test]
    fn active_for_thread_ignores_terminal_jobs() {
        let dir = tempfile::tempdir().unwrap();
        let store = JobStore::new(dir.path()).unwrap();
        store.insert(new_job("j1", "t1"));
        store.try_transition("j1", JobStatus::Running, |_| {});
        store.try_transition("j1", JobStatus::Completed, |_| {});

        assert!(store.active_for_thread("t1").is_none());
        assert_eq!(store.latest_for_thread("t1").unwrap().status, JobStatus::Completed);
    }

    #[test]
    fn active_for_project_ignores_other_projects_and_terminal_jobs() {
        let dir = tempfile::tempdir().unwrap();
        let store = JobStore::new(dir.path()).unwrap();
        store.insert(new_job("j1", "t1"));
        let mut other = new_job("j2", "t2");
        other.project_id = "p2".into();
        store.insert(other);
        store.insert(new_job("j3", "t3"));
        store.try_transition("j3", JobStatus::Running, |_| {});
        store.try_transition("j3", JobStatus::Completed, |_| {});

        let active = store.active_for_project("p1");
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, "j1");
    }

    #[test]
    fn try_transition_rejects_illegal_jump() {
        let dir = tempfile::tempdir().unwrap();
        let store = JobStore::new(dir.path()).unwrap();
        store.insert(new_job("j1", "t1"));

        // pending -> completed is not a legal direct transition.
        let job = store.try_transition("j1", JobStatus::Completed, |_| {}).unwrap();
        assert_eq!(job.status, JobStatus::Pending);
    }

    #[test]
    fn double_start_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = JobStore::new(dir.path()).unwrap();
        store.insert(new_job("j1", "t1"));

        let first = store
            .try_transition("j1", JobStatus::Running, |j| j.started_at = Some(Utc::now()))
            .unwrap();
        assert_eq!(first.status, JobStatus::Running);
        let started_at = first.started_at;

        // A second start attempt is a no-op: status stays Running and
        // started_at is not clobbered.
        let second = store
            .try_transition("j1", JobStatus::Running, |j| j.started_at = Some(Utc::now()))
            .unwrap();
        assert_eq!(second.status, JobStatus::Running);
        assert_eq!(second.started_at, started_at);
    }

    #[test]
    fn persists_across_store_reload() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = JobStore::new(dir.path()).unwrap();
            store.insert(new_job("j1", "t1"));
            store.try_transition("j1", JobStatus::Running, |_| {});
        }
        let reloaded = JobStore::new(dir.path()).unwrap();
        assert_eq!(reloaded.get("j1").unwrap().status, JobStatus::Running);
    }

    #[test]
    fn touch_poll_watermark_is_monotonic() {
        let dir = tempfile::tempdir().unwrap();
        let store = JobStore::new(dir.path()).unwrap();
        store.insert(new_job("j1", "t1"));
        let before = store.get("j1").unwrap().poll_watermark;
        store.touch_poll_watermark("j1");
        let after = store.get("j1").unwrap().poll_watermark;
        assert!(after >= before);
    }
}
