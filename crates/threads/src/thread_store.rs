//! Gateway-owned Project and Thread stores.
//!
//! Each store persists its records in a single JSON file under the
//! configured state directory and keeps an in-memory map guarded by a
//! `parking_lot::RwLock` for concurrent reads.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use parking_lot::RwLock;

use sa_domain::error::{Error, Result};
use sa_domain::model::{Project, Thread, MAX_THREAD_ANCESTORS};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Project store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Gateway-owned project store backed by `projects.json`.
pub struct ProjectStore {
    path: PathBuf,
    projects: RwLock<HashMap<String, Project>>,
}

impl ProjectStore {
    pub fn new(state_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(state_dir).map_err(Error::Io)?;
        let path = state_dir.join("projects.json");
        let projects = load_json_map(&path)?;

        tracing::info!(
            projects = projects.len(),
            path = %path.display(),
            "project store loaded"
        );

        Ok(Self {
            path,
            projects: RwLock::new(projects),
        })
    }

    pub fn create(&self, owner_user_id: String, name: String, instructions: Option<String>) -> Result<Project> {
        let project = Project {
            id: uuid::Uuid::new_v4().to_string(),
            owner_user_id,
            name,
            instructions,
            created_at: Utc::now(),
        };
        self.projects.write().insert(project.id.clone(), project.clone());
        self.flush()?;
        Ok(project)
    }

    pub fn get(&self, project_id: &str) -> Option<Project> {
        self.projects.read().get(project_id).cloned()
    }

    pub fn list_for_owner(&self, owner_user_id: &str) -> Vec<Project> {
        self.projects
            .read()
            .values()
            .filter(|p| p.owner_user_id == owner_user_id)
            .cloned()
            .collect()
    }

    pub fn flush(&self) -> Result<()> {
        write_json_map(&self.path, &self.projects.read())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Thread store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Gateway-owned thread store backed by `threads.json`.
pub struct ThreadStore {
    path: PathBuf,
    threads: RwLock<HashMap<String, Thread>>,
}

impl ThreadStore {
    pub fn new(state_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(state_dir).map_err(Error::Io)?;
        let path = state_dir.join("threads.json");
        let threads = load_json_map(&path)?;

        tracing::info!(
            threads = threads.len(),
            path = %path.display(),
            "thread store loaded"
        );

        Ok(Self {
            path,
            threads: RwLock::new(threads),
        })
    }

    pub fn create(
        &self,
        project_id: String,
        title: Option<String>,
        parent_thread_id: Option<String>,
        parent_turn_id: Option<String>,
        context_text: Option<String>,
    ) -> Result<Thread> {
        if let Some(parent_id) = &parent_thread_id {
            let parent = self
                .get(parent_id)
                .ok_or_else(|| Error::NotFound(format!("parent thread {parent_id} not found")))?;
            if parent.project_id != project_id {
                return Err(Error::Validation(
                    "parent thread belongs to a different project".into(),
                ));
            }
        }

        let now = Utc::now();
        let thread = Thread {
            id: uuid::Uuid::new_v4().to_string(),
            project_id,
            title,
            parent_thread_id,
            parent_turn_id,
            context_text,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        self.threads.write().insert(thread.id.clone(), thread.clone());
        self.flush()?;
        Ok(thread)
    }

    /// Returns `None` for unknown or soft-deleted threads.
    pub fn get(&self, thread_id: &str) -> Option<Thread> {
        self.threads
            .read()
            .get(thread_id)
            .filter(|t| !t.is_deleted())
            .cloned()
    }

    /// Returns the thread's stored record even if soft-deleted, for
    /// foreign-key integrity checks (e.g. resolving a Job's thread_id).
    pub fn get_including_deleted(&self, thread_id: &str) -> Option<Thread> {
        self.threads.read().get(thread_id).cloned()
    }

    pub fn list_for_project(&self, project_id: &str) -> Vec<Thread> {
        let mut threads: Vec<Thread> = self
            .threads
            .read()
            .values()
            .filter(|t| t.project_id == project_id && !t.is_deleted())
            .cloned()
            .collect();
        threads.sort_by_key(|t| t.updated_at);
        threads
    }

    pub fn touch(&self, thread_id: &str) -> Result<()> {
        let mut threads = self.threads.write();
        let thread = threads
            .get_mut(thread_id)
            .ok_or_else(|| Error::NotFound(format!("thread {thread_id} not found")))?;
        thread.updated_at = Utc::now();
        drop(threads);
        self.flush()
    }

    pub fn soft_delete(&self, thread_id: &str) -> Result<()> {
        let mut threads = self.threads.write();
        let thread = threads
            .get_mut(thread_id)
            .ok_or_else(|| Error::NotFound(format!("thread {thread_id} not found")))?;
        thread.deleted_at = Some(Utc::now());
        drop(threads);
        self.flush()
    }

    /// Walk up the parent chain, bounded at [`MAX_THREAD_ANCESTORS`] hops.
    /// Stops early if a parent is missing or soft-deleted.
    pub fn ancestors(&self, thread_id: &str) -> Vec<Thread> {
        let mut chain = Vec::new();
        let mut current = self.get_including_deleted(thread_id);
        let mut hops = 0;

        while let Some(thread) = current {
            let Some(parent_id) = thread.parent_thread_id.clone() else {
                break;
            };
            if hops >= MAX_THREAD_ANCESTORS {
                break;
            }
            match self.get_including_deleted(&parent_id) {
                Some(parent) => {
                    chain.push(parent.clone());
                    current = Some(parent);
                    hops += 1;
                }
                None => break,
            }
        }

        chain
    }

    pub fn flush(&self) -> Result<()> {
        write_json_map(&self.path, &self.threads.read())
    }
}

fn load_json_map<T: serde::de::DeserializeOwned>(path: &Path) -> Result<HashMap<String, T>> {
    crate::json_map::load(path)
}

fn write_json_map<T: serde::Serialize>(path: &Path, map: &HashMap<String, T>) -> Result<()> {
    crate::json_map::write(path, map)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_and_get_project() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProjectStore::new(dir.path()).unwrap();
        let p = store.create("user-1".into(), "demo".into(), None).unwrap();
        assert_eq!(store.get(&p.id).unwrap().name, "demo");
    }

    #[test]
    fn list_for_owner_filters_by_owner() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProjectStore::new(dir.path()).unwrap();
        store.create("user-1".into(), "a".into(), None).unwrap();
        store.create("user-2".into(), "b".into(), None).unwrap();
        assert_eq!(store.list_for_owner("user-1").len(), 1);
    }

    #[test]
    fn soft_deleted_thread_is_invisible_to_get() {
        let dir = tempfile::tempdir().unwrap();
        let store = ThreadStore::new(dir.path()).unwrap();
        let t = store.create("p1".into(), None, None, None, None).unwrap();
        store.soft_delete(&t.id).unwrap();
        assert!(store.get(&t.id).is_none());
        assert!(store.get_including_deleted(&t.id).is_some());
    }

    #[test]
    fn parent_thread_from_other_project_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = ThreadStore::new(dir.path()).unwrap();
        let parent = store.create("p1".into(), None, None, None, None).unwrap();
        let result = store.create(
            "p2".into(),
            None,
            Some(parent.id.clone()),
            None,
            Some("excerpt".into()),
        );
        assert!(result.is_err());
    }

    #[test]
    fn ancestors_bounded_at_max_hops() {
        let dir = tempfile::tempdir().unwrap();
        let store = ThreadStore::new(dir.path()).unwrap();

        let root = store.create("p1".into(), None, None, None, None).unwrap();
        let mut parent_id = root.id.clone();
        for _ in 0..5 {
            let child = store
                .create("p1".into(), None, Some(parent_id.clone()), None, Some("ctx".into()))
                .unwrap();
            parent_id = child.id;
        }

        let ancestors = store.ancestors(&parent_id);
        assert_eq!(ancestors.len(), MAX_THREAD_ANCESTORS as usize);
    }
}
