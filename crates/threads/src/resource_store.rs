//! Resource store — the core's read side of the ingestion pipeline's
//! output. Ingestion (external collaborator, out of scope here) owns
//! writes; the core only needs `upsert`/`get`/`list_for_project` to
//! build the flat projection the Tool Registry and HTTP surface expose.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use sa_domain::error::Result;
use sa_domain::model::{Resource, ResourceStatus, ResourceType};

pub struct ResourceStore {
    path: PathBuf,
    resources: RwLock<HashMap<String, Resource>>,
}

impl ResourceStore {
    pub fn new(state_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(state_dir)?;
        let path = state_dir.join("resources.json");
        let resources = crate::json_map::load(&path)?;

        tracing::info!(
            resources = resources.len(),
            path = %path.display(),
            "resource store loaded"
        );

        Ok(Self {
            path,
            resources: RwLock::new(resources),
        })
    }

    /// Insert or replace a resource's projection, e.g. as ingestion
    /// advances its status.
    pub fn upsert(&self, resource: Resource) -> Result<Resource> {
        self.resources.write().insert(resource.id.clone(), resource.clone());
        self.flush()?;
        Ok(resource)
    }

    pub fn get(&self, resource_id: &str) -> Option<Resource> {
        self.resources.read().get(resource_id).cloned()
    }

    pub fn list_for_project(
        &self,
        project_id: &str,
        kind: Option<ResourceType>,
        status: Option<ResourceStatus>,
    ) -> Vec<Resource> {
        let mut resources: Vec<Resource> = self
            .resources
            .read()
            .values()
            .filter(|r| r.project_id == project_id)
            .filter(|r| kind.map_or(true, |k| r.kind == k))
            .filter(|r| status.map_or(true, |s| r.status == s))
            .cloned()
            .collect();
        resources.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        resources
    }

    pub fn flush(&self) -> Result<()> {
        crate::json_map::write(&self.path, &self.resources.read())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn resource(id: &str, project_id: &str, kind: ResourceType) -> Resource {
        Resource {
            id: id.into(),
            project_id: project_id.into(),
            name: format!("{id}.txt"),
            kind,
            status: ResourceStatus::Indexed,
            summary: None,
            file_path: None,
            metadata: serde_json::Value::Null,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn upsert_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResourceStore::new(dir.path()).unwrap();
        store.upsert(resource("r1", "p1", ResourceType::Document)).unwrap();
        assert_eq!(store.get("r1").unwrap().project_id, "p1");
    }

    #[test]
    fn list_for_project_filters_by_type() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResourceStore::new(dir.path()).unwrap();
        store.upsert(resource("r1", "p1", ResourceType::Document)).unwrap();
        store.upsert(resource("r2", "p1", ResourceType::Image)).unwrap();
        store.upsert(resource("r3", "p2", ResourceType::Document)).unwrap();

        let docs = store.list_for_project("p1", Some(ResourceType::Document), None);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id, "r1");
    }

    #[test]
    fn upsert_replaces_existing_status() {
        let dir = tempfile::tempdir().unwrap();
        let store = ResourceStore::new(dir.path()).unwrap();
        store.upsert(resource("r1", "p1", ResourceType::DataFile)).unwrap();
        let mut updated = resource("r1", "p1", ResourceType::DataFile);
        updated.status = ResourceStatus::Analyzed;
        store.upsert(updated).unwrap();
        assert_eq!(store.get("r1").unwrap().status, ResourceStatus::Analyzed);
    }
}
