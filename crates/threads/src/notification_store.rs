//! Notification store, backed by a single `notifications.json` file.
//!
//! Notifications are low-volume and occasionally mutated in place (marking
//! read), so they follow the Project/Thread/Resource pattern rather than
//! the append-only Turn/Finding one.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use sa_domain::error::{Error, Result};
use sa_domain::model::Notification;

pub struct NotificationStore {
    path: PathBuf,
    notifications: RwLock<HashMap<String, Notification>>,
}

impl NotificationStore {
    pub fn new(state_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(state_dir).map_err(Error::Io)?;
        let path = state_dir.join("notifications.json");
        let notifications = crate::json_map::load(&path)?;

        tracing::info!(
            notifications = notifications.len(),
            path = %path.display(),
            "notification store loaded"
        );

        Ok(Self {
            path,
            notifications: RwLock::new(notifications),
        })
    }

    pub fn insert(&self, notification: Notification) -> Result<Notification> {
        self.notifications
            .write()
            .insert(notification.id.clone(), notification.clone());
        self.flush()?;
        Ok(notification)
    }

    pub fn get(&self, notification_id: &str) -> Option<Notification> {
        self.notifications.read().get(notification_id).cloned()
    }

    pub fn list_for_project(&self, project_id: &str, unread_only: bool) -> Vec<Notification> {
        let mut notifications: Vec<Notification> = self
            .notifications
            .read()
            .values()
            .filter(|n| n.project_id == project_id)
            .filter(|n| !unread_only || !n.read)
            .cloned()
            .collect();
        notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        notifications
    }

    pub fn mark_read(&self, notification_id: &str) -> Result<Notification> {
        let mut notifications = self.notifications.write();
        let notification = notifications
            .get_mut(notification_id)
            .ok_or_else(|| Error::NotFound(format!("notification {notification_id} not found")))?;
        notification.read = true;
        let updated = notification.clone();
        drop(notifications);
        self.flush()?;
        Ok(updated)
    }

    pub fn flush(&self) -> Result<()> {
        crate::json_map::write(&self.path, &self.notifications.read())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sa_domain::model::NotificationKind;

    fn notification(id: &str, project_id: &str, kind: NotificationKind) -> Notification {
        Notification {
            id: id.into(),
            project_id: project_id.into(),
            thread_id: "t1".into(),
            job_id: "j1".into(),
            kind,
            title: "done".into(),
            body: "job finished".into(),
            read: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn insert_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = NotificationStore::new(dir.path()).unwrap();
        store
            .insert(notification("n1", "p1", NotificationKind::JobCompleted))
            .unwrap();
        assert_eq!(store.get("n1").unwrap().project_id, "p1");
    }

    #[test]
    fn list_for_project_unread_only_filters_read() {
        let dir = tempfile::tempdir().unwrap();
        let store = NotificationStore::new(dir.path()).unwrap();
        store
            .insert(notification("n1", "p1", NotificationKind::JobCompleted))
            .unwrap();
        store
            .insert(notification("n2", "p1", NotificationKind::JobFailed))
            .unwrap();
        store.mark_read("n1").unwrap();

        let unread = store.list_for_project("p1", true);
        assert_eq!(unread.len(), 1);
        assert_eq!(unread[0].id, "n2");

        let all = store.list_for_project("p1", false);
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn mark_read_on_unknown_id_errors() {
        let dir = tempfile::tempdir().unwrap();
        let store = NotificationStore::new(dir.path()).unwrap();
        assert!(store.mark_read("nope").is_err());
    }
}
