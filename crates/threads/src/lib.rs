//! Project, Thread, Turn, Resource, Notification, and Finding persistence.
//!
//! Projects, Threads, Resources, and Notifications are small, low-volume
//! records kept in a single JSON file each (see [`json_map`]); Turns and
//! Findings are append-only and kept as JSONL, mirroring the shape of an
//! ever-growing transcript.

pub(crate) mod json_map;

pub mod finding_store;
pub mod notification_store;
pub mod resource_store;
pub mod thread_store;
pub mod turn_store;

pub use finding_store::FindingStore;
pub use notification_store::NotificationStore;
pub use resource_store::ResourceStore;
pub use thread_store::{ProjectStore, ThreadStore};
pub use turn_store::TurnStore;
