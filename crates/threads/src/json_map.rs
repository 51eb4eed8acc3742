//! Shared single-file JSON-map persistence, used by every low-volume
//! store (Project, Thread, Resource, Notification) in this crate.

use std::collections::HashMap;
use std::path::Path;

use sa_domain::error::{Error, Result};

pub(crate) fn load<T: serde::de::DeserializeOwned>(path: &Path) -> Result<HashMap<String, T>> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let raw = std::fs::read_to_string(path).map_err(Error::Io)?;
    Ok(serde_json::from_str(&raw).unwrap_or_default())
}

pub(crate) fn write<T: serde::Serialize>(path: &Path, map: &HashMap<String, T>) -> Result<()> {
    let json = serde_json::to_string_pretty(map)
        .map_err(|e| Error::Other(format!("serializing store: {e}")))?;
    std::fs::write(path, json).map_err(Error::Io)
}
