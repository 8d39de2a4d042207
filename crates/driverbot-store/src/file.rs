//! File-based document store: one human-readable JSON file.
//! Writes go to a sibling temp file first and are renamed into place, so a
//! crash mid-write leaves the previous version intact.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use driverbot_core::error::{DriverBotError, Result};
use driverbot_core::{Document, StateStore};

/// Local JSON file store.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl StateStore for FileStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn load_raw(&self) -> Result<serde_json::Value> {
        let json = match tokio::fs::read_to_string(&self.path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(serde_json::Value::Null);
            }
            Err(e) => {
                return Err(DriverBotError::StoreUnavailable(format!(
                    "Read {}: {e}",
                    self.path.display()
                )));
            }
        };
        // A corrupt file is a malformed document, not an outage.
        Ok(serde_json::from_str(&json).unwrap_or_else(|e| {
            tracing::warn!("⚠️ Failed to parse {}: {e}", self.path.display());
            serde_json::Value::Null
        }))
    }

    async fn save(&self, doc: &Document) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(unavailable)?;
        }
        let json = serde_json::to_string_pretty(doc)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await.map_err(unavailable)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(unavailable)?;
        tracing::debug!("💾 Saved document to {}", self.path.display());
        Ok(())
    }
}

fn unavailable(e: std::io::Error) -> DriverBotError {
    DriverBotError::StoreUnavailable(format!("Write error: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use driverbot_core::Destination;

    #[tokio::test]
    async fn test_missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("state.json"));
        let doc = store.load().await.unwrap();
        assert_eq!(doc, Document::default());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("nested").join("state.json"));
        let mut doc = Document::default();
        doc.groups.push(Destination::driver(-1001, "Depot North"));
        doc.immediate_queue = Some("Fuel card update".into());
        store.save(&doc).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded, doc);
        assert!(!store.path().with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_corrupt_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{not json").unwrap();
        let doc = FileStore::new(&path).load().await.unwrap();
        assert!(doc.groups.is_empty());
    }
}
