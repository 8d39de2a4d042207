//! Serialized read-modify-write over the state store.
//!
//! Every in-process writer (coordinator commits, group registration, the
//! questionnaire, the admin endpoint) goes through one [`DocumentWriter`], so a
//! write always starts from the freshest stored document and two writers in
//! this process never overwrite each other. The lane is held for the store
//! round-trip only, never across chat sends.

use std::sync::Arc;

use driverbot_core::error::Result;
use driverbot_core::normalize::normalize;
use driverbot_core::{Document, StateStore};
use tokio::sync::Mutex;

use crate::snapshot::SnapshotCache;

pub struct DocumentWriter {
    store: Arc<dyn StateStore>,
    snapshot: Arc<SnapshotCache>,
    lane: Mutex<()>,
}

impl DocumentWriter {
    pub fn new(store: Arc<dyn StateStore>, snapshot: Arc<SnapshotCache>) -> Self {
        Self {
            store,
            snapshot,
            lane: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    pub fn snapshot(&self) -> &Arc<SnapshotCache> {
        &self.snapshot
    }

    /// Load fresh, apply `edit`, normalize, save and publish.
    ///
    /// Returns the saved document and whatever `edit` returned. Nothing is
    /// saved if `edit` returns `None`.
    pub async fn update<T, F>(&self, edit: F) -> Result<(Document, Option<T>)>
    where
        F: FnOnce(&mut Document) -> Option<T>,
    {
        let _lane = self.lane.lock().await;
        let mut doc = self.store.load().await?;
        let Some(out) = edit(&mut doc) else {
            return Ok((doc, None));
        };
        let doc = normalize(doc);
        self.store.save(&doc).await?;
        self.snapshot.publish(doc.clone());
        Ok((doc, Some(out)))
    }

    /// Replace the stored document wholesale (after normalizing).
    pub async fn replace(&self, doc: Document) -> Result<Document> {
        let (doc, _) = self
            .update(move |current| {
                *current = doc;
                Some(())
            })
            .await?;
        Ok(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use driverbot_core::Destination;
    use driverbot_store::MemoryStore;

    fn writer(store: Arc<MemoryStore>) -> DocumentWriter {
        DocumentWriter::new(store, Arc::new(SnapshotCache::default()))
    }

    #[tokio::test]
    async fn test_update_starts_from_fresh_state() {
        let store = Arc::new(MemoryStore::new());
        let w = writer(store.clone());

        store.replace_raw(serde_json::json!({"groups": [{"id": 1, "name": "a"}]}));
        let (doc, _) = w
            .update(|d| {
                d.groups.push(Destination::driver(2, "b"));
                Some(())
            })
            .await
            .unwrap();
        assert_eq!(doc.groups.len(), 2);
        assert_eq!(w.snapshot().current().doc.groups.len(), 2);
        assert_eq!(store.save_count(), 1);
    }

    #[tokio::test]
    async fn test_update_normalizes_and_skips_noop() {
        let store = Arc::new(MemoryStore::new());
        let w = writer(store.clone());

        let (doc, _) = w
            .update(|d| {
                d.groups.push(Destination::driver(5, "x"));
                d.groups.push(Destination::driver(5, "dup"));
                Some(())
            })
            .await
            .unwrap();
        assert_eq!(doc.groups.len(), 1);

        let (_, out) = w.update(|_| None::<()>).await.unwrap();
        assert!(out.is_none());
        assert_eq!(store.save_count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_updates_do_not_lose_writes() {
        let store = Arc::new(MemoryStore::new());
        let w = Arc::new(writer(store.clone()));

        let tasks: Vec<_> = (0..20)
            .map(|i| {
                let w = w.clone();
                tokio::spawn(async move {
                    w.update(move |d| {
                        d.groups.push(Destination::driver(i, "g"));
                        Some(())
                    })
                    .await
                })
            })
            .collect();
        for t in tasks {
            t.await.unwrap().unwrap();
        }
        assert_eq!(store.load().await.unwrap().groups.len(), 20);
    }

    #[tokio::test]
    async fn test_failed_save_is_reported() {
        let store = Arc::new(MemoryStore::new());
        store.fail_next_saves(1);
        let w = writer(store.clone());
        let err = w.replace(Document::default()).await.unwrap_err();
        assert!(err.is_store_unavailable());
        assert_eq!(w.snapshot().current().version, 0);
    }
}
