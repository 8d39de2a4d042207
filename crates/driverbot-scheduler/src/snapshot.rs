//! Versioned document snapshot shared between the coordinator, the
//! questionnaire flow and the admin endpoint.
//!
//! Writers build a new document locally and publish it whole; readers get an
//! `Arc` they can hold across awaits without blocking anyone.

use std::sync::{Arc, RwLock};

use driverbot_core::Document;

/// One published version of the document.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub version: u64,
    pub doc: Arc<Document>,
}

/// Latest known document. Never a source of truth for decisions: every cycle
/// still loads from the store.
#[derive(Debug)]
pub struct SnapshotCache {
    current: RwLock<Snapshot>,
}

impl Default for SnapshotCache {
    fn default() -> Self {
        Self::new(Document::default())
    }
}

impl SnapshotCache {
    pub fn new(doc: Document) -> Self {
        Self {
            current: RwLock::new(Snapshot {
                version: 0,
                doc: Arc::new(doc),
            }),
        }
    }

    pub fn current(&self) -> Snapshot {
        match self.current.read() {
            Ok(s) => s.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Replace the shared document; returns the new version.
    pub fn publish(&self, doc: Document) -> u64 {
        let mut guard = match self.current.write() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        let version = guard.version + 1;
        *guard = Snapshot {
            version,
            doc: Arc::new(doc),
        };
        version
    }
}
