//! In-process store for tests and dry runs.
//!
//! Holds the raw JSON value (so tests can seed malformed documents) and can be
//! told to fail upcoming loads or saves.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use async_trait::async_trait;
use driverbot_core::error::{DriverBotError, Result};
use driverbot_core::{Document, StateStore};

/// Memory-backed document store.
#[derive(Default)]
pub struct MemoryStore {
    value: Mutex<serde_json::Value>,
    fail_loads: AtomicU32,
    fail_saves: AtomicU32,
    saves: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with a typed document.
    pub fn with_document(doc: &Document) -> Self {
        Self::with_value(serde_json::to_value(doc).unwrap_or_default())
    }

    /// Store seeded with arbitrary JSON.
    pub fn with_value(value: serde_json::Value) -> Self {
        Self {
            value: Mutex::new(value),
            ..Self::default()
        }
    }

    /// Make the next `n` loads fail with `StoreUnavailable`.
    pub fn fail_next_loads(&self, n: u32) {
        self.fail_loads.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` saves fail with `StoreUnavailable`.
    pub fn fail_next_saves(&self, n: u32) {
        self.fail_saves.store(n, Ordering::SeqCst);
    }

    /// Number of successful saves so far.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Current stored JSON.
    pub fn raw(&self) -> serde_json::Value {
        self.value.lock().map(|v| v.clone()).unwrap_or_default()
    }

    /// Overwrite the stored JSON, as a concurrent writer would.
    pub fn replace_raw(&self, value: serde_json::Value) {
        if let Ok(mut v) = self.value.lock() {
            *v = value;
        }
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn load_raw(&self) -> Result<serde_json::Value> {
        if Self::take_failure(&self.fail_loads) {
            return Err(DriverBotError::StoreUnavailable("injected load failure".into()));
        }
        Ok(self.raw())
    }

    async fn save(&self, doc: &Document) -> Result<()> {
        if Self::take_failure(&self.fail_saves) {
            return Err(DriverBotError::StoreUnavailable("injected save failure".into()));
        }
        let value = serde_json::to_value(doc)?;
        self.replace_raw(value);
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
