//! # DriverBot Store
//! Whole-document state stores. Every backend reads and replaces a single JSON
//! object; none of them offers partial updates or concurrency tokens.

pub mod file;
pub mod memory;
pub mod pantry;

use std::sync::Arc;

use driverbot_core::StateStore;
use driverbot_core::config::{StoreBackend, StoreConfig};
use driverbot_core::error::Result;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use pantry::PantryStore;

/// Build the store selected in config.
pub fn from_config(config: &StoreConfig) -> Result<Arc<dyn StateStore>> {
    let store: Arc<dyn StateStore> = match config.backend {
        StoreBackend::Pantry => Arc::new(PantryStore::new(config)?),
        StoreBackend::File => Arc::new(FileStore::new(config.expanded_path())),
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
    };
    tracing::info!("💾 State store: {}", store.name());
    Ok(store)
}
