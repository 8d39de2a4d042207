//! Trait seams between the coordinator and its collaborators.

use async_trait::async_trait;

use crate::document::Document;
use crate::error::Result;
use crate::normalize;
use crate::types::OutgoingMessage;

/// A whole-document store with last-writer-wins semantics.
///
/// No atomicity across writers is assumed; a load may return any previously
/// written version.
#[async_trait]
pub trait StateStore: Send + Sync {
    fn name(&self) -> &str;

    /// Fetch the raw stored JSON. A missing document is `Value::Null`.
    async fn load_raw(&self) -> Result<serde_json::Value>;

    /// Replace the stored document.
    async fn save(&self, doc: &Document) -> Result<()>;

    /// Fetch and normalize. Every consumer should go through this.
    async fn load(&self) -> Result<Document> {
        let raw = self.load_raw().await?;
        Ok(normalize::from_value(raw))
    }
}

/// Outbound side of the chat platform.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    fn name(&self) -> &str;

    /// Deliver one message. Errors are per call and never fatal to the caller.
    async fn send(&self, message: OutgoingMessage) -> Result<()>;
}
