//! Group self-registration: any activity in an unknown group chat adds it as
//! an enabled driver destination.

use std::sync::Arc;

use driverbot_core::error::Result;
use driverbot_core::types::{ChatKind, IncomingMessage};
use driverbot_core::Destination;
use driverbot_scheduler::DocumentWriter;

pub struct GroupRegistry {
    writer: Arc<DocumentWriter>,
}

impl GroupRegistry {
    pub fn new(writer: Arc<DocumentWriter>) -> Self {
        Self { writer }
    }

    /// Register the message's group if it is new. Returns true if added.
    pub async fn observe(&self, msg: &IncomingMessage) -> Result<bool> {
        if msg.chat_kind != ChatKind::Group {
            return Ok(false);
        }
        // Known groups never touch the store.
        if self.writer.snapshot().current().doc.group(msg.chat_id).is_some() {
            return Ok(false);
        }

        let id = msg.chat_id;
        let name = msg
            .chat_title
            .clone()
            .unwrap_or_else(|| id.to_string());

        let (_, added) = self
            .writer
            .update(|doc| {
                if doc.group(id).is_some() {
                    return None;
                }
                doc.groups.push(Destination::driver(id, &name));
                Some(())
            })
            .await?;

        if added.is_some() {
            tracing::info!("👥 New group registered: {name} ({id})");
        }
        Ok(added.is_some())
    }
}
