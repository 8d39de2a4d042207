//! Delivery fan-out: sends one announcement to every eligible destination.
//!
//! Sends are sequential. A failed destination is logged and skipped; it never
//! aborts the batch and is never retried here.

use std::sync::Arc;

use driverbot_core::types::{LinkButton, OutgoingMessage};
use driverbot_core::{ChatTransport, Destination};
use serde::Serialize;

/// Outcome of one broadcast.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BroadcastReport {
    /// Destinations a send was attempted for.
    pub attempted: usize,
    pub delivered: usize,
    /// Admin or disabled destinations left out.
    pub skipped: usize,
    /// `(chat_id, error)` per failed destination.
    pub failed: Vec<(i64, String)>,
}

/// Announcement prefix shown to drivers.
pub fn format_announcement(message: &str) -> String {
    format!("📢 ANNOUNCEMENT:\n\n{message}")
}

/// Fan-out over a chat transport.
#[derive(Clone)]
pub struct Fanout {
    transport: Arc<dyn ChatTransport>,
}

impl Fanout {
    pub fn new(transport: Arc<dyn ChatTransport>) -> Self {
        Self { transport }
    }

    /// Send `text` to every enabled driver destination, optionally with a
    /// campaign link button.
    pub async fn broadcast(
        &self,
        text: &str,
        destinations: &[Destination],
        link: Option<&LinkButton>,
    ) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        let body = format_announcement(text);

        for dest in destinations {
            if !dest.receives_broadcasts() {
                report.skipped += 1;
                continue;
            }
            report.attempted += 1;

            let msg = OutgoingMessage::plain(dest.id, body.clone()).with_link(link.cloned());
            match self.transport.send(msg).await {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    tracing::warn!("⚠️ Failed to send to group {} ({}): {e}", dest.name, dest.id);
                    report.failed.push((dest.id, e.to_string()));
                }
            }
        }

        tracing::info!(
            "📣 Broadcast via {}: {}/{} delivered, {} skipped",
            self.transport.name(),
            report.delivered,
            report.attempted,
            report.skipped
        );
        report
    }
}
