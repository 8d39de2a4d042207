//! Delivery journal: recent broadcasts, for the admin endpoint.
//! In-memory ring buffer; lost on restart.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::dispatch::BroadcastReport;

const MAX_ENTRIES: usize = 100;

/// One finished broadcast.
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryRecord {
    /// "weekly", "one-off" or "immediate".
    pub source: String,
    /// First characters of the announcement.
    pub preview: String,
    pub report: BroadcastReport,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct DeliveryLog {
    entries: Vec<DeliveryRecord>,
}

impl DeliveryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, source: &str, text: &str, report: BroadcastReport) {
        self.entries.push(DeliveryRecord {
            source: source.to_string(),
            preview: preview(text),
            report,
            timestamp: Utc::now(),
        });
        if self.entries.len() > MAX_ENTRIES {
            self.entries.remove(0);
        }
    }

    /// Oldest first.
    pub fn entries(&self) -> &[DeliveryRecord] {
        &self.entries
    }
}

fn preview(text: &str) -> String {
    const LEN: usize = 80;
    if text.chars().count() > LEN {
        format!("{}...", text.chars().take(LEN).collect::<String>())
    } else {
        text.to_string()
    }
}
