//! Recording transport for tests and dry runs. Logs every message instead of
//! sending it and can be told to fail for particular chats.

use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use driverbot_core::error::{DriverBotError, Result};
use driverbot_core::traits::ChatTransport;
use driverbot_core::types::OutgoingMessage;

#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<OutgoingMessage>>,
    failing: Mutex<HashSet<i64>>,
    delay: Option<Duration>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every send sleeps first, to widen race windows in tests.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    /// Sends to `chat_id` fail from now on.
    pub fn fail_for(&self, chat_id: i64) {
        if let Ok(mut f) = self.failing.lock() {
            f.insert(chat_id);
        }
    }

    /// Successfully delivered messages, in send order.
    pub fn sent(&self) -> Vec<OutgoingMessage> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn sent_to(&self, chat_id: i64) -> Vec<OutgoingMessage> {
        self.sent()
            .into_iter()
            .filter(|m| m.chat_id == chat_id)
            .collect()
    }
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send(&self, message: OutgoingMessage) -> Result<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let fails = self
            .failing
            .lock()
            .map(|f| f.contains(&message.chat_id))
            .unwrap_or(false);
        if fails {
            return Err(DriverBotError::Delivery(format!(
                "chat {}: Forbidden: bot was blocked by the user",
                message.chat_id
            )));
        }
        tracing::debug!("📨 [recording] → {}: {}", message.chat_id, message.text);
        if let Ok(mut s) = self.sent.lock() {
            s.push(message);
        }
        Ok(())
    }
}
