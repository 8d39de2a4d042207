//! # DriverBot Survey
//!
//! Everything the bot does with incoming chat messages: registering group
//! chats as destinations and running the feedback questionnaire in private
//! chats.

pub mod flow;
pub mod registration;

use std::sync::Arc;

use driverbot_core::types::{ChatKind, IncomingMessage};
use driverbot_core::ChatTransport;
use driverbot_scheduler::DocumentWriter;

pub use flow::{SurveyFlow, escape_html, format_report};
pub use registration::GroupRegistry;

/// Routes incoming messages to registration or the questionnaire.
pub struct Inbox {
    registry: GroupRegistry,
    survey: SurveyFlow,
}

impl Inbox {
    pub fn new(writer: Arc<DocumentWriter>, transport: Arc<dyn ChatTransport>) -> Self {
        Self {
            registry: GroupRegistry::new(writer.clone()),
            survey: SurveyFlow::new(writer, transport),
        }
    }

    /// Handle one message. Errors are logged, never returned; the listener
    /// keeps going.
    pub async fn handle(&self, msg: &IncomingMessage) {
        let result = match msg.chat_kind {
            ChatKind::Group => self.registry.observe(msg).await.map(|_| ()),
            ChatKind::Private => match msg.text.as_deref() {
                Some(text) if is_start_command(text) => self.survey.start(msg.chat_id).await,
                Some(text) => self.survey.answer(msg.chat_id, text).await,
                None => Ok(()),
            },
            ChatKind::Other => Ok(()),
        };
        if let Err(e) = result {
            tracing::error!("❌ Failed to handle message from chat {}: {e}", msg.chat_id);
        }
    }
}

/// `/start`, `/start <payload>` and `/start@botname`.
fn is_start_command(text: &str) -> bool {
    let cmd = text.split_whitespace().next().unwrap_or_default();
    cmd == "/start" || cmd.starts_with("/start@")
}
