//! Message types exchanged with the chat transport.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How the transport should render message text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Formatting {
    #[default]
    Plain,
    Html,
}

/// An inline button that opens a URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkButton {
    pub label: String,
    pub url: String,
}

/// Optional markup attached to a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplyMarkup {
    /// One-time reply keyboard, one option per row.
    Keyboard(Vec<String>),
    /// Hide any reply keyboard the chat is showing.
    RemoveKeyboard,
    /// Inline URL button under the message.
    Link(LinkButton),
}

/// A message to deliver to one chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub chat_id: i64,
    pub text: String,
    pub formatting: Formatting,
    pub markup: Option<ReplyMarkup>,
}

impl OutgoingMessage {
    pub fn plain(chat_id: i64, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            text: text.into(),
            formatting: Formatting::Plain,
            markup: None,
        }
    }

    pub fn html(chat_id: i64, text: impl Into<String>) -> Self {
        Self {
            formatting: Formatting::Html,
            ..Self::plain(chat_id, text)
        }
    }

    pub fn with_markup(mut self, markup: ReplyMarkup) -> Self {
        self.markup = Some(markup);
        self
    }

    pub fn with_link(self, link: Option<LinkButton>) -> Self {
        match link {
            Some(button) => self.with_markup(ReplyMarkup::Link(button)),
            None => self,
        }
    }
}

/// Chat kind as reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChatKind {
    Private,
    Group,
    Other,
}

/// A message received from the transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingMessage {
    pub chat_id: i64,
    pub chat_kind: ChatKind,
    pub chat_title: Option<String>,
    pub sender_id: Option<i64>,
    pub sender_name: Option<String>,
    /// `None` for non-text messages (photos, joins, ...).
    pub text: Option<String>,
    pub timestamp: DateTime<Utc>,
}
