//! Telegram Bot channel: long polling + message sending via Bot API.

use async_trait::async_trait;
use driverbot_core::config::TelegramConfig;
use driverbot_core::error::{DriverBotError, Result};
use driverbot_core::traits::ChatTransport;
use driverbot_core::types::{ChatKind, Formatting, IncomingMessage, OutgoingMessage, ReplyMarkup};
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::task::{Context, Poll};

/// Telegram Bot channel with polling loop.
pub struct TelegramChannel {
    config: TelegramConfig,
    client: reqwest::Client,
    last_update_id: i64,
}

impl TelegramChannel {
    pub fn new(config: TelegramConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            last_update_id: 0,
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.config.api_base.trim_end_matches('/'),
            self.config.bot_token,
            method
        )
    }

    /// Get updates using long polling.
    pub async fn get_updates(&mut self) -> Result<Vec<TelegramUpdate>> {
        let response = self
            .client
            .get(self.api_url("getUpdates"))
            .query(&[
                ("offset", (self.last_update_id + 1).to_string()),
                ("timeout", self.config.poll_timeout_secs.to_string()),
                ("allowed_updates", "[\"message\"]".into()),
            ])
            .send()
            .await
            .map_err(|e| DriverBotError::Channel(format!("Telegram getUpdates failed: {e}")))?;

        let body: TelegramApiResponse<Vec<TelegramUpdate>> = response
            .json()
            .await
            .map_err(|e| DriverBotError::Channel(format!("Invalid Telegram response: {e}")))?;

        if !body.ok {
            return Err(DriverBotError::Channel(format!(
                "Telegram API error: {}",
                body.description.unwrap_or_default()
            )));
        }

        let updates = body.result.unwrap_or_default();
        if let Some(last) = updates.last() {
            self.last_update_id = last.update_id;
        }
        Ok(updates)
    }

    /// Send a message with optional formatting and markup.
    pub async fn send_message(&self, message: &OutgoingMessage) -> Result<()> {
        let body = send_message_body(message);

        let response = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&body)
            .timeout(std::time::Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| DriverBotError::Delivery(format!("sendMessage failed: {e}")))?;

        let result: TelegramApiResponse<serde_json::Value> = response
            .json()
            .await
            .map_err(|e| DriverBotError::Delivery(format!("Invalid send response: {e}")))?;

        if !result.ok {
            return Err(DriverBotError::Delivery(format!(
                "chat {}: {}",
                message.chat_id,
                result.description.unwrap_or_default()
            )));
        }
        Ok(())
    }

    /// Get bot info.
    pub async fn get_me(&self) -> Result<TelegramUser> {
        let response = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| DriverBotError::Channel(format!("getMe failed: {e}")))?;
        let body: TelegramApiResponse<TelegramUser> = response
            .json()
            .await
            .map_err(|e| DriverBotError::Channel(format!("Invalid getMe response: {e}")))?;
        body.result
            .ok_or_else(|| DriverBotError::Channel("No bot info".into()))
    }

    /// Start polling loop: returns a stream of IncomingMessages.
    pub fn start_polling(self) -> TelegramPollingStream {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

        tokio::spawn(async move {
            let mut channel = self;
            tracing::info!("Telegram polling loop started");

            loop {
                match channel.get_updates().await {
                    Ok(updates) => {
                        for update in updates {
                            if let Some(msg) = update.to_incoming()
                                && tx.send(msg).is_err()
                            {
                                tracing::info!("Telegram polling stopped (receiver dropped)");
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        tracing::error!("Telegram polling error: {e}");
                        tokio::time::sleep(tokio::time::Duration::from_secs(5)).await;
                    }
                }
                if tx.is_closed() {
                    tracing::info!("Telegram polling stopped (receiver dropped)");
                    return;
                }
            }
        });

        TelegramPollingStream { rx }
    }
}

/// Build the `sendMessage` JSON body.
fn send_message_body(message: &OutgoingMessage) -> serde_json::Value {
    let mut body = serde_json::json!({
        "chat_id": message.chat_id,
        "text": message.text,
    });
    if message.formatting == Formatting::Html {
        body["parse_mode"] = "HTML".into();
    }
    if let Some(markup) = &message.markup {
        body["reply_markup"] = reply_markup_json(markup);
    }
    body
}

fn reply_markup_json(markup: &ReplyMarkup) -> serde_json::Value {
    match markup {
        ReplyMarkup::Keyboard(options) => serde_json::json!({
            "keyboard": options.iter().map(|o| vec![serde_json::json!({"text": o})]).collect::<Vec<_>>(),
            "one_time_keyboard": true,
            "resize_keyboard": true,
        }),
        ReplyMarkup::RemoveKeyboard => serde_json::json!({"remove_keyboard": true}),
        ReplyMarkup::Link(button) => serde_json::json!({
            "inline_keyboard": [[{"text": button.label, "url": button.url}]],
        }),
    }
}

/// Deep link that opens a private chat with the bot and sends `/start <payload>`.
pub fn deep_link(bot_username: &str, payload: &str) -> String {
    format!(
        "https://t.me/{}?start={}",
        bot_username.trim_start_matches('@'),
        payload
    )
}

/// Stream of incoming Telegram messages from polling.
pub struct TelegramPollingStream {
    rx: tokio::sync::mpsc::UnboundedReceiver<IncomingMessage>,
}

impl Stream for TelegramPollingStream {
    type Item = IncomingMessage;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Sending half only. Cheap to clone; polling uses its own [`TelegramChannel`].
#[derive(Clone)]
pub struct TelegramSender {
    inner: std::sync::Arc<TelegramChannel>,
}

impl TelegramSender {
    pub fn new(config: TelegramConfig) -> Self {
        Self {
            inner: std::sync::Arc::new(TelegramChannel::new(config)),
        }
    }

    pub async fn get_me(&self) -> Result<TelegramUser> {
        self.inner.get_me().await
    }
}

#[async_trait]
impl ChatTransport for TelegramSender {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn send(&self, message: OutgoingMessage) -> Result<()> {
        self.inner.send_message(&message).await
    }
}

// --- Telegram API Types ---

#[derive(Debug, Deserialize)]
pub struct TelegramApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramUpdate {
    pub update_id: i64,
    pub message: Option<TelegramMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramMessage {
    pub message_id: i64,
    pub from: Option<TelegramUser>,
    pub chat: TelegramChat,
    pub text: Option<String>,
    pub date: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramUser {
    pub id: i64,
    pub is_bot: bool,
    pub first_name: String,
    pub last_name: Option<String>,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramChat {
    pub id: i64,
    #[serde(rename = "type")]
    pub chat_type: String,
    pub title: Option<String>,
}

impl TelegramUpdate {
    /// Convert to an IncomingMessage. Group messages are kept even without
    /// text so that any activity registers the group.
    pub fn to_incoming(&self) -> Option<IncomingMessage> {
        let msg = self.message.as_ref()?;

        // Skip bot messages
        if msg.from.as_ref().is_some_and(|f| f.is_bot) {
            return None;
        }

        let chat_kind = match msg.chat.chat_type.as_str() {
            "private" => ChatKind::Private,
            "group" | "supergroup" => ChatKind::Group,
            _ => ChatKind::Other,
        };

        Some(IncomingMessage {
            chat_id: msg.chat.id,
            chat_kind,
            chat_title: msg.chat.title.clone(),
            sender_id: msg.from.as_ref().map(|f| f.id),
            sender_name: msg.from.as_ref().map(|from| {
                format!(
                    "{}{}",
                    from.first_name,
                    from.last_name
                        .as_deref()
                        .map(|l| format!(" {l}"))
                        .unwrap_or_default()
                )
            }),
            text: msg.text.clone(),
            timestamp: chrono::DateTime::from_timestamp(msg.date, 0)
                .unwrap_or_else(chrono::Utc::now),
        })
    }
}
