//! The persisted document: the entire bot state, read and written as one unit.
//!
//! Field layout matches the JSON basket the bot has always used, so documents
//! written by older versions (or by hand in the admin panel) still load.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Root document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub questions: Vec<Question>,
    #[serde(default)]
    pub groups: Vec<Destination>,
    #[serde(default)]
    pub history: Vec<SubmittedReport>,
    /// In-progress questionnaires, keyed by private chat id (decimal string).
    #[serde(default)]
    pub sessions: BTreeMap<String, InProgressSurvey>,
    #[serde(default)]
    pub scheduled_queue: Vec<ScheduledItem>,
    /// At most one pending immediate broadcast.
    #[serde(default)]
    pub immediate_queue: Option<String>,
    #[serde(default)]
    pub weekly_schedule: WeeklyCampaignConfig,
    /// `YYYY-MM-DD` in the campaign time zone, or empty.
    #[serde(default)]
    pub last_weekly_run: String,
    /// Top-level keys this version does not know about. Kept so that a
    /// whole-document replace never drops data written by other tools.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Document {
    /// Look up a destination by chat id.
    pub fn group(&self, id: i64) -> Option<&Destination> {
        self.groups.iter().find(|g| g.id == id)
    }

    pub fn group_mut(&mut self, id: i64) -> Option<&mut Destination> {
        self.groups.iter_mut().find(|g| g.id == id)
    }

    /// Whether a campaign link into the questionnaire leads anywhere.
    pub fn has_questions(&self) -> bool {
        !self.questions.is_empty()
    }

    /// Enabled admin destinations (feedback report recipients).
    pub fn admin_groups(&self) -> impl Iterator<Item = &Destination> {
        self.groups
            .iter()
            .filter(|g| g.enabled && g.role == DestinationRole::Admin)
    }
}

/// A questionnaire question. Identity is `text`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub text: String,
    #[serde(rename = "type", alias = "kind", default)]
    pub kind: QuestionKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

impl Question {
    pub fn free_text(text: &str) -> Self {
        Self {
            text: text.to_string(),
            kind: QuestionKind::FreeText,
            options: Vec::new(),
        }
    }

    pub fn choice(text: &str, options: &[&str]) -> Self {
        Self {
            text: text.to_string(),
            kind: QuestionKind::Choice,
            options: options.iter().map(|o| o.to_string()).collect(),
        }
    }

    /// Options to render as a reply keyboard, if any.
    pub fn keyboard_options(&self) -> Option<&[String]> {
        (self.kind == QuestionKind::Choice && !self.options.is_empty())
            .then_some(self.options.as_slice())
    }
}

/// Question kind. Anything unrecognised is treated as free text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuestionKind {
    #[serde(rename = "choice")]
    Choice,
    #[default]
    #[serde(rename = "text", other)]
    FreeText,
}

/// A registered group chat. Identity is `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub role: DestinationRole,
}

fn default_true() -> bool {
    true
}

impl Destination {
    pub fn driver(id: i64, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            enabled: true,
            role: DestinationRole::Driver,
        }
    }

    pub fn admin(id: i64, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            enabled: true,
            role: DestinationRole::Admin,
        }
    }

    /// Drivers that are enabled receive announcements; admins never do.
    pub fn receives_broadcasts(&self) -> bool {
        self.enabled && self.role == DestinationRole::Driver
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DestinationRole {
    Admin,
    #[default]
    #[serde(other)]
    Driver,
}

/// A pending one-off announcement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledItem {
    pub text: String,
    pub fire_at: DateTime<Utc>,
    #[serde(default)]
    pub include_campaign_link: bool,
}

/// Recurring weekly campaign settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyCampaignConfig {
    /// 0 = Sunday … 6 = Saturday.
    #[serde(default = "default_campaign_weekday")]
    pub weekday: u32,
    #[serde(default = "default_campaign_hour")]
    pub hour: u32,
    #[serde(default)]
    pub minute: u32,
    #[serde(default)]
    pub enabled: bool,
}

fn default_campaign_weekday() -> u32 {
    1
}

fn default_campaign_hour() -> u32 {
    9
}

impl Default for WeeklyCampaignConfig {
    fn default() -> Self {
        Self {
            weekday: default_campaign_weekday(),
            hour: default_campaign_hour(),
            minute: 0,
            enabled: false,
        }
    }
}

/// One question/answer pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub question: String,
    pub answer: String,
}

/// A completed questionnaire. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmittedReport {
    pub timestamp: DateTime<Utc>,
    #[serde(alias = "from")]
    pub respondent: String,
    #[serde(default)]
    pub answers: Vec<Answer>,
}

/// Questionnaire progress for one private chat.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InProgressSurvey {
    #[serde(default)]
    pub step: usize,
    #[serde(default)]
    pub answers: Vec<Answer>,
}
