//! Document normalizer: applied to every document right after it is loaded.
//!
//! 1. Missing or wrong-shaped top-level fields become their defaults. Malformed
//!    elements inside sequences are dropped one by one, never the whole list.
//! 2. `questions` keep the first occurrence of each `text`, `groups` the first
//!    occurrence of each `id`, in original order.
//!
//! A document never fails to normalize: whatever the store hands back, the rest
//! of the bot sees a well-formed [`Document`].

use std::collections::{BTreeMap, HashSet};

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::document::{Document, InProgressSurvey};

/// Keys the typed document owns. Everything else is carried in `extra`.
const KNOWN_KEYS: &[&str] = &[
    "questions",
    "groups",
    "history",
    "sessions",
    "scheduled_queue",
    "immediate_queue",
    "weekly_schedule",
    "last_weekly_run",
];

/// Queue key used by the first bot release.
const LEGACY_IMMEDIATE_KEY: &str = "broadcast_queue";

/// Build a normalized document from raw JSON.
pub fn from_value(value: Value) -> Document {
    let obj = match value {
        Value::Object(obj) => obj,
        Value::Null => Map::new(),
        other => {
            tracing::warn!("⚠️ Stored document is not an object ({}), starting empty", kind_of(&other));
            Map::new()
        }
    };

    let immediate_queue = if obj.contains_key("immediate_queue") {
        field::<Option<String>>(&obj, "immediate_queue")
    } else {
        field::<Option<String>>(&obj, LEGACY_IMMEDIATE_KEY)
    };

    let extra = obj
        .iter()
        .filter(|(k, _)| !KNOWN_KEYS.contains(&k.as_str()) && k.as_str() != LEGACY_IMMEDIATE_KEY)
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    let doc = Document {
        questions: seq(&obj, "questions"),
        groups: seq(&obj, "groups"),
        history: seq(&obj, "history"),
        sessions: sessions(&obj),
        scheduled_queue: seq(&obj, "scheduled_queue"),
        immediate_queue,
        weekly_schedule: field(&obj, "weekly_schedule"),
        last_weekly_run: field(&obj, "last_weekly_run"),
        extra,
    };
    normalize(doc)
}

/// Deduplicate and tidy an already-typed document. Idempotent.
pub fn normalize(mut doc: Document) -> Document {
    let mut seen_text = HashSet::new();
    doc.questions.retain(|q| seen_text.insert(q.text.clone()));

    let mut seen_id = HashSet::new();
    doc.groups.retain(|g| seen_id.insert(g.id));

    // An empty string in the queue means "nothing queued".
    if doc.immediate_queue.as_deref().is_some_and(|m| m.trim().is_empty()) {
        doc.immediate_queue = None;
    }

    doc
}

fn field<T: DeserializeOwned + Default>(obj: &Map<String, Value>, key: &str) -> T {
    match obj.get(key) {
        None | Some(Value::Null) => T::default(),
        Some(v) => serde_json::from_value(v.clone()).unwrap_or_else(|e| {
            tracing::warn!("⚠️ Malformed '{key}' in stored document, using default: {e}");
            T::default()
        }),
    }
}

fn seq<T: DeserializeOwned>(obj: &Map<String, Value>, key: &str) -> Vec<T> {
    match obj.get(key) {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match serde_json::from_value(item.clone()) {
                Ok(v) => Some(v),
                Err(e) => {
                    tracing::warn!("⚠️ Dropping malformed entry in '{key}': {e}");
                    None
                }
            })
            .collect(),
        Some(other) => {
            tracing::warn!("⚠️ '{key}' should be a list, got {}", kind_of(other));
            Vec::new()
        }
    }
}

fn sessions(obj: &Map<String, Value>) -> BTreeMap<String, InProgressSurvey> {
    match obj.get("sessions") {
        Some(Value::Object(map)) => map
            .iter()
            .filter_map(|(chat, v)| match serde_json::from_value(v.clone()) {
                Ok(s) => Some((chat.clone(), s)),
                Err(e) => {
                    tracing::warn!("⚠️ Dropping malformed session for chat {chat}: {e}");
                    None
                }
            })
            .collect(),
        _ => BTreeMap::new(),
    }
}

fn kind_of(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
