//! API route handlers for the gateway.
//!
//! Every write goes persist → trigger → respond: the change is saved through
//! the shared writer, one coordinator cycle runs, and only then does the
//! caller get an answer (including the cycle outcome).

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use driverbot_core::error::DriverBotError;
use driverbot_core::normalize;
use driverbot_core::{
    Destination, DestinationRole, Document, ScheduledItem, WeeklyCampaignConfig,
};
use serde_json::{Map, Value, json};

use super::server::AppState;

type Reply = (StatusCode, Json<Value>);

fn error(status: StatusCode, message: impl std::fmt::Display) -> Reply {
    (status, Json(json!({"ok": false, "error": message.to_string()})))
}

/// Health check endpoint.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "driverbot",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.start_time.elapsed().as_secs(),
        "cycle_running": state.driver.coordinator().is_running(),
    }))
}

/// Current document, read fresh from the store. Falls back to the last
/// published snapshot when the store is unreachable.
pub async fn get_state(State(state): State<Arc<AppState>>) -> Reply {
    let coordinator = state.driver.coordinator();
    let snapshot = coordinator.snapshot().current();
    match coordinator.store().load().await {
        Ok(doc) => (
            StatusCode::OK,
            Json(json!({"ok": true, "stale": false, "version": snapshot.version, "state": doc})),
        ),
        Err(e) => {
            tracing::warn!("⚠️ State read fell back to snapshot: {e}");
            (
                StatusCode::OK,
                Json(json!({"ok": true, "stale": true, "version": snapshot.version, "state": snapshot.doc.as_ref()})),
            )
        }
    }
}

/// Merge a partial or full document. Top-level keys in the body replace
/// the stored ones; everything else is kept.
pub async fn update_state(State(state): State<Arc<AppState>>, Json(body): Json<Value>) -> Reply {
    let Value::Object(patch) = body else {
        return error(StatusCode::BAD_REQUEST, "Body must be a JSON object");
    };
    persist_then_trigger(&state, move |doc| {
        merge_patch(doc, patch);
        Some(())
    })
    .await
}

/// Queue an immediate broadcast.
pub async fn queue_broadcast(State(state): State<Arc<AppState>>, Json(body): Json<Value>) -> Reply {
    let message = body["message"].as_str().unwrap_or("").trim().to_string();
    if message.is_empty() {
        return error(StatusCode::BAD_REQUEST, "Missing 'message'");
    }
    persist_then_trigger(&state, move |doc| {
        doc.immediate_queue = Some(message);
        Some(())
    })
    .await
}

/// Append a one-off announcement.
pub async fn add_scheduled(State(state): State<Arc<AppState>>, Json(body): Json<Value>) -> Reply {
    let item: ScheduledItem = match serde_json::from_value(body) {
        Ok(item) => item,
        Err(e) => return error(StatusCode::BAD_REQUEST, format!("Invalid scheduled item: {e}")),
    };
    if item.text.trim().is_empty() {
        return error(StatusCode::BAD_REQUEST, "Missing 'text'");
    }
    persist_then_trigger(&state, move |doc| {
        doc.scheduled_queue.push(item);
        Some(())
    })
    .await
}

/// Replace the weekly campaign settings.
pub async fn set_weekly(State(state): State<Arc<AppState>>, Json(body): Json<Value>) -> Reply {
    let weekly: WeeklyCampaignConfig = match serde_json::from_value(body) {
        Ok(w) => w,
        Err(e) => return error(StatusCode::BAD_REQUEST, format!("Invalid weekly schedule: {e}")),
    };
    if weekly.weekday > 6 || weekly.hour > 23 || weekly.minute > 59 {
        return error(StatusCode::BAD_REQUEST, "weekday 0-6, hour 0-23, minute 0-59");
    }
    persist_then_trigger(&state, move |doc| {
        doc.weekly_schedule = weekly;
        Some(())
    })
    .await
}

/// Enable/disable, rename or re-role one destination.
pub async fn update_group(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(body): Json<Value>,
) -> Reply {
    let role = match body.get("role") {
        None | Some(Value::Null) => None,
        Some(v) => match v.as_str() {
            Some("driver") => Some(DestinationRole::Driver),
            Some("admin") => Some(DestinationRole::Admin),
            _ => return error(StatusCode::BAD_REQUEST, "role must be 'driver' or 'admin'"),
        },
    };
    let enabled = body["enabled"].as_bool();
    let name = body["name"].as_str().map(String::from);

    let writer = state.driver.coordinator().writer();
    let result = writer
        .update(|doc| {
            let group = doc.group_mut(id)?;
            apply_group_patch(group, enabled, role, name);
            Some(())
        })
        .await;
    match result {
        Ok((_, Some(()))) => respond_after_trigger(&state).await,
        Ok((_, None)) => error(StatusCode::NOT_FOUND, format!("Group {id} not registered")),
        Err(e) => persist_failed(e),
    }
}

/// Run one coordinator cycle now.
pub async fn manual_tick(State(state): State<Arc<AppState>>) -> Reply {
    let outcome = state.driver.trigger().await;
    (StatusCode::OK, Json(json!({"ok": true, "cycle": outcome})))
}

/// Recent broadcasts.
pub async fn list_deliveries(State(state): State<Arc<AppState>>) -> Json<Value> {
    let deliveries = state.driver.coordinator().deliveries();
    Json(json!({"ok": true, "total": deliveries.len(), "deliveries": deliveries}))
}

async fn persist_then_trigger<F>(state: &AppState, edit: F) -> Reply
where
    F: FnOnce(&mut Document) -> Option<()>,
{
    match state.driver.coordinator().writer().update(edit).await {
        Ok(_) => respond_after_trigger(state).await,
        Err(e) => persist_failed(e),
    }
}

async fn respond_after_trigger(state: &AppState) -> Reply {
    let outcome = state.driver.trigger().await;
    let version = state.driver.coordinator().snapshot().current().version;
    (
        StatusCode::OK,
        Json(json!({"ok": true, "version": version, "cycle": outcome})),
    )
}

fn persist_failed(e: DriverBotError) -> Reply {
    tracing::error!("❌ Admin write not persisted: {e}");
    error(StatusCode::BAD_GATEWAY, e)
}

/// Replace top-level keys of `doc` with those in `patch`, then normalize.
/// The weekly watermark never moves back: a panel posting an older copy of
/// the document keeps the stored date.
fn merge_patch(doc: &mut Document, mut patch: Map<String, Value>) {
    // Older admin panels still send the first release's queue key.
    if !patch.contains_key("immediate_queue")
        && let Some(legacy) = patch.remove("broadcast_queue")
    {
        patch.insert("immediate_queue".into(), legacy);
    }

    let mut merged = match serde_json::to_value(&*doc) {
        Ok(Value::Object(obj)) => obj,
        _ => Map::new(),
    };
    let stored_watermark = std::mem::take(&mut doc.last_weekly_run);
    merged.extend(patch);
    *doc = normalize::from_value(Value::Object(merged));
    // `YYYY-MM-DD` compares correctly as a string.
    if stored_watermark > doc.last_weekly_run {
        doc.last_weekly_run = stored_watermark;
    }
}

fn apply_group_patch(
    group: &mut Destination,
    enabled: Option<bool>,
    role: Option<DestinationRole>,
    name: Option<String>,
) {
    if let Some(enabled) = enabled {
        group.enabled = enabled;
    }
    if let Some(role) = role {
        group.role = role;
    }
    if let Some(name) = name {
        group.name = name;
    }
}
