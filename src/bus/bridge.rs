//! Change-feed bridge for the durable event table.
//!
//! Rows inserted into `events` (by this or any other process) are rebuilt
//! into [`Event`]s and dispatched straight to listeners. They skip history,
//! the queue and the sink, so a process that both emits to the sink and
//! bridges the same filter sees its own events twice.

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::event::{Event, EventMetadata};
use crate::interfaces::ChangePayload;
use crate::utils::id::generate_id;

/// Channel key used for the bridge.
pub const EVENTS_CHANNEL: &str = "events";
/// Table the durable sink writes to.
pub const EVENTS_TABLE: &str = "events";

/// Rebuild an event from an inserted `events` row.
///
/// Returns None when the row has no usable `event_type`. Other missing or
/// malformed columns fall back to defaults.
pub fn event_from_change(payload: &ChangePayload) -> Option<Event> {
    let row = payload.row()?;
    let event_type = row.get("event_type")?.as_str()?.trim();
    if event_type.is_empty() {
        return None;
    }

    let id = match row.get("id") {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => generate_id("event"),
    };
    let timestamp = row
        .get("created_at")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);
    let metadata = row
        .get("metadata")
        .filter(|m| !m.is_null())
        .and_then(|m| serde_json::from_value::<EventMetadata>(m.clone()).ok());

    Some(Event {
        id,
        event_type: event_type.to_string(),
        data: row.get("event_data").cloned().unwrap_or(Value::Null),
        timestamp,
        user_id: string_column(row, "user_id"),
        org_id: string_column(row, "org_id"),
        metadata,
    })
}

fn string_column(row: &Value, column: &str) -> Option<String> {
    row.get(column).and_then(Value::as_str).map(str::to_string)
}
