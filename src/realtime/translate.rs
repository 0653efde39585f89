//! Translation of change-feed payloads into realtime events.
//!
//! Every watched table has a [`Route`] naming the event type it is emitted
//! under and how its rows are read. Translation never fails: missing or
//! malformed columns become `None`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::interfaces::{ChangeKind, ChangePayload};

/// Broadcast event name used by custom-event channels.
pub const CUSTOM_EVENT: &str = "custom_event";

/// Change to a dashboard insight row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardUpdate {
    pub user_id: Option<String>,
    pub table: String,
    pub action: ChangeKind,
    pub record_id: Option<String>,
    pub data: Option<Value>,
}

/// Change to a user-owned record (assessments, AI, growth studio).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordChange {
    pub user_id: Option<String>,
    pub table: String,
    pub action: ChangeKind,
    pub record_id: Option<String>,
    pub data: Option<Value>,
}

/// Activity inside an organization.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamActivity {
    pub org_id: Option<String>,
    pub member_id: Option<String>,
    pub activity: Option<String>,
    pub data: Option<Value>,
    pub timestamp: DateTime<Utc>,
}

/// Translated notification handed to realtime listeners.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum RealtimeEvent {
    Dashboard(DashboardUpdate),
    Record(RecordChange),
    Team(TeamActivity),
    Custom(Value),
}

impl RealtimeEvent {
    /// Payload as JSON, without the variant tag.
    pub fn to_value(&self) -> Value {
        let value = match self {
            RealtimeEvent::Dashboard(update) => serde_json::to_value(update),
            RealtimeEvent::Record(change) => serde_json::to_value(change),
            RealtimeEvent::Team(activity) => serde_json::to_value(activity),
            RealtimeEvent::Custom(payload) => return payload.clone(),
        };
        value.unwrap_or(Value::Null)
    }

    /// User the event concerns, if known.
    pub fn user_id(&self) -> Option<&str> {
        match self {
            RealtimeEvent::Dashboard(update) => update.user_id.as_deref(),
            RealtimeEvent::Record(change) => change.user_id.as_deref(),
            RealtimeEvent::Team(_) => None,
            RealtimeEvent::Custom(payload) => payload.get("userId").and_then(Value::as_str),
        }
    }

    /// Organization the event concerns, if known.
    pub fn org_id(&self) -> Option<&str> {
        match self {
            RealtimeEvent::Team(activity) => activity.org_id.as_deref(),
            RealtimeEvent::Custom(payload) => payload.get("orgId").and_then(Value::as_str),
            _ => None,
        }
    }
}

/// How rows of one table are read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Translator {
    Dashboard,
    Record,
    Delegation,
    Member,
    Activity,
}

/// One watched table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub table: &'static str,
    /// Column the subscription target is matched against.
    pub filter_column: &'static str,
    /// Event type the translated payload is emitted under.
    pub event_type: &'static str,
    pub translator: Translator,
}

const fn route(
    table: &'static str,
    filter_column: &'static str,
    event_type: &'static str,
    translator: Translator,
) -> Route {
    Route {
        table,
        filter_column,
        event_type,
        translator,
    }
}

pub const DASHBOARD_ROUTES: &[Route] = &[
    route("tier2_dashboard_insights", "u_id", "dashboard_update", Translator::Dashboard),
    route("assessments", "user_id", "assessment_update", Translator::Record),
    route("assessment_responses", "user_id", "assessment_response_update", Translator::Record),
];

pub const TEAM_ROUTES: &[Route] = &[
    route("assessment_delegations", "org_id", "team_update", Translator::Delegation),
    route("team_members", "org_id", "team_member_update", Translator::Member),
    route("team_activities", "org_id", "team_activity_update", Translator::Activity),
];

pub const AI_ROUTES: &[Route] = &[
    route("ai_logs", "user_id", "ai_log_update", Translator::Record),
    route("ai_tasks", "user_id", "ai_task_update", Translator::Record),
];

pub const GROWTH_ROUTES: &[Route] = &[
    route("growth_simulations", "user_id", "growth_simulation_update", Translator::Record),
    route("growth_levers", "user_id", "growth_lever_update", Translator::Record),
];

/// Translate a change payload according to `route`.
pub fn translate(route: &Route, payload: &ChangePayload) -> RealtimeEvent {
    let data = payload.row().cloned();
    match route.translator {
        Translator::Dashboard => RealtimeEvent::Dashboard(DashboardUpdate {
            user_id: identifier(payload, "u_id"),
            table: payload.table.clone(),
            action: payload.event_type,
            record_id: identifier(payload, "insight_id"),
            data,
        }),
        Translator::Record => RealtimeEvent::Record(RecordChange {
            user_id: identifier(payload, "user_id"),
            table: payload.table.clone(),
            action: payload.event_type,
            record_id: identifier(payload, "id"),
            data,
        }),
        Translator::Delegation => team(
            payload,
            identifier(payload, "member_id"),
            Some(format!("delegation_{}", payload.event_type.as_lower())),
            data,
        ),
        Translator::Member => team(
            payload,
            identifier(payload, "id"),
            Some(format!("member_{}", payload.event_type.as_lower())),
            data,
        ),
        Translator::Activity => team(
            payload,
            identifier(payload, "member_id"),
            identifier(payload, "activity_type"),
            data,
        ),
    }
}

fn team(
    payload: &ChangePayload,
    member_id: Option<String>,
    activity: Option<String>,
    data: Option<Value>,
) -> RealtimeEvent {
    RealtimeEvent::Team(TeamActivity {
        org_id: identifier(payload, "org_id"),
        member_id,
        activity,
        data,
        timestamp: Utc::now(),
    })
}

/// String or numeric column value; anything else is `None`.
fn identifier(payload: &ChangePayload, column: &str) -> Option<String> {
    match payload.field(column)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
