//! Change-feed transport interface.
//!
//! A transport hands out named channels. Each channel can watch row-level
//! changes on tables (optionally filtered) and carry topic-scoped broadcast
//! messages. Nothing is delivered until `subscribe` succeeds.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Errors surfaced by the change-feed transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("Subscribe failed on channel '{channel}': {message}")]
    Subscribe { channel: String, message: String },

    #[error("Send failed on channel '{channel}': {message}")]
    Send { channel: String, message: String },

    #[error("Channel '{0}' is closed")]
    Closed(String),
}

/// Database operation that produced a change notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    /// Wire name (`INSERT`, `UPDATE`, `DELETE`).
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Insert => "INSERT",
            ChangeKind::Update => "UPDATE",
            ChangeKind::Delete => "DELETE",
        }
    }

    /// Lowercase name used when composing activity labels.
    pub fn as_lower(&self) -> &'static str {
        match self {
            ChangeKind::Insert => "insert",
            ChangeKind::Update => "update",
            ChangeKind::Delete => "delete",
        }
    }
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which operations a change subscription wants (`*` means all).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChangeEventFilter {
    #[default]
    All,
    Insert,
    Update,
    Delete,
}

impl ChangeEventFilter {
    /// Check whether a change of the given kind passes this filter.
    pub fn matches(&self, kind: ChangeKind) -> bool {
        match self {
            ChangeEventFilter::All => true,
            ChangeEventFilter::Insert => kind == ChangeKind::Insert,
            ChangeEventFilter::Update => kind == ChangeKind::Update,
            ChangeEventFilter::Delete => kind == ChangeKind::Delete,
        }
    }

    /// Wire name (`*`, `INSERT`, `UPDATE`, `DELETE`).
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeEventFilter::All => "*",
            ChangeEventFilter::Insert => "INSERT",
            ChangeEventFilter::Update => "UPDATE",
            ChangeEventFilter::Delete => "DELETE",
        }
    }
}

/// Description of one watched resource on a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeSpec {
    pub event: ChangeEventFilter,
    pub schema: String,
    pub table: String,
    /// Row filter in `column=eq.value` form.
    pub filter: Option<String>,
}

impl ChangeSpec {
    /// Watch every operation on `table` in the public schema.
    pub fn all(table: impl Into<String>) -> Self {
        Self {
            event: ChangeEventFilter::All,
            schema: "public".to_string(),
            table: table.into(),
            filter: None,
        }
    }

    /// Watch inserts only on `table` in the public schema.
    pub fn inserts(table: impl Into<String>) -> Self {
        Self {
            event: ChangeEventFilter::Insert,
            ..Self::all(table)
        }
    }

    /// Restrict to rows where `column` equals `value`.
    pub fn with_eq_filter(mut self, column: &str, value: &str) -> Self {
        self.filter = Some(format!("{}=eq.{}", column, value));
        self
    }
}

/// Row-level change notification as delivered by the transport.
///
/// `new` carries the row after the change, `old` the row before it.
/// Deletes usually carry only `old` (or an empty `new`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangePayload {
    #[serde(default = "default_schema")]
    pub schema: String,
    pub table: String,
    #[serde(rename = "eventType")]
    pub event_type: ChangeKind,
    #[serde(default)]
    pub new: Option<Value>,
    #[serde(default)]
    pub old: Option<Value>,
}

fn default_schema() -> String {
    "public".to_string()
}

impl ChangePayload {
    pub fn insert(table: impl Into<String>, row: Value) -> Self {
        Self {
            schema: default_schema(),
            table: table.into(),
            event_type: ChangeKind::Insert,
            new: Some(row),
            old: None,
        }
    }

    pub fn update(table: impl Into<String>, new: Value, old: Value) -> Self {
        Self {
            schema: default_schema(),
            table: table.into(),
            event_type: ChangeKind::Update,
            new: Some(new),
            old: Some(old),
        }
    }

    pub fn delete(table: impl Into<String>, old: Value) -> Self {
        Self {
            schema: default_schema(),
            table: table.into(),
            event_type: ChangeKind::Delete,
            new: Some(Value::Object(Map::new())),
            old: Some(old),
        }
    }

    /// The row that best describes the change: `new` unless it is absent
    /// or empty, otherwise `old`.
    pub fn row(&self) -> Option<&Value> {
        match &self.new {
            Some(Value::Object(map)) if !map.is_empty() => self.new.as_ref(),
            Some(Value::Null) | Some(Value::Object(_)) | None => self.old.as_ref(),
            Some(_) => self.new.as_ref(),
        }
    }

    /// Look up a column, preferring `new` and falling back to `old`.
    pub fn field(&self, column: &str) -> Option<&Value> {
        [self.new.as_ref(), self.old.as_ref()]
            .into_iter()
            .flatten()
            .filter_map(|row| row.get(column))
            .find(|v| !v.is_null())
    }
}

/// Outbound or inbound broadcast message on a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastMessage {
    pub event: String,
    pub payload: Value,
}

/// Callback invoked for every matching change notification.
pub type ChangeCallback = Arc<dyn Fn(ChangePayload) + Send + Sync>;

/// Callback invoked with the payload of every matching broadcast.
pub type BroadcastCallback = Arc<dyn Fn(Value) + Send + Sync>;

/// A named channel on the change-feed transport.
///
/// Callbacks must be registered before `subscribe`.
#[async_trait]
pub trait ChannelHandle: Send + Sync {
    /// Channel key this handle was opened with.
    fn key(&self) -> &str;

    /// Watch row-level changes described by `spec`.
    fn on_change(&self, spec: ChangeSpec, callback: ChangeCallback);

    /// Receive broadcast messages whose event name equals `event`.
    fn on_broadcast(&self, event: &str, callback: BroadcastCallback);

    /// Start delivery for all registered callbacks.
    async fn subscribe(&self) -> Result<()>;

    /// Stop delivery and release the channel.
    async fn unsubscribe(&self) -> Result<()>;

    /// Send a broadcast message to other subscribers of this channel.
    async fn send(&self, message: BroadcastMessage) -> Result<()>;
}

/// Factory for channels on an external change-feed service.
pub trait ChangeFeedTransport: Send + Sync {
    /// Create a channel handle for `key`. The handle is inert until subscribed.
    fn channel(&self, key: &str) -> Arc<dyn ChannelHandle>;
}
