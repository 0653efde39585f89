//! Event value type.
//!
//! An [`Event`] is immutable once handed to the bus: history, the dispatch
//! queue and every listener share the same `Arc<Event>`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::BusError;
use crate::interfaces::SinkRecord;
use crate::utils::id::generate_id;

/// Event priority carried in metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

/// Optional descriptive metadata attached by producers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl EventMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }
}

/// A typed notification moving through the bus.
///
/// `user_id` and `org_id` associate the event with an actor and tenant for
/// filtering. The bus never uses them for access control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<EventMetadata>,
}

impl Event {
    /// Create an event with a generated id and the current timestamp.
    pub fn new(event_type: impl Into<String>, data: Value) -> Self {
        Self {
            id: generate_id("event"),
            event_type: event_type.into(),
            data,
            timestamp: Utc::now(),
            user_id: None,
            org_id: None,
            metadata: None,
        }
    }

    /// Replace the generated id with a caller-supplied one.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_org(mut self, org_id: impl Into<String>) -> Self {
        self.org_id = Some(org_id.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_metadata(mut self, metadata: EventMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Priority from metadata, if any.
    pub fn priority(&self) -> Option<Priority> {
        self.metadata.as_ref().and_then(|m| m.priority)
    }

    /// Tags from metadata (empty when no metadata).
    pub fn tags(&self) -> &[String] {
        self.metadata
            .as_ref()
            .map(|m| m.tags.as_slice())
            .unwrap_or(&[])
    }

    /// Reject shapes the history and dispatch layers cannot handle.
    pub fn validate(&self) -> Result<(), BusError> {
        if self.id.trim().is_empty() {
            return Err(BusError::InvalidEvent("event id must not be empty".to_string()));
        }
        if self.event_type.trim().is_empty() {
            return Err(BusError::InvalidEvent(format!(
                "event '{}' has an empty type",
                self.id
            )));
        }
        Ok(())
    }
}

impl From<&Event> for SinkRecord {
    fn from(event: &Event) -> Self {
        SinkRecord {
            event_type: event.event_type.clone(),
            event_data: event.data.clone(),
            user_id: event.user_id.clone(),
            org_id: event.org_id.clone(),
            created_at: event.timestamp,
            metadata: event
                .metadata
                .as_ref()
                .and_then(|m| serde_json::to_value(m).ok()),
        }
    }
}
