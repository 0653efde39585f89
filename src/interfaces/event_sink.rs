//! Durable event sink interface.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Result type for sink operations.
pub type Result<T> = std::result::Result<T, SinkError>;

/// Errors that can occur while forwarding an event to durable storage.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Sink unavailable: {0}")]
    Unavailable(String),
}

#[cfg(any(feature = "sqlite", feature = "postgres"))]
impl From<sqlx::Error> for SinkError {
    fn from(e: sqlx::Error) -> Self {
        SinkError::Database(e.to_string())
    }
}

/// Row written to the durable event store for every emitted event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SinkRecord {
    pub event_type: String,
    pub event_data: Value,
    pub user_id: Option<String>,
    pub org_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub metadata: Option<Value>,
}

/// Durable storage for emitted events.
///
/// The event bus forwards every accepted event here on a detached task.
/// Failures are logged by the caller and never retried.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Insert one event row.
    async fn insert(&self, record: &SinkRecord) -> Result<()>;
}
