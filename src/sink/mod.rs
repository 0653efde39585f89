//! Durable event sink implementations.
//!
//! - `NoopSink`: discards records, for processes without storage
//! - `MockEventSink`: records inserts in memory, for tests
//! - `SqliteEventSink` / `PostgresEventSink`: write to the `events` table

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use crate::interfaces::{EventSink, SinkError, SinkRecord};

pub mod mock;
#[cfg(any(feature = "sqlite", feature = "postgres"))]
pub mod sql;

pub use mock::MockEventSink;
#[cfg(feature = "postgres")]
pub use sql::PostgresEventSink;
#[cfg(feature = "sqlite")]
pub use sql::SqliteEventSink;

/// Sink backend selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkType {
    #[default]
    None,
    Sqlite,
    Postgres,
}

/// Durable sink configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    #[serde(rename = "type")]
    pub sink_type: SinkType,
    /// Connection string for database sinks.
    pub url: Option<String>,
}

/// Sink that accepts and discards every record.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

#[async_trait]
impl EventSink for NoopSink {
    async fn insert(&self, record: &SinkRecord) -> Result<(), SinkError> {
        debug!(event_type = %record.event_type, "No sink configured, skipping event storage");
        Ok(())
    }
}

/// Build the sink selected by `config`.
///
/// Database sinks connect and create their table before returning.
pub async fn init_sink(config: &SinkConfig) -> Result<Arc<dyn EventSink>, SinkError> {
    match config.sink_type {
        SinkType::None => {
            info!("Event sink disabled");
            Ok(Arc::new(NoopSink))
        }
        #[cfg(feature = "sqlite")]
        SinkType::Sqlite => {
            let url = config.url.as_deref().unwrap_or("sqlite::memory:");
            let pool = sqlx::sqlite::SqlitePoolOptions::new()
                .max_connections(1)
                .connect(url)
                .await?;
            let sink = SqliteEventSink::new(pool);
            sink.init().await?;
            info!(url = %url, "Using SQLite event sink");
            Ok(Arc::new(sink))
        }
        #[cfg(feature = "postgres")]
        SinkType::Postgres => {
            let url = config.url.as_deref().ok_or_else(|| {
                SinkError::Unavailable("postgres sink requires sink.url".to_string())
            })?;
            let pool = sqlx::postgres::PgPoolOptions::new().connect(url).await?;
            let sink = PostgresEventSink::new(pool);
            sink.init().await?;
            info!("Using PostgreSQL event sink");
            Ok(Arc::new(sink))
        }
        #[allow(unreachable_patterns)]
        other => Err(SinkError::Unavailable(format!(
            "sink type {:?} is not compiled in",
            other
        ))),
    }
}
