//! SQL event sinks.
//!
//! Both backends write one row per emitted event into the `events` table,
//! which is also the table the change-feed bridge listens on.

use async_trait::async_trait;
#[cfg(feature = "sqlite")]
use sea_query::SqliteQueryBuilder;
use sea_query::{ColumnDef, Iden, Index, InsertStatement, Query, Table};
#[cfg(feature = "postgres")]
use sea_query::{Expr, PostgresQueryBuilder};
use tracing::{debug, info};

use crate::interfaces::{EventSink, SinkError, SinkRecord};

// ============================================================================
// Schema
// ============================================================================

#[derive(Iden)]
enum Events {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "event_type"]
    EventType,
    #[iden = "event_data"]
    EventData,
    #[iden = "user_id"]
    UserId,
    #[iden = "org_id"]
    OrgId,
    #[iden = "created_at"]
    CreatedAt,
    #[iden = "metadata"]
    Metadata,
}

fn insert_statement(record: &SinkRecord) -> InsertStatement {
    let metadata = record.metadata.as_ref().map(|m| m.to_string());
    Query::insert()
        .into_table(Events::Table)
        .columns([
            Events::EventType,
            Events::EventData,
            Events::UserId,
            Events::OrgId,
            Events::CreatedAt,
            Events::Metadata,
        ])
        .values_panic([
            record.event_type.clone().into(),
            record.event_data.to_string().into(),
            record.user_id.clone().into(),
            record.org_id.clone().into(),
            record.created_at.to_rfc3339().into(),
            metadata.into(),
        ])
        .to_owned()
}

// ============================================================================
// PostgreSQL Implementation
// ============================================================================

/// Event sink backed by PostgreSQL.
#[cfg(feature = "postgres")]
pub struct PostgresEventSink {
    pool: sqlx::PgPool,
}

#[cfg(feature = "postgres")]
impl PostgresEventSink {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }

    /// Create the `events` table if it does not exist.
    pub async fn init(&self) -> std::result::Result<(), sqlx::Error> {
        let create_table = Table::create()
            .table(Events::Table)
            .if_not_exists()
            .col(
                ColumnDef::new(Events::Id)
                    .big_integer()
                    .not_null()
                    .auto_increment()
                    .primary_key(),
            )
            .col(ColumnDef::new(Events::EventType).text().not_null())
            .col(ColumnDef::new(Events::EventData).json_binary().not_null())
            .col(ColumnDef::new(Events::UserId).text())
            .col(ColumnDef::new(Events::OrgId).text())
            .col(
                ColumnDef::new(Events::CreatedAt)
                    .timestamp_with_time_zone()
                    .not_null()
                    .default(Expr::current_timestamp()),
            )
            .col(ColumnDef::new(Events::Metadata).json_binary())
            .to_string(PostgresQueryBuilder);

        sqlx::query(&create_table).execute(&self.pool).await?;

        let create_index = Index::create()
            .if_not_exists()
            .name("idx_events_type_created_at")
            .table(Events::Table)
            .col(Events::EventType)
            .col(Events::CreatedAt)
            .to_string(PostgresQueryBuilder);

        sqlx::query(&create_index).execute(&self.pool).await?;

        info!("Events table initialized (PostgreSQL)");
        Ok(())
    }
}

#[cfg(feature = "postgres")]
#[async_trait]
impl EventSink for PostgresEventSink {
    async fn insert(&self, record: &SinkRecord) -> Result<(), SinkError> {
        let insert = insert_statement(record).to_string(PostgresQueryBuilder);
        sqlx::query(&insert).execute(&self.pool).await?;
        debug!(event_type = %record.event_type, "Event row written");
        Ok(())
    }
}

// ============================================================================
// SQLite Implementation
// ============================================================================

/// Event sink backed by SQLite.
#[cfg(feature = "sqlite")]
pub struct SqliteEventSink {
    pool: sqlx::SqlitePool,
}

#[cfg(feature = "sqlite")]
impl SqliteEventSink {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the `events` table if it does not exist.
    pub async fn init(&self) -> std::result::Result<(), sqlx::Error> {
        let create_table = Table::create()
            .table(Events::Table)
            .if_not_exists()
            .col(
                ColumnDef::new(Events::Id)
                    .integer()
                    .not_null()
                    .auto_increment()
                    .primary_key(),
            )
            .col(ColumnDef::new(Events::EventType).text().not_null())
            .col(ColumnDef::new(Events::EventData).text().not_null())
            .col(ColumnDef::new(Events::UserId).text())
            .col(ColumnDef::new(Events::OrgId).text())
            .col(ColumnDef::new(Events::CreatedAt).text().not_null())
            .col(ColumnDef::new(Events::Metadata).text())
            .to_string(SqliteQueryBuilder);

        sqlx::query(&create_table).execute(&self.pool).await?;

        let create_index = Index::create()
            .if_not_exists()
            .name("idx_events_type_created_at")
            .table(Events::Table)
            .col(Events::EventType)
            .col(Events::CreatedAt)
            .to_string(SqliteQueryBuilder);

        sqlx::query(&create_index).execute(&self.pool).await?;

        info!("Events table initialized (SQLite)");
        Ok(())
    }
}

#[cfg(feature = "sqlite")]
#[async_trait]
impl EventSink for SqliteEventSink {
    async fn insert(&self, record: &SinkRecord) -> Result<(), SinkError> {
        let insert = insert_statement(record).to_string(SqliteQueryBuilder);
        sqlx::query(&insert).execute(&self.pool).await?;
        debug!(event_type = %record.event_type, "Event row written");
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
