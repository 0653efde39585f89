//! SQLite sink integration tests.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use signalbus::bus::{BusConfig, Event, EventBus, EventMetadata, Priority};
use signalbus::sink::{init_sink, SinkConfig, SinkType, SqliteEventSink};
use sqlx::Row;

async fn memory_pool() -> sqlx::SqlitePool {
    sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap()
}

async fn row_count(pool: &sqlx::SqlitePool) -> i64 {
    sqlx::query("SELECT COUNT(*) AS n FROM events")
        .fetch_one(pool)
        .await
        .unwrap()
        .get("n")
}

#[tokio::test]
async fn test_emitted_events_land_in_events_table() {
    let pool = memory_pool().await;
    let sink = SqliteEventSink::new(pool.clone());
    sink.init().await.unwrap();
    let bus = EventBus::new(BusConfig::default(), Arc::new(sink));

    bus.emit(
        Event::new("assessment_completed", json!({"score": 91}))
            .with_user("u1")
            .with_org("o1")
            .with_metadata(EventMetadata::new().with_priority(Priority::High)),
    )
    .unwrap();
    bus.emit_simple("report_generated", json!({}), None, None)
        .unwrap();
    bus.wait_idle().await;

    for _ in 0..100 {
        if row_count(&pool).await == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(row_count(&pool).await, 2);

    let row = sqlx::query(
        "SELECT event_type, user_id, org_id, metadata FROM events WHERE event_type = 'assessment_completed'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(row.get::<Option<String>, _>("user_id").as_deref(), Some("u1"));
    assert_eq!(row.get::<Option<String>, _>("org_id").as_deref(), Some("o1"));
    let metadata: serde_json::Value =
        serde_json::from_str(&row.get::<String, _>("metadata")).unwrap();
    assert_eq!(metadata, json!({"priority": "high"}));
}

#[tokio::test]
async fn test_init_sink_sqlite_from_config() {
    let config = SinkConfig {
        sink_type: SinkType::Sqlite,
        url: Some("sqlite::memory:".to_string()),
    };
    let sink = init_sink(&config).await.unwrap();
    let bus = EventBus::new(BusConfig::default(), sink);

    bus.emit_simple("x", json!({}), None, None).unwrap();
    bus.wait_idle().await;

    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(5)).await;
        if bus.sink_failures() > 0 {
            break;
        }
    }
    assert_eq!(bus.sink_failures(), 0);
}
