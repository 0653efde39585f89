//! Event bus integration tests.
//!
//! Exercises the public API from outside the crate: many producers, mixed
//! listeners and history queries.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::json;
use signalbus::bus::{listener_fn, BusConfig, EventBus, EventFilter, ListenerError};
use signalbus::sink::MockEventSink;

/// Concurrent producers: every event is recorded, dispatched and forwarded.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_producers() {
    let sink = Arc::new(MockEventSink::new());
    let bus = EventBus::new(BusConfig::default(), sink.clone());
    let count = Arc::new(AtomicUsize::new(0));
    let counter = count.clone();
    bus.on(
        "order_placed",
        listener_fn(move |_| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }),
        0,
    );

    let producers: Vec<_> = (0..8)
        .map(|producer| {
            let bus = bus.clone();
            tokio::spawn(async move {
                for n in 0..25 {
                    bus.emit_simple(
                        "order_placed",
                        json!({ "producer": producer, "n": n }),
                        Some(&format!("user-{}", producer)),
                        None,
                    )
                    .unwrap();
                }
            })
        })
        .collect();
    for producer in producers {
        producer.await.unwrap();
    }
    bus.wait_idle().await;

    assert_eq!(count.load(Ordering::SeqCst), 200);
    assert_eq!(bus.stats().total_events, 200);
    assert_eq!(
        bus.event_history(&EventFilter::new().user("user-3")).len(),
        25
    );

    for _ in 0..100 {
        if sink.inserted_count().await == 200 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    assert_eq!(sink.inserted_count().await, 200);
}

/// Per-producer emission order survives concurrent emission.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_per_producer_order_preserved() {
    let bus = EventBus::new(BusConfig::default(), Arc::new(MockEventSink::new()));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorder = seen.clone();
    bus.on(
        "tick",
        listener_fn(move |event| {
            recorder.lock().unwrap().push(event.data.clone());
            async { Ok(()) }
        }),
        0,
    );

    let producers: Vec<_> = (0..4)
        .map(|producer| {
            let bus = bus.clone();
            tokio::spawn(async move {
                for n in 0..50 {
                    bus.emit_simple("tick", json!({ "p": producer, "n": n }), None, None)
                        .unwrap();
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();
    for producer in producers {
        producer.await.unwrap();
    }
    bus.wait_idle().await;

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 200);
    for producer in 0..4 {
        let ns: Vec<u64> = seen
            .iter()
            .filter(|d| d["p"] == json!(producer))
            .map(|d| d["n"].as_u64().unwrap())
            .collect();
        assert_eq!(ns, (0..50).collect::<Vec<u64>>());
    }
}

/// A failing listener on one type never disturbs listeners on another.
#[tokio::test]
async fn test_failures_stay_local() {
    let bus = EventBus::new(BusConfig::default(), Arc::new(MockEventSink::new()));
    let healthy = Arc::new(AtomicUsize::new(0));
    let counter = healthy.clone();

    bus.on(
        "broken",
        listener_fn(|_| async { Err(ListenerError::failed("always")) }),
        0,
    );
    bus.on(
        "healthy",
        listener_fn(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        }),
        0,
    );

    for _ in 0..3 {
        bus.emit_simple("broken", json!({}), None, None).unwrap();
        bus.emit_simple("healthy", json!({}), None, None).unwrap();
    }
    bus.wait_idle().await;

    assert_eq!(healthy.load(Ordering::SeqCst), 3);
}
