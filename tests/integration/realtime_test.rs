//! Realtime manager integration tests.
//!
//! Runs the manager over the in-memory transport together with an event
//! bus, the way the standalone binary wires them.

use std::sync::{Arc, Mutex};

use serde_json::json;
use signalbus::bus::{listener_fn, BusConfig, EventBus, EventFilter};
use signalbus::interfaces::{BroadcastMessage, ChangePayload};
use signalbus::realtime::{
    realtime_listener, MemoryTransport, RealtimeEvent, RealtimeManager, CUSTOM_EVENT,
};
use signalbus::sink::NoopSink;

#[tokio::test]
async fn test_translated_changes_reach_bus_listeners() {
    let transport = Arc::new(MemoryTransport::new());
    let realtime = RealtimeManager::new(transport.clone());
    let bus = EventBus::new(BusConfig::default(), Arc::new(NoopSink));
    realtime.forward_to(&bus);

    let activities = Arc::new(Mutex::new(Vec::new()));
    let recorder = activities.clone();
    bus.on(
        "team_member_update",
        listener_fn(move |event| {
            recorder.lock().unwrap().push(event.data["activity"].clone());
            async { Ok(()) }
        }),
        0,
    );

    realtime.subscribe_to_team_activity("acme").await.unwrap();
    transport.publish_change(ChangePayload::insert(
        "team_members",
        json!({"id": "m1", "org_id": "acme"}),
    ));
    transport.publish_change(ChangePayload::delete(
        "team_members",
        json!({"id": "m1", "org_id": "acme"}),
    ));
    bus.wait_idle().await;

    assert_eq!(
        *activities.lock().unwrap(),
        vec![json!("member_insert"), json!("member_delete")]
    );
    let history = bus.event_history(&EventFilter::new().event_type("team_member_update"));
    assert_eq!(history.len(), 2);
}

#[tokio::test]
async fn test_broadcast_between_managers() {
    let transport = Arc::new(MemoryTransport::new());
    let sender = RealtimeManager::new(transport.clone());
    let receiver = RealtimeManager::new(transport.clone());

    let received = Arc::new(Mutex::new(Vec::new()));
    let recorder = received.clone();
    receiver.on(
        CUSTOM_EVENT,
        realtime_listener(move |event| {
            recorder.lock().unwrap().push(event.clone());
            Ok(())
        }),
    );

    sender
        .subscribe_to_custom_events(&[], None, Some("acme"))
        .await
        .unwrap();
    receiver
        .subscribe_to_custom_events(&["goal_reached"], None, Some("acme"))
        .await
        .unwrap();

    sender
        .broadcast_event("goal_reached", json!({"goal": 3}), "custom:acme")
        .await
        .unwrap();
    sender
        .broadcast_event("heartbeat", json!({}), "custom:acme")
        .await
        .unwrap();

    let received = received.lock().unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(
        received[0],
        RealtimeEvent::Custom(json!({"type": "goal_reached", "data": {"goal": 3}}))
    );
}

#[tokio::test]
async fn test_inbound_broadcast_ignores_other_event_names() {
    let transport = Arc::new(MemoryTransport::new());
    let realtime = RealtimeManager::new(transport.clone());
    let received = Arc::new(Mutex::new(0usize));
    let counter = received.clone();
    realtime.on(
        CUSTOM_EVENT,
        realtime_listener(move |_| {
            *counter.lock().unwrap() += 1;
            Ok(())
        }),
    );
    realtime
        .subscribe_to_custom_events(&[], Some("u1"), None)
        .await
        .unwrap();

    transport.broadcast(
        "custom:u1",
        BroadcastMessage {
            event: "presence".to_string(),
            payload: json!({}),
        },
    );
    transport.broadcast(
        "custom:u1",
        BroadcastMessage {
            event: CUSTOM_EVENT.to_string(),
            payload: json!({"type": "x"}),
        },
    );

    assert_eq!(*received.lock().unwrap(), 1);
}

#[tokio::test]
async fn test_teardown_stops_delivery() {
    let transport = Arc::new(MemoryTransport::new());
    let realtime = RealtimeManager::new(transport.clone());
    let bus = EventBus::new(BusConfig::default(), Arc::new(NoopSink));
    realtime.forward_to(&bus);

    realtime.subscribe_to_dashboard("u1").await.unwrap();
    realtime.unsubscribe_all().await;

    let delivered = transport.publish_change(ChangePayload::insert(
        "assessments",
        json!({"id": "a1", "user_id": "u1"}),
    ));
    bus.wait_idle().await;

    assert_eq!(delivered, 0);
    assert_eq!(bus.stats().total_events, 0);
    assert!(!realtime.connection_status().await.connected);
}
