//! Realtime manager interface step definitions.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use cucumber::{given, then, when, World};
use serde_json::json;
use signalbus::bus::ListenerError;
use signalbus::interfaces::{BroadcastMessage, ChangePayload, TransportError};
use signalbus::realtime::{
    realtime_listener, MemoryTransport, RealtimeEvent, RealtimeManager, CUSTOM_EVENT,
};

type Captured = Arc<Mutex<Vec<RealtimeEvent>>>;

/// Test context for realtime manager scenarios.
#[derive(World)]
#[world(init = Self::new)]
pub struct RealtimeWorld {
    transport: MemoryTransport,
    manager: RealtimeManager,
    captured: HashMap<String, Captured>,
    last_error: Option<TransportError>,
}

impl std::fmt::Debug for RealtimeWorld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeWorld")
            .field("open_channels", &self.transport.open_channels())
            .field("captured_types", &self.captured.keys().collect::<Vec<_>>())
            .field("last_error", &self.last_error)
            .finish()
    }
}

impl RealtimeWorld {
    fn new() -> Self {
        let transport = MemoryTransport::new();
        let manager = RealtimeManager::new(Arc::new(transport.clone()));
        Self {
            transport,
            manager,
            captured: HashMap::new(),
            last_error: None,
        }
    }

    fn captured(&self, event_type: &str) -> Vec<RealtimeEvent> {
        self.captured
            .get(event_type)
            .map(|c| c.lock().unwrap().clone())
            .unwrap_or_default()
    }

    fn last(&self, event_type: &str) -> RealtimeEvent {
        self.captured(event_type)
            .pop()
            .unwrap_or_else(|| panic!("no {} events captured", event_type))
    }
}

// --- Given steps ---

#[given("a realtime manager over an in-memory transport")]
async fn given_manager(world: &mut RealtimeWorld) {
    assert!(!world.manager.connection_status().await.connected);
}

#[given(expr = "a capturing listener on {string}")]
async fn given_capturing_listener(world: &mut RealtimeWorld, event_type: String) {
    let captured: Captured = Arc::new(Mutex::new(Vec::new()));
    let sink = captured.clone();
    world.manager.on(
        &event_type,
        realtime_listener(move |event| {
            sink.lock().unwrap().push(event.clone());
            Ok(())
        }),
    );
    world.captured.insert(event_type, captured);
}

#[given(expr = "a failing listener on {string}")]
async fn given_failing_listener(world: &mut RealtimeWorld, event_type: String) {
    world.manager.on(
        &event_type,
        realtime_listener(|_| Err(ListenerError::failed("scenario failure"))),
    );
}

#[given("the transport rejects subscriptions")]
async fn given_transport_rejects(world: &mut RealtimeWorld) {
    world.transport.fail_subscribe(true);
}

// --- When steps ---

#[when(expr = "I subscribe to the dashboard of {string}")]
async fn when_subscribe_dashboard(world: &mut RealtimeWorld, user_id: String) {
    world
        .manager
        .subscribe_to_dashboard(&user_id)
        .await
        .expect("subscribe should succeed");
}

#[when(expr = "I try to subscribe to the dashboard of {string}")]
async fn when_try_subscribe_dashboard(world: &mut RealtimeWorld, user_id: String) {
    world.last_error = world.manager.subscribe_to_dashboard(&user_id).await.err();
}

#[when(expr = "I subscribe to the team activity of {string}")]
async fn when_subscribe_team(world: &mut RealtimeWorld, org_id: String) {
    world
        .manager
        .subscribe_to_team_activity(&org_id)
        .await
        .expect("subscribe should succeed");
}

#[when(expr = "I subscribe to custom events {string} for user {string}")]
async fn when_subscribe_custom(world: &mut RealtimeWorld, event_type: String, user_id: String) {
    world
        .manager
        .subscribe_to_custom_events(&[event_type.as_str()], Some(&user_id), None)
        .await
        .expect("subscribe should succeed");
}

#[when(expr = "an insight {string} is inserted for user {string}")]
async fn when_insight_inserted(world: &mut RealtimeWorld, insight_id: String, user_id: String) {
    world.transport.publish_change(ChangePayload::insert(
        "tier2_dashboard_insights",
        json!({ "u_id": user_id, "insight_id": insight_id }),
    ));
}

#[when(expr = "member {string} joins org {string}")]
async fn when_member_joins(world: &mut RealtimeWorld, member_id: String, org_id: String) {
    world.transport.publish_change(ChangePayload::insert(
        "team_members",
        json!({ "id": member_id, "org_id": org_id }),
    ));
}

#[when(expr = "a custom {string} broadcast arrives on {string}")]
async fn when_custom_broadcast(world: &mut RealtimeWorld, event_type: String, key: String) {
    world.transport.broadcast(
        &key,
        BroadcastMessage {
            event: CUSTOM_EVENT.to_string(),
            payload: json!({ "type": event_type, "data": {} }),
        },
    );
}

#[when(expr = "I broadcast {string} on {string}")]
async fn when_broadcast(world: &mut RealtimeWorld, event_type: String, key: String) {
    world
        .manager
        .broadcast_event(&event_type, json!({}), &key)
        .await
        .expect("broadcast on a closed channel is a no-op");
}

#[when("I unsubscribe from everything")]
async fn when_unsubscribe_all(world: &mut RealtimeWorld) {
    world.manager.unsubscribe_all().await;
}

// --- Then steps ---

#[then(expr = "the transport saw {int} subscription for {string}")]
async fn then_subscription_count(world: &mut RealtimeWorld, count: usize, key: String) {
    assert_eq!(world.transport.subscription_count(&key), count);
}

#[then(expr = "the connection status lists {string}")]
async fn then_status_lists(world: &mut RealtimeWorld, key: String) {
    let status = world.manager.connection_status().await;
    assert!(status.connected);
    assert_eq!(status.channels, vec![key]);
}

#[then(expr = "{string} captured {int} event")]
#[then(expr = "{string} captured {int} events")]
async fn then_captured(world: &mut RealtimeWorld, event_type: String, count: usize) {
    assert_eq!(world.captured(&event_type).len(), count);
}

#[then(expr = "the last {string} event has record id {string}")]
async fn then_last_record_id(world: &mut RealtimeWorld, event_type: String, record_id: String) {
    match world.last(&event_type) {
        RealtimeEvent::Dashboard(update) => {
            assert_eq!(update.record_id.as_deref(), Some(record_id.as_str()))
        }
        RealtimeEvent::Record(change) => {
            assert_eq!(change.record_id.as_deref(), Some(record_id.as_str()))
        }
        other => panic!("event has no record id: {:?}", other),
    }
}

#[then(expr = "the last {string} event has activity {string}")]
async fn then_last_activity(world: &mut RealtimeWorld, event_type: String, activity: String) {
    match world.last(&event_type) {
        RealtimeEvent::Team(team) => assert_eq!(team.activity.as_deref(), Some(activity.as_str())),
        other => panic!("expected team activity, got {:?}", other),
    }
}

#[then(expr = "the transport recorded no messages on {string}")]
async fn then_no_messages(world: &mut RealtimeWorld, key: String) {
    assert!(world.transport.sent_messages(&key).is_empty());
}

#[then("the manager is disconnected")]
async fn then_disconnected(world: &mut RealtimeWorld) {
    let status = world.manager.connection_status().await;
    assert!(!status.connected);
    assert!(status.channels.is_empty());
    assert_eq!(world.transport.open_channels(), 0);
}

#[then("no local listeners remain")]
async fn then_no_listeners(world: &mut RealtimeWorld) {
    assert_eq!(world.manager.listener_count(None), 0);
}

#[then("the subscription failed")]
async fn then_subscription_failed(world: &mut RealtimeWorld) {
    assert!(matches!(
        world.last_error,
        Some(TransportError::Subscribe { .. })
    ));
}
