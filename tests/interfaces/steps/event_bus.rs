//! Event bus interface step definitions.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use cucumber::{given, then, when, World};
use serde_json::json;
use signalbus::bus::{
    listener_fn, BusConfig, BusError, Event, EventBus, EventFilter, ListenerError,
};
use signalbus::sink::MockEventSink;

type Received = Arc<Mutex<Vec<Arc<Event>>>>;

/// Test context for event bus scenarios.
#[derive(World)]
#[world(init = Self::new)]
pub struct EventBusWorld {
    bus: Arc<EventBus>,
    received: HashMap<String, Received>,
    started: Arc<Mutex<Vec<i32>>>,
}

impl std::fmt::Debug for EventBusWorld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBusWorld")
            .field("stats", &self.bus.stats())
            .field("recorded_types", &self.received.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl EventBusWorld {
    fn new() -> Self {
        Self {
            bus: EventBus::new(BusConfig::default(), Arc::new(MockEventSink::new())),
            received: HashMap::new(),
            started: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn received(&self, event_type: &str) -> Vec<Arc<Event>> {
        self.received
            .get(event_type)
            .map(|r| r.lock().unwrap().clone())
            .unwrap_or_default()
    }

    async fn emit(&self, event: Event) {
        self.bus.emit(event).expect("emit should succeed");
        self.bus.wait_idle().await;
    }
}

// --- Given steps ---

#[given("an event bus")]
async fn given_event_bus(world: &mut EventBusWorld) {
    assert!(!world.bus.is_destroyed());
}

#[given(expr = "a recording listener on {string}")]
async fn given_recording_listener(world: &mut EventBusWorld, event_type: String) {
    let received: Received = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();
    world.bus.on(
        &event_type,
        listener_fn(move |event| {
            sink.lock().unwrap().push(event);
            async { Ok(()) }
        }),
        0,
    );
    world.received.insert(event_type, received);
}

#[given(expr = "a failing listener on {string}")]
async fn given_failing_listener(world: &mut EventBusWorld, event_type: String) {
    world.bus.on(
        &event_type,
        listener_fn(|_| async { Err(ListenerError::failed("scenario failure")) }),
        100,
    );
}

#[given(expr = "a once listener on {string}")]
async fn given_once_listener(world: &mut EventBusWorld, event_type: String) {
    let received: Received = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();
    world.bus.once(
        &event_type,
        listener_fn(move |event| {
            sink.lock().unwrap().push(event);
            async { Ok(()) }
        }),
        0,
    );
    world.received.insert(event_type, received);
}

#[given(expr = "listeners on {string} with priorities {int}, {int} and {int}")]
async fn given_prioritized_listeners(
    world: &mut EventBusWorld,
    event_type: String,
    first: i32,
    second: i32,
    third: i32,
) {
    for priority in [first, second, third] {
        let started = world.started.clone();
        world.bus.on(
            &event_type,
            listener_fn(move |_| {
                started.lock().unwrap().push(priority);
                async { Ok(()) }
            }),
            priority,
        );
    }
}

// --- When steps ---

#[when(expr = "I emit {string} with message {string} for user {string} in org {string}")]
async fn when_emit_message(
    world: &mut EventBusWorld,
    event_type: String,
    message: String,
    user: String,
    org: String,
) {
    world
        .emit(
            Event::new(event_type, json!({ "message": message }))
                .with_user(user)
                .with_org(org),
        )
        .await;
}

#[when(expr = "I emit {string}")]
async fn when_emit(world: &mut EventBusWorld, event_type: String) {
    world.emit(Event::new(event_type, json!({}))).await;
}

#[when(expr = "I emit {string} {int} times")]
async fn when_emit_times(world: &mut EventBusWorld, event_type: String, times: u32) {
    for n in 0..times {
        world
            .bus
            .emit(Event::new(event_type.clone(), json!({ "n": n })))
            .expect("emit should succeed");
    }
    world.bus.wait_idle().await;
}

#[when(expr = "I emit {string} for user {string}")]
async fn when_emit_for_user(world: &mut EventBusWorld, event_type: String, user: String) {
    world
        .emit(Event::new(event_type, json!({})).with_user(user))
        .await;
}

#[when("the bus is destroyed")]
async fn when_destroyed(world: &mut EventBusWorld) {
    world.bus.destroy();
}

// --- Then steps ---

#[then(expr = "the listener on {string} received {int} event")]
#[then(expr = "the listener on {string} received {int} events")]
async fn then_listener_received(world: &mut EventBusWorld, event_type: String, count: usize) {
    assert_eq!(world.received(&event_type).len(), count);
}

#[then(expr = "the last event on {string} has message {string}")]
async fn then_last_message(world: &mut EventBusWorld, event_type: String, message: String) {
    let received = world.received(&event_type);
    let last = received.last().expect("no events received");
    assert_eq!(last.data["message"], json!(message));
}

#[then(expr = "the history for {string} contains {int} event")]
#[then(expr = "the history for {string} contains {int} events")]
async fn then_history_for_type(world: &mut EventBusWorld, event_type: String, count: usize) {
    let history = world
        .bus
        .event_history(&EventFilter::new().event_type(event_type.clone()));
    assert_eq!(history.len(), count);
    assert!(history.iter().all(|e| e.event_type == event_type));
}

#[then(expr = "the history for {string} and user {string} contains {int} event")]
async fn then_history_for_type_and_user(
    world: &mut EventBusWorld,
    event_type: String,
    user: String,
    count: usize,
) {
    let history = world
        .bus
        .event_history(&EventFilter::new().event_type(event_type).user(user));
    assert_eq!(history.len(), count);
}

#[then(expr = "the history contains {int} events")]
async fn then_history_len(world: &mut EventBusWorld, count: usize) {
    assert_eq!(world.bus.event_history(&EventFilter::new()).len(), count);
}

#[then(expr = "the oldest event in history is number {int}")]
async fn then_oldest_event(world: &mut EventBusWorld, number: u64) {
    let history = world.bus.event_history(&EventFilter::new());
    let oldest = history.first().expect("history is empty");
    assert_eq!(oldest.data["n"].as_u64(), Some(number));
}

#[then(expr = "listeners started in priority order {int}, {int}, {int}")]
async fn then_priority_order(world: &mut EventBusWorld, first: i32, second: i32, third: i32) {
    assert_eq!(*world.started.lock().unwrap(), vec![first, second, third]);
}

#[then(expr = "stats report {int} events, {int} listeners and {int} event types")]
async fn then_stats(world: &mut EventBusWorld, events: usize, listeners: usize, types: usize) {
    let stats = world.bus.stats();
    assert_eq!(stats.total_events, events);
    assert_eq!(stats.total_listeners, listeners);
    assert_eq!(stats.event_types.len(), types);
}

#[then(expr = "{string} has no registered listeners")]
async fn then_no_listeners(world: &mut EventBusWorld, event_type: String) {
    assert!(world.bus.listeners(Some(&event_type)).is_empty());
}

#[then(expr = "emitting {string} fails with {string}")]
async fn then_emit_fails(world: &mut EventBusWorld, event_type: String, kind: String) {
    let result = world.bus.emit(Event::new(event_type, json!({})));
    match kind.as_str() {
        "destroyed" => assert!(matches!(result, Err(BusError::Destroyed))),
        "invalid" => assert!(matches!(result, Err(BusError::InvalidEvent(_)))),
        other => panic!("unknown failure kind {}", other),
    }
}
