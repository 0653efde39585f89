//! Event bus for in-process distribution.
//!
//! This module contains:
//! - `Event`: immutable notification value
//! - `ListenerRegistry`: priority-ordered listeners per event type
//! - `HistoryBuffer`: bounded, queryable record of emitted events
//! - `EventBus`: accepts events, records history, drains a FIFO dispatch
//!   queue and forwards every event to a durable sink
//!
//! # Dispatch model
//!
//! Events are dispatched strictly in emission order by a single drain task.
//! All listeners of one event run concurrently and must all settle before
//! the next event is started. A listener that never settles therefore
//! stalls the queue; set `BusConfig::listener_timeout_ms` to bound that.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::interfaces::{ChangeFeedTransport, ChangeSpec, ChannelHandle, EventSink, TransportError};
use crate::realtime::channel::release;

pub mod bridge;
mod config;
pub mod dispatch;
pub mod event;
pub mod forward;
pub mod history;
pub mod registry;
pub mod typed;

pub use config::BusConfig;
pub use dispatch::{dispatch_to_handlers, DispatchResult};
pub use event::{Event, EventMetadata, Priority};
pub use forward::SinkForwarder;
pub use history::{EventFilter, HistoryBuffer};
pub use registry::{listener_fn, HandlerId, HandlerRecord, Listener, ListenerRegistry};
pub use typed::{typed_listener, Envelope, TypedEvent};

// ============================================================================
// Errors
// ============================================================================

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;

/// Errors returned to producers.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    #[error("Event bus has been destroyed")]
    Destroyed,

    #[error("Event bus requires a Tokio runtime")]
    NoRuntime,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised by individual listeners. Always contained by the bus.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("Listener failed: {0}")]
    Failed(String),

    #[error("Payload for '{event_type}' did not decode: {message}")]
    Decode { event_type: String, message: String },

    #[error("Listener timed out after {0:?}")]
    Timeout(Duration),

    #[error("Listener panicked: {0}")]
    Panicked(String),
}

impl ListenerError {
    pub fn failed(message: impl Into<String>) -> Self {
        ListenerError::Failed(message.into())
    }
}

// ============================================================================
// Stats
// ============================================================================

/// Snapshot of bus counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BusStats {
    /// Events currently in history.
    pub total_events: usize,
    /// Registered listeners across all types.
    pub total_listeners: usize,
    /// Event types with at least one listener, sorted.
    pub event_types: Vec<String>,
    /// History entries inside the recent window.
    pub recent_events: usize,
}

// ============================================================================
// Event Bus
// ============================================================================

struct BusState {
    registry: ListenerRegistry,
    history: HistoryBuffer,
    queue: VecDeque<Arc<Event>>,
    draining: bool,
    destroyed: bool,
}

/// In-process publish/subscribe bus.
///
/// Construct with [`EventBus::new`] and share the returned `Arc`. Call
/// [`EventBus::destroy`] on shutdown; a destroyed bus rejects new events.
pub struct EventBus {
    state: Mutex<BusState>,
    forwarder: SinkForwarder,
    config: BusConfig,
    idle: Notify,
}

impl EventBus {
    /// Create a new event bus.
    pub fn new(config: BusConfig, sink: Arc<dyn EventSink>) -> Arc<Self> {
        info!(
            history_capacity = config.history_capacity,
            listener_timeout_ms = ?config.listener_timeout_ms,
            "Event bus initialized"
        );

        Arc::new(Self {
            state: Mutex::new(BusState {
                registry: ListenerRegistry::new(),
                history: HistoryBuffer::new(config.history_capacity),
                queue: VecDeque::new(),
                draining: false,
                destroyed: false,
            }),
            forwarder: SinkForwarder::new(sink),
            config,
            idle: Notify::new(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ------------------------------------------------------------------
    // Producers
    // ------------------------------------------------------------------

    /// Accept an event.
    ///
    /// Appends to history, enqueues for dispatch, starts the drain task if
    /// it is idle and forwards the event to the sink. Returns without
    /// waiting for any listener.
    #[tracing::instrument(name = "bus.emit", skip_all, fields(event_type = %event.event_type))]
    pub fn emit(self: &Arc<Self>, event: Event) -> Result<()> {
        event.validate()?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| BusError::NoRuntime)?;
        let event = Arc::new(event);

        let start_drain = {
            let mut state = self.lock();
            if state.destroyed {
                return Err(BusError::Destroyed);
            }
            if let Some(evicted) = state.history.push(Arc::clone(&event)) {
                debug!(evicted = %evicted.id, "History full, evicted oldest event");
            }
            state.queue.push_back(Arc::clone(&event));
            !std::mem::replace(&mut state.draining, true)
        };

        if start_drain {
            let bus = Arc::clone(self);
            runtime.spawn(async move { bus.drain().await });
        }

        self.forwarder.forward((&*event).into());
        Ok(())
    }

    /// Build an event with a generated id and the current time, then emit it.
    pub fn emit_simple(
        self: &Arc<Self>,
        event_type: &str,
        data: Value,
        user_id: Option<&str>,
        org_id: Option<&str>,
    ) -> Result<()> {
        let mut event = Event::new(event_type, data);
        event.user_id = user_id.map(str::to_string);
        event.org_id = org_id.map(str::to_string);
        self.emit(event)
    }

    /// Emit a typed payload under its declared event type.
    pub fn emit_typed<T: TypedEvent>(
        self: &Arc<Self>,
        payload: &T,
        user_id: Option<&str>,
        org_id: Option<&str>,
    ) -> Result<()> {
        let data = serde_json::to_value(payload)?;
        self.emit_simple(T::EVENT_TYPE, data, user_id, org_id)
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    /// Register a listener. Higher priority listeners are started first.
    pub fn on(&self, event_type: &str, handler: Listener, priority: i32) -> HandlerId {
        let id = self.lock().registry.register(event_type, handler, priority, false);
        debug!(handler_id = %id, event_type = %event_type, priority, "Listener registered");
        id
    }

    /// Register a listener that is removed after its first invocation.
    pub fn once(&self, event_type: &str, handler: Listener, priority: i32) -> HandlerId {
        let id = self.lock().registry.register(event_type, handler, priority, true);
        debug!(handler_id = %id, event_type = %event_type, priority, "One-shot listener registered");
        id
    }

    /// Register a listener bound to a typed payload.
    pub fn on_typed<T, F, Fut>(&self, handler: F, priority: i32) -> HandlerId
    where
        T: TypedEvent,
        F: Fn(Envelope<T>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = std::result::Result<(), ListenerError>> + Send + 'static,
    {
        self.on(T::EVENT_TYPE, typed_listener(handler), priority)
    }

    /// Remove a registration by listener identity. Unknown listeners are a no-op.
    pub fn off(&self, event_type: &str, handler: &Listener) -> bool {
        self.lock().registry.remove_handler(event_type, handler)
    }

    /// Remove a registration by id. Unknown ids are a no-op.
    pub fn off_by_id(&self, id: &HandlerId) -> bool {
        self.lock().registry.remove_by_id(id).is_some()
    }

    /// Registered listeners for one type, or for all types.
    pub fn listeners(&self, event_type: Option<&str>) -> Vec<HandlerRecord> {
        self.lock().registry.listeners(event_type)
    }

    /// Enable or disable a registration without removing it.
    pub fn set_handler_enabled(&self, id: &HandlerId, enabled: bool) -> bool {
        self.lock().registry.set_enabled(id, enabled)
    }

    // ------------------------------------------------------------------
    // History and stats
    // ------------------------------------------------------------------

    /// History entries matching `filter`, oldest first.
    pub fn event_history(&self, filter: &EventFilter) -> Vec<Arc<Event>> {
        self.lock().history.query(filter)
    }

    /// Empty the history buffer. Pending dispatch and registrations are kept.
    pub fn clear_history(&self) {
        self.lock().history.clear();
    }

    pub fn stats(&self) -> BusStats {
        // A window reaching past the earliest representable time counts everything.
        let since = chrono::Duration::from_std(self.config.recent_window())
            .ok()
            .and_then(|window| Utc::now().checked_sub_signed(window))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let state = self.lock();
        BusStats {
            total_events: state.history.len(),
            total_listeners: state.registry.total(),
            event_types: state.registry.event_types(),
            recent_events: state.history.count_since(since),
        }
    }

    /// Sink writes that have failed since construction.
    pub fn sink_failures(&self) -> u64 {
        self.forwarder.failures()
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Resolve once the dispatch queue is empty and no drain is running.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let state = self.lock();
                if !state.draining && state.queue.is_empty() {
                    return;
                }
            }
            notified.await;
        }
    }

    /// Clear registrations, history and the pending queue.
    ///
    /// The bus rejects further events afterwards.
    pub fn destroy(&self) {
        let mut state = self.lock();
        let dropped = state.queue.len();
        state.registry.clear();
        state.history.clear();
        state.queue.clear();
        state.destroyed = true;
        info!(dropped_events = dropped, "Event bus destroyed");
    }

    pub fn is_destroyed(&self) -> bool {
        self.lock().destroyed
    }

    async fn drain(self: Arc<Self>) {
        loop {
            let next = {
                let mut state = self.lock();
                match state.queue.pop_front() {
                    Some(event) => {
                        let handlers = state.registry.take_for_dispatch(&event.event_type);
                        Some((event, handlers))
                    }
                    None => {
                        state.draining = false;
                        None
                    }
                }
            };

            let Some((event, handlers)) = next else {
                self.idle.notify_waiters();
                return;
            };

            let result =
                dispatch_to_handlers(handlers, &event, self.config.listener_timeout()).await;
            debug!(
                event_id = %event.id,
                event_type = %event.event_type,
                invoked = result.invoked,
                failed = result.failed,
                "Event dispatched"
            );
        }
    }

    // ------------------------------------------------------------------
    // Change-feed bridge
    // ------------------------------------------------------------------

    /// Dispatch inserts on the durable `events` table to local listeners.
    ///
    /// Filters by `user_id` when given, else by `org_id`, else receives all
    /// inserts. Bridged events bypass history, the queue and the sink.
    pub async fn bridge_change_feed(
        self: &Arc<Self>,
        transport: &dyn ChangeFeedTransport,
        user_id: Option<&str>,
        org_id: Option<&str>,
    ) -> std::result::Result<Arc<dyn ChannelHandle>, TransportError> {
        let mut spec = ChangeSpec::inserts(bridge::EVENTS_TABLE);
        if let Some(user) = user_id {
            spec = spec.with_eq_filter("user_id", user);
        } else if let Some(org) = org_id {
            spec = spec.with_eq_filter("org_id", org);
        }

        let channel = transport.channel(bridge::EVENTS_CHANNEL);
        let bus: Weak<Self> = Arc::downgrade(self);
        channel.on_change(
            spec,
            Arc::new(move |payload| {
                let Some(bus) = bus.upgrade() else {
                    return;
                };
                match bridge::event_from_change(&payload) {
                    Some(event) => bus.dispatch_detached(event),
                    None => warn!(table = %payload.table, "Dropping change row without event_type"),
                }
            }),
        );
        if let Err(e) = channel.subscribe().await {
            release(bridge::EVENTS_CHANNEL, channel.as_ref()).await;
            return Err(e);
        }

        info!(channel = bridge::EVENTS_CHANNEL, "Bridged durable event feed");
        Ok(channel)
    }

    fn dispatch_detached(&self, event: Event) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(event_type = %event.event_type, "No runtime for bridged event, dropping");
            return;
        };
        let (handlers, timeout) = {
            let mut state = self.lock();
            if state.destroyed {
                return;
            }
            (
                state.registry.take_for_dispatch(&event.event_type),
                self.config.listener_timeout(),
            )
        };
        let event = Arc::new(event);
        runtime.spawn(async move {
            let result = dispatch_to_handlers(handlers, &event, timeout).await;
            debug!(
                event_id = %event.id,
                event_type = %event.event_type,
                invoked = result.invoked,
                failed = result.failed,
                "Bridged event dispatched"
            );
        });
    }
}
