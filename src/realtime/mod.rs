//! Realtime subscriptions over a change-feed transport.
//!
//! This module contains:
//! - `ChannelRegistry`: at most one open channel per key
//! - `translate`: row changes to [`RealtimeEvent`]s
//! - `LocalListeners`: synchronous listener registry for translated events
//! - `RealtimeManager`: the subscription entry points tying these together
//! - `MemoryTransport`: in-process transport for standalone mode and tests

use std::collections::HashSet;
use std::sync::{Arc, Weak};

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::bus::{EventBus, ListenerError};
use crate::interfaces::{
    BroadcastMessage, ChangeFeedTransport, ChangeSpec, ChannelHandle, TransportError,
};

pub mod channel;
pub mod listeners;
pub mod memory;
pub mod translate;

pub use channel::{ChannelKey, ChannelRegistry, SubscriptionKind};
pub use listeners::{realtime_listener, ListenerId, LocalListeners, RealtimeListener};
pub use memory::{MemoryChannel, MemoryTransport};
pub use translate::{
    translate, DashboardUpdate, RealtimeEvent, RecordChange, Route, TeamActivity, CUSTOM_EVENT,
};

/// Result type for realtime operations.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Open channels as seen by callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    /// True when at least one channel is open.
    pub connected: bool,
    /// Open channel keys, sorted.
    pub channels: Vec<String>,
}

/// Subscription entry points and local dispatch for realtime updates.
pub struct RealtimeManager {
    transport: Arc<dyn ChangeFeedTransport>,
    channels: ChannelRegistry,
    listeners: Arc<LocalListeners>,
}

impl RealtimeManager {
    pub fn new(transport: Arc<dyn ChangeFeedTransport>) -> Self {
        Self {
            transport,
            channels: ChannelRegistry::new(),
            listeners: Arc::new(LocalListeners::new()),
        }
    }

    // ------------------------------------------------------------------
    // Subscriptions
    // ------------------------------------------------------------------

    /// Dashboard insights, assessments and assessment responses of a user.
    pub async fn subscribe_to_dashboard(&self, user_id: &str) -> Result<Arc<dyn ChannelHandle>> {
        self.open_tables(SubscriptionKind::Dashboard, user_id).await
    }

    /// Delegations, membership and activity of an organization.
    pub async fn subscribe_to_team_activity(&self, org_id: &str) -> Result<Arc<dyn ChannelHandle>> {
        self.open_tables(SubscriptionKind::Team, org_id).await
    }

    /// AI logs and tasks of a user.
    pub async fn subscribe_to_ai_service_updates(
        &self,
        user_id: &str,
    ) -> Result<Arc<dyn ChannelHandle>> {
        self.open_tables(SubscriptionKind::Ai, user_id).await
    }

    /// Growth simulations and levers of a user.
    pub async fn subscribe_to_growth_studio_updates(
        &self,
        user_id: &str,
    ) -> Result<Arc<dyn ChannelHandle>> {
        self.open_tables(SubscriptionKind::Growth, user_id).await
    }

    /// Broadcast-only channel keyed by user, else org, else `global`.
    ///
    /// A non-empty `event_types` restricts forwarding to broadcasts whose
    /// inner `type` is listed. The list is fixed by the first call for a key.
    pub async fn subscribe_to_custom_events(
        &self,
        event_types: &[&str],
        user_id: Option<&str>,
        org_id: Option<&str>,
    ) -> Result<Arc<dyn ChannelHandle>> {
        let key = ChannelKey::custom(user_id, org_id);
        let allowed: HashSet<String> = event_types.iter().map(|t| t.to_string()).collect();

        let (channel, opened) = self
            .channels
            .get_or_open(&key, || {
                let channel = self.transport.channel(key.as_str());
                let listeners = Arc::clone(&self.listeners);
                channel.on_broadcast(
                    CUSTOM_EVENT,
                    Arc::new(move |payload: Value| {
                        if !allowed.is_empty() {
                            let inner = payload.get("type").and_then(Value::as_str);
                            if !inner.is_some_and(|t| allowed.contains(t)) {
                                debug!(event_type = ?inner, "Custom event type not subscribed");
                                return;
                            }
                        }
                        listeners.dispatch(CUSTOM_EVENT, &RealtimeEvent::Custom(payload));
                    }),
                );
                channel
            })
            .await?;

        if opened {
            info!(channel = %key, "Realtime channel opened");
        }
        Ok(channel)
    }

    async fn open_tables(
        &self,
        kind: SubscriptionKind,
        target: &str,
    ) -> Result<Arc<dyn ChannelHandle>> {
        let key = ChannelKey::new(kind, target);
        let (channel, opened) = self
            .channels
            .get_or_open(&key, || {
                let channel = self.transport.channel(key.as_str());
                for route in kind.routes() {
                    let route = *route;
                    let listeners = Arc::clone(&self.listeners);
                    channel.on_change(
                        ChangeSpec::all(route.table).with_eq_filter(route.filter_column, target),
                        Arc::new(move |payload| {
                            let event = translate(&route, &payload);
                            listeners.dispatch(route.event_type, &event);
                        }),
                    );
                }
                channel
            })
            .await?;

        if opened {
            info!(channel = %key, tables = kind.routes().len(), "Realtime channel opened");
        }
        Ok(channel)
    }

    // ------------------------------------------------------------------
    // Local listeners
    // ------------------------------------------------------------------

    pub fn on(&self, event_type: &str, listener: RealtimeListener) -> ListenerId {
        self.listeners.add(event_type, listener)
    }

    /// Remove a listener by identity. Unknown listeners are a no-op.
    pub fn off(&self, event_type: &str, listener: &RealtimeListener) -> bool {
        self.listeners.remove(event_type, listener)
    }

    pub fn off_by_id(&self, id: &ListenerId) -> bool {
        self.listeners.remove_by_id(id)
    }

    pub fn listener_count(&self, event_type: Option<&str>) -> usize {
        self.listeners.count(event_type)
    }

    /// Re-emit every translated realtime event on `bus` under the same type.
    ///
    /// Holds the bus weakly; once it is dropped the listeners do nothing.
    pub fn forward_to(&self, bus: &Arc<EventBus>) -> Vec<ListenerId> {
        let event_types = [
            SubscriptionKind::Dashboard,
            SubscriptionKind::Team,
            SubscriptionKind::Ai,
            SubscriptionKind::Growth,
        ]
        .into_iter()
        .flat_map(|kind| kind.routes().iter().map(|r| r.event_type))
        .chain(std::iter::once(CUSTOM_EVENT));

        event_types
            .map(|event_type| {
                let bus: Weak<EventBus> = Arc::downgrade(bus);
                self.on(
                    event_type,
                    realtime_listener(move |event| {
                        let Some(bus) = bus.upgrade() else {
                            return Ok(());
                        };
                        bus.emit_simple(
                            event_type,
                            event.to_value(),
                            event.user_id(),
                            event.org_id(),
                        )
                        .map_err(|e| ListenerError::failed(e.to_string()))
                    }),
                )
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Broadcast and status
    // ------------------------------------------------------------------

    /// Send a custom event on an open channel.
    ///
    /// An unknown or closed channel key is a no-op.
    pub async fn broadcast_event(
        &self,
        event_type: &str,
        data: Value,
        channel_id: &str,
    ) -> Result<()> {
        let Some(channel) = self.channels.get(channel_id).await else {
            debug!(channel = %channel_id, "Broadcast skipped, channel not open");
            return Ok(());
        };
        channel
            .send(BroadcastMessage {
                event: CUSTOM_EVENT.to_string(),
                payload: json!({ "type": event_type, "data": data }),
            })
            .await
    }

    pub async fn connection_status(&self) -> ConnectionStatus {
        let channels = self.channels.keys().await;
        ConnectionStatus {
            connected: !channels.is_empty(),
            channels,
        }
    }

    // ------------------------------------------------------------------
    // Teardown
    // ------------------------------------------------------------------

    /// Close one channel. Returns false if it was not open.
    pub async fn unsubscribe(&self, channel_id: &str) -> bool {
        let Some(channel) = self.channels.remove(channel_id).await else {
            return false;
        };
        close(channel_id, channel.as_ref()).await;
        true
    }

    /// Close every channel and clear local listeners.
    pub async fn unsubscribe_all(&self) {
        for (key, channel) in self.channels.drain().await {
            close(&key, channel.as_ref()).await;
        }
        self.listeners.clear();
    }
}

async fn close(key: &str, channel: &dyn ChannelHandle) {
    match channel.unsubscribe().await {
        Ok(()) => info!(channel = %key, "Unsubscribed from channel"),
        Err(e) => warn!(channel = %key, error = %e, "Channel unsubscribe failed"),
    }
}
