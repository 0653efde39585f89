//! In-memory change-feed transport for standalone mode.
//!
//! Delivery is synchronous: `publish_change` and `send` invoke the matching
//! callbacks of every subscribed channel before returning. Ideal for local
//! development and testing without an external realtime service.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

use crate::interfaces::{
    BroadcastCallback, BroadcastMessage, ChangeCallback, ChangeFeedTransport, ChangePayload,
    ChangeSpec, ChannelHandle, TransportError,
};

/// Sent messages kept for inspection; older ones are discarded.
pub const SENT_LOG_CAPACITY: usize = 256;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Check a `column=eq.value` filter against a change.
///
/// Missing filter matches everything. Operators other than `eq` never match.
fn filter_matches(filter: Option<&str>, payload: &ChangePayload) -> bool {
    let Some(filter) = filter else {
        return true;
    };
    let Some((column, condition)) = filter.split_once('=') else {
        return false;
    };
    let Some(expected) = condition.strip_prefix("eq.") else {
        return false;
    };
    match payload.field(column) {
        Some(Value::String(s)) => s == expected,
        Some(Value::Number(n)) => n.to_string() == expected,
        Some(Value::Bool(b)) => b.to_string() == expected,
        _ => false,
    }
}

fn spec_matches(spec: &ChangeSpec, payload: &ChangePayload) -> bool {
    spec.schema == payload.schema
        && spec.table == payload.table
        && spec.event.matches(payload.event_type)
        && filter_matches(spec.filter.as_deref(), payload)
}

#[derive(Default)]
struct TransportState {
    channels: Vec<Arc<MemoryChannel>>,
    subscribe_calls: HashMap<String, usize>,
    sent: VecDeque<(String, BroadcastMessage)>,
}

#[derive(Default)]
struct Shared {
    state: Mutex<TransportState>,
    fail_subscribe: AtomicBool,
}

impl Shared {
    fn subscribed(&self, key: Option<&str>) -> Vec<Arc<MemoryChannel>> {
        lock(&self.state)
            .channels
            .iter()
            .filter(|c| c.is_subscribed() && key.map_or(true, |k| c.key == k))
            .cloned()
            .collect()
    }
}

/// In-process change-feed transport.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    shared: Arc<Shared>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `subscribe` fail.
    pub fn fail_subscribe(&self, fail: bool) {
        self.shared.fail_subscribe.store(fail, Ordering::SeqCst);
    }

    /// Deliver a row change to every subscribed channel watching it.
    ///
    /// Returns the number of callbacks invoked.
    pub fn publish_change(&self, payload: ChangePayload) -> usize {
        let callbacks: Vec<ChangeCallback> = self
            .shared
            .subscribed(None)
            .iter()
            .flat_map(|c| c.change_callbacks(&payload))
            .collect();
        debug!(
            table = %payload.table,
            operation = %payload.event_type,
            callbacks = callbacks.len(),
            "Publishing change"
        );
        for callback in &callbacks {
            callback(payload.clone());
        }
        callbacks.len()
    }

    /// Deliver an inbound broadcast to every subscribed channel with `key`.
    pub fn broadcast(&self, key: &str, message: BroadcastMessage) -> usize {
        deliver(&self.shared.subscribed(Some(key)), None, &message)
    }

    /// Number of successful `subscribe` calls for `key`.
    pub fn subscription_count(&self, key: &str) -> usize {
        lock(&self.shared.state)
            .subscribe_calls
            .get(key)
            .copied()
            .unwrap_or(0)
    }

    /// Channels currently subscribed.
    pub fn open_channels(&self) -> usize {
        self.shared.subscribed(None).len()
    }

    /// Channel handles still held by the transport, subscribed or not.
    pub fn retained_channels(&self) -> usize {
        lock(&self.shared.state).channels.len()
    }

    /// Most recent messages sent through channel handles, in send order.
    ///
    /// At most [`SENT_LOG_CAPACITY`] messages are kept across all keys.
    pub fn sent_messages(&self, key: &str) -> Vec<BroadcastMessage> {
        lock(&self.shared.state)
            .sent
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, m)| m.clone())
            .collect()
    }
}

impl ChangeFeedTransport for MemoryTransport {
    fn channel(&self, key: &str) -> Arc<dyn ChannelHandle> {
        let channel = Arc::new(MemoryChannel {
            key: key.to_string(),
            transport: Arc::downgrade(&self.shared),
            changes: Mutex::new(Vec::new()),
            broadcasts: Mutex::new(Vec::new()),
            subscribed: AtomicBool::new(false),
        });
        lock(&self.shared.state).channels.push(Arc::clone(&channel));
        channel
    }
}

fn deliver(
    channels: &[Arc<MemoryChannel>],
    sender: Option<&MemoryChannel>,
    message: &BroadcastMessage,
) -> usize {
    let callbacks: Vec<BroadcastCallback> = channels
        .iter()
        .filter(|c| sender.map_or(true, |s| !std::ptr::eq(Arc::as_ptr(*c), s)))
        .flat_map(|c| c.broadcast_callbacks(&message.event))
        .collect();
    for callback in &callbacks {
        callback(message.payload.clone());
    }
    callbacks.len()
}

/// Channel handle issued by [`MemoryTransport`].
pub struct MemoryChannel {
    key: String,
    transport: Weak<Shared>,
    changes: Mutex<Vec<(ChangeSpec, ChangeCallback)>>,
    broadcasts: Mutex<Vec<(String, BroadcastCallback)>>,
    subscribed: AtomicBool,
}

impl MemoryChannel {
    fn is_subscribed(&self) -> bool {
        self.subscribed.load(Ordering::SeqCst)
    }

    fn change_callbacks(&self, payload: &ChangePayload) -> Vec<ChangeCallback> {
        lock(&self.changes)
            .iter()
            .filter(|(spec, _)| spec_matches(spec, payload))
            .map(|(_, cb)| Arc::clone(cb))
            .collect()
    }

    fn broadcast_callbacks(&self, event: &str) -> Vec<BroadcastCallback> {
        lock(&self.broadcasts)
            .iter()
            .filter(|(name, _)| name == event)
            .map(|(_, cb)| Arc::clone(cb))
            .collect()
    }

    fn shared(&self) -> Result<Arc<Shared>, TransportError> {
        self.transport
            .upgrade()
            .ok_or_else(|| TransportError::Closed(self.key.clone()))
    }
}

#[async_trait]
impl ChannelHandle for MemoryChannel {
    fn key(&self) -> &str {
        &self.key
    }

    fn on_change(&self, spec: ChangeSpec, callback: ChangeCallback) {
        lock(&self.changes).push((spec, callback));
    }

    fn on_broadcast(&self, event: &str, callback: BroadcastCallback) {
        lock(&self.broadcasts).push((event.to_string(), callback));
    }

    async fn subscribe(&self) -> Result<(), TransportError> {
        let shared = self.shared()?;
        if shared.fail_subscribe.load(Ordering::SeqCst) {
            return Err(TransportError::Subscribe {
                channel: self.key.clone(),
                message: "transport refused subscription".to_string(),
            });
        }
        self.subscribed.store(true, Ordering::SeqCst);
        *lock(&shared.state)
            .subscribe_calls
            .entry(self.key.clone())
            .or_default() += 1;
        info!(channel = %self.key, "Channel subscribed");
        Ok(())
    }

    async fn unsubscribe(&self) -> Result<(), TransportError> {
        self.subscribed.store(false, Ordering::SeqCst);
        if let Ok(shared) = self.shared() {
            lock(&shared.state)
                .channels
                .retain(|c| !std::ptr::eq(Arc::as_ptr(c), self));
        }
        debug!(channel = %self.key, "Channel unsubscribed");
        Ok(())
    }

    async fn send(&self, message: BroadcastMessage) -> Result<(), TransportError> {
        if !self.is_subscribed() {
            return Err(TransportError::Closed(self.key.clone()));
        }
        let shared = self.shared()?;
        {
            let mut state = lock(&shared.state);
            if state.sent.len() == SENT_LOG_CAPACITY {
                state.sent.pop_front();
            }
            state.sent.push_back((self.key.clone(), message.clone()));
        }
        let peers = shared.subscribed(Some(&self.key));
        deliver(&peers, Some(self), &message);
        Ok(())
    }
}
