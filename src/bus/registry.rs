//! Listener registry.
//!
//! Per event type, registrations are kept sorted by descending priority.
//! The sort is stable, so equal priorities keep registration order.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;

use super::event::Event;
use super::ListenerError;
use crate::utils::id::generate_id;

/// Async event callback.
pub type Listener =
    Arc<dyn Fn(Arc<Event>) -> BoxFuture<'static, Result<(), ListenerError>> + Send + Sync>;

/// Wrap an async closure as a [`Listener`].
pub fn listener_fn<F, Fut>(f: F) -> Listener
where
    F: Fn(Arc<Event>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ListenerError>> + Send + 'static,
{
    Arc::new(move |event| Box::pin(f(event)))
}

/// Identifier of one registration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HandlerId(String);

impl HandlerId {
    fn generate() -> Self {
        Self(generate_id("handler"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for HandlerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One registered listener.
#[derive(Clone)]
pub struct HandlerRecord {
    pub id: HandlerId,
    pub event_type: String,
    pub priority: i32,
    pub enabled: bool,
    /// Removed from the registry the first time it is dispatched.
    pub once: bool,
    handler: Listener,
}

impl HandlerRecord {
    pub fn handler(&self) -> &Listener {
        &self.handler
    }
}

impl std::fmt::Debug for HandlerRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRecord")
            .field("id", &self.id)
            .field("event_type", &self.event_type)
            .field("priority", &self.priority)
            .field("enabled", &self.enabled)
            .field("once", &self.once)
            .finish()
    }
}

/// Registrations keyed by event type.
#[derive(Default)]
pub struct ListenerRegistry {
    by_type: HashMap<String, Vec<HandlerRecord>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        event_type: &str,
        handler: Listener,
        priority: i32,
        once: bool,
    ) -> HandlerId {
        let id = HandlerId::generate();
        let entries = self.by_type.entry(event_type.to_string()).or_default();
        entries.push(HandlerRecord {
            id: id.clone(),
            event_type: event_type.to_string(),
            priority,
            enabled: true,
            once,
            handler,
        });
        entries.sort_by(|a, b| b.priority.cmp(&a.priority));
        id
    }

    /// Remove the first registration of `handler` under `event_type`.
    pub fn remove_handler(&mut self, event_type: &str, handler: &Listener) -> bool {
        let Some(entries) = self.by_type.get_mut(event_type) else {
            return false;
        };
        let Some(index) = entries
            .iter()
            .position(|r| Arc::ptr_eq(&r.handler, handler))
        else {
            return false;
        };
        entries.remove(index);
        if entries.is_empty() {
            self.by_type.remove(event_type);
        }
        true
    }

    pub fn remove_by_id(&mut self, id: &HandlerId) -> Option<HandlerRecord> {
        let (event_type, index) = self.by_type.iter().find_map(|(t, entries)| {
            entries
                .iter()
                .position(|r| &r.id == id)
                .map(|i| (t.clone(), i))
        })?;
        let entries = self.by_type.get_mut(&event_type)?;
        let record = entries.remove(index);
        if entries.is_empty() {
            self.by_type.remove(&event_type);
        }
        Some(record)
    }

    pub fn set_enabled(&mut self, id: &HandlerId, enabled: bool) -> bool {
        for entries in self.by_type.values_mut() {
            if let Some(record) = entries.iter_mut().find(|r| &r.id == id) {
                record.enabled = enabled;
                return true;
            }
        }
        false
    }

    /// Snapshot of the enabled listeners for `event_type`, in priority
    /// order. `once` registrations in the snapshot are removed here so they
    /// can never be selected twice.
    pub fn take_for_dispatch(&mut self, event_type: &str) -> Vec<HandlerRecord> {
        let Some(entries) = self.by_type.get_mut(event_type) else {
            return Vec::new();
        };
        let selected: Vec<HandlerRecord> = entries.iter().filter(|r| r.enabled).cloned().collect();
        entries.retain(|r| !(r.enabled && r.once));
        if entries.is_empty() {
            self.by_type.remove(event_type);
        }
        selected
    }

    /// Registrations for one type, or all types when `event_type` is None.
    pub fn listeners(&self, event_type: Option<&str>) -> Vec<HandlerRecord> {
        match event_type {
            Some(t) => self.by_type.get(t).cloned().unwrap_or_default(),
            None => self.by_type.values().flatten().cloned().collect(),
        }
    }

    /// Event types with at least one registration, sorted.
    pub fn event_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.by_type.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn total(&self) -> usize {
        self.by_type.values().map(Vec::len).sum()
    }

    pub fn clear(&mut self) {
        self.by_type.clear();
    }
}
