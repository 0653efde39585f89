//! Local listener registry for translated realtime events.
//!
//! Independent of the event bus registry. Dispatch is synchronous: a
//! snapshot is taken under the lock and every listener is called outside
//! it, each in its own panic boundary.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::error;

use super::translate::RealtimeEvent;
use crate::bus::ListenerError;
use crate::utils::id::generate_id;

/// Synchronous realtime callback.
pub type RealtimeListener = Arc<dyn Fn(&RealtimeEvent) -> Result<(), ListenerError> + Send + Sync>;

/// Wrap a closure as a [`RealtimeListener`].
pub fn realtime_listener<F>(f: F) -> RealtimeListener
where
    F: Fn(&RealtimeEvent) -> Result<(), ListenerError> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Identifier of one realtime registration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListenerId(String);

impl ListenerId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Default)]
pub struct LocalListeners {
    by_type: Mutex<HashMap<String, Vec<(ListenerId, RealtimeListener)>>>,
}

impl LocalListeners {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<(ListenerId, RealtimeListener)>>> {
        self.by_type.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add(&self, event_type: &str, listener: RealtimeListener) -> ListenerId {
        let id = ListenerId(generate_id("listener"));
        self.lock()
            .entry(event_type.to_string())
            .or_default()
            .push((id.clone(), listener));
        id
    }

    /// Remove the first registration of `listener` under `event_type`.
    pub fn remove(&self, event_type: &str, listener: &RealtimeListener) -> bool {
        let mut by_type = self.lock();
        let Some(entries) = by_type.get_mut(event_type) else {
            return false;
        };
        let Some(index) = entries.iter().position(|(_, l)| Arc::ptr_eq(l, listener)) else {
            return false;
        };
        entries.remove(index);
        if entries.is_empty() {
            by_type.remove(event_type);
        }
        true
    }

    pub fn remove_by_id(&self, id: &ListenerId) -> bool {
        let mut by_type = self.lock();
        let mut emptied = None;
        let mut found = false;
        for (event_type, entries) in by_type.iter_mut() {
            if let Some(index) = entries.iter().position(|(i, _)| i == id) {
                entries.remove(index);
                if entries.is_empty() {
                    emptied = Some(event_type.clone());
                }
                found = true;
                break;
            }
        }
        if let Some(event_type) = emptied {
            by_type.remove(&event_type);
        }
        found
    }

    pub fn count(&self, event_type: Option<&str>) -> usize {
        let by_type = self.lock();
        match event_type {
            Some(t) => by_type.get(t).map_or(0, Vec::len),
            None => by_type.values().map(Vec::len).sum(),
        }
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Call every listener for `event_type`. Returns the number that failed.
    pub fn dispatch(&self, event_type: &str, event: &RealtimeEvent) -> usize {
        let snapshot: Vec<(ListenerId, RealtimeListener)> =
            self.lock().get(event_type).cloned().unwrap_or_default();

        let mut failed = 0;
        for (id, listener) in snapshot {
            let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| listener(event)));
            let error = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e,
                Err(_) => ListenerError::Panicked(format!("realtime listener {}", id)),
            };
            failed += 1;
            error!(
                listener_id = %id,
                event_type = %event_type,
                error = %error,
                "Error in realtime listener"
            );
        }
        failed
    }
}
