//! Event bus configuration.

use std::time::Duration;

use serde::Deserialize;

use crate::config::{DEFAULT_HISTORY_CAPACITY, DEFAULT_RECENT_WINDOW_SECS};

/// Event bus configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Maximum events kept in history. Oldest are evicted first.
    pub history_capacity: usize,
    /// Per-listener timeout in milliseconds. Unset means listeners may run
    /// indefinitely, and a hanging listener holds back the next event.
    pub listener_timeout_ms: Option<u64>,
    /// Window used for the `recent_events` statistic.
    pub recent_window_secs: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            listener_timeout_ms: None,
            recent_window_secs: DEFAULT_RECENT_WINDOW_SECS,
        }
    }
}

impl BusConfig {
    /// Set the history capacity.
    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    /// Guard each listener invocation with a timeout.
    pub fn with_listener_timeout(mut self, timeout: Duration) -> Self {
        self.listener_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Listener timeout as a duration, if configured.
    pub fn listener_timeout(&self) -> Option<Duration> {
        self.listener_timeout_ms.map(Duration::from_millis)
    }

    /// Window for `recent_events`.
    pub fn recent_window(&self) -> Duration {
        Duration::from_secs(self.recent_window_secs)
    }
}
