//! Resource limits for the event bus.
//!
//! The history buffer is the only unbounded-by-nature structure the bus
//! owns; the dispatch queue drains continuously and is bounded by how far
//! producers outrun listeners.

/// Default number of events retained in the history buffer.
pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;

/// Default window for the `recent_events` statistic (one hour).
pub const DEFAULT_RECENT_WINDOW_SECS: u64 = 60 * 60;
