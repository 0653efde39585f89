//! Bounded event history.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::event::{Event, Priority};

/// Query over the history buffer. Set fields are ANDed together; `tags`
/// matches when the event carries any of the listed tags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    pub event_type: Option<String>,
    pub user_id: Option<String>,
    pub org_id: Option<String>,
    pub priority: Option<Priority>,
    pub tags: Vec<String>,
}

impl EventFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    pub fn user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn org(mut self, org_id: impl Into<String>) -> Self {
        self.org_id = Some(org_id.into());
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// True when no field is set.
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub fn matches(&self, event: &Event) -> bool {
        if let Some(ref t) = self.event_type {
            if &event.event_type != t {
                return false;
            }
        }
        if self.user_id.is_some() && event.user_id != self.user_id {
            return false;
        }
        if self.org_id.is_some() && event.org_id != self.org_id {
            return false;
        }
        if self.priority.is_some() && event.priority() != self.priority {
            return false;
        }
        if !self.tags.is_empty() {
            let event_tags = event.tags();
            if !self.tags.iter().any(|t| event_tags.contains(t)) {
                return false;
            }
        }
        true
    }
}

/// Insertion-ordered ring of recent events. Evicts oldest-first once
/// `capacity` is exceeded.
#[derive(Debug)]
pub struct HistoryBuffer {
    events: VecDeque<Arc<Event>>,
    capacity: usize,
}

impl HistoryBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity.min(4096)),
            capacity,
        }
    }

    /// Append an event, returning the evicted one if the buffer was full.
    pub fn push(&mut self, event: Arc<Event>) -> Option<Arc<Event>> {
        self.events.push_back(event);
        if self.events.len() > self.capacity {
            self.events.pop_front()
        } else {
            None
        }
    }

    /// Events matching `filter`, oldest first.
    pub fn query(&self, filter: &EventFilter) -> Vec<Arc<Event>> {
        if filter.is_empty() {
            return self.events.iter().cloned().collect();
        }
        self.events
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect()
    }

    /// Number of events timestamped strictly after `since`.
    pub fn count_since(&self, since: DateTime<Utc>) -> usize {
        self.events.iter().filter(|e| e.timestamp > since).count()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
