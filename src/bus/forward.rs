//! Fire-and-forget forwarding to the durable sink.
//!
//! Each accepted event is written on its own detached task. The caller is
//! never joined to that task: failures are logged and counted, never
//! retried, and never reach listener dispatch.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, error};

use crate::interfaces::{EventSink, SinkRecord};

/// Detached writer in front of an [`EventSink`].
pub struct SinkForwarder {
    sink: Arc<dyn EventSink>,
    failures: Arc<AtomicU64>,
}

impl SinkForwarder {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self {
            sink,
            failures: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Spawn the insert and return immediately.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn forward(&self, record: SinkRecord) {
        let sink = Arc::clone(&self.sink);
        let failures = Arc::clone(&self.failures);
        tokio::spawn(async move {
            match sink.insert(&record).await {
                Ok(()) => debug!(event_type = %record.event_type, "Event forwarded to sink"),
                Err(e) => {
                    failures.fetch_add(1, Ordering::Relaxed);
                    error!(
                        event_type = %record.event_type,
                        error = %e,
                        "Failed to forward event to sink"
                    );
                }
            }
        });
    }

    /// Number of sink writes that have failed so far.
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}
