//! Handler dispatch utilities.
//!
//! Dispatches one event to a snapshot of listeners. All listeners are
//! started in snapshot (priority) order and run concurrently; the call
//! resolves once every one of them has settled. Failures, panics and
//! timeouts are logged per listener and never reach siblings or callers.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use tracing::{debug, error};

use super::event::Event;
use super::registry::HandlerRecord;
use super::ListenerError;

/// Outcome of dispatching one event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchResult {
    /// Listeners started.
    pub invoked: usize,
    /// Listeners that returned an error, panicked or timed out.
    pub failed: usize,
}

impl DispatchResult {
    /// Returns true if all listeners succeeded.
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

/// Dispatch an event to all listeners in `handlers`.
pub async fn dispatch_to_handlers(
    handlers: Vec<HandlerRecord>,
    event: &Arc<Event>,
    timeout: Option<Duration>,
) -> DispatchResult {
    if handlers.is_empty() {
        debug!(event_type = %event.event_type, "No listeners for event");
        return DispatchResult::default();
    }

    // Futures are created in priority order, which is launch order.
    let invocations: Vec<_> = handlers
        .iter()
        .map(|record| invoke(record, Arc::clone(event), timeout))
        .collect();

    let results = join_all(invocations).await;

    let mut outcome = DispatchResult {
        invoked: handlers.len(),
        failed: 0,
    };
    for (record, result) in handlers.iter().zip(results) {
        if let Err(e) = result {
            error!(
                handler_id = %record.id,
                event_type = %event.event_type,
                error = %e,
                "Error in event handler"
            );
            outcome.failed += 1;
        }
    }
    outcome
}

fn invoke(
    record: &HandlerRecord,
    event: Arc<Event>,
    timeout: Option<Duration>,
) -> BoxFuture<'static, Result<(), ListenerError>> {
    let handler = Arc::clone(record.handler());
    let started = std::panic::catch_unwind(AssertUnwindSafe(|| handler(event)));
    let fut = match started {
        Ok(fut) => fut,
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            return Box::pin(async move { Err(ListenerError::Panicked(message)) });
        }
    };

    Box::pin(async move {
        let guarded = AssertUnwindSafe(fut).catch_unwind();
        let settled = match timeout {
            Some(limit) => match tokio::time::timeout(limit, guarded).await {
                Ok(settled) => settled,
                Err(_) => return Err(ListenerError::Timeout(limit)),
            },
            None => guarded.await,
        };
        match settled {
            Ok(result) => result,
            Err(panic) => Err(ListenerError::Panicked(panic_message(panic.as_ref()))),
        }
    })
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "listener panicked".to_string()
    }
}
