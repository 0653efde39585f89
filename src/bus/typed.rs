//! Statically typed event payloads.
//!
//! A payload type declares the event type it travels under. Typed
//! listeners receive the decoded payload alongside the raw event, so a
//! listener is bound to one payload shape at compile time.

use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::event::Event;
use super::registry::{listener_fn, Listener};
use super::ListenerError;

/// Payload bound to a fixed event type.
pub trait TypedEvent: Serialize + DeserializeOwned + Send + Sync + 'static {
    const EVENT_TYPE: &'static str;
}

/// Decoded payload plus the event it came from.
#[derive(Debug, Clone)]
pub struct Envelope<T> {
    pub payload: T,
    pub event: Arc<Event>,
}

/// Build a listener that decodes `event.data` into `T` before calling `f`.
///
/// A payload that does not decode is reported as a listener failure.
pub fn typed_listener<T, F, Fut>(f: F) -> Listener
where
    T: TypedEvent,
    F: Fn(Envelope<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ListenerError>> + Send + 'static,
{
    let f = Arc::new(f);
    listener_fn(move |event: Arc<Event>| {
        let f = Arc::clone(&f);
        async move {
            let payload: T = serde_json::from_value(event.data.clone()).map_err(|e| {
                ListenerError::Decode {
                    event_type: T::EVENT_TYPE.to_string(),
                    message: e.to_string(),
                }
            })?;
            f(Envelope { payload, event }).await
        }
    })
}
