//! Abstract interfaces for signalbus collaborators.
//!
//! These traits define the contracts for:
//! - Durable event sink (fire-and-forget persistence of emitted events)
//! - Change-feed transport (row-level change notifications and broadcast channels)

pub mod event_sink;
pub mod transport;

pub use event_sink::{EventSink, SinkError, SinkRecord};
pub use transport::{
    BroadcastCallback, BroadcastMessage, ChangeCallback, ChangeEventFilter, ChangeFeedTransport,
    ChangeKind, ChangePayload, ChangeSpec, ChannelHandle, TransportError,
};
