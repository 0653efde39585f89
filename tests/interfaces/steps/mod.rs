//! Step definitions for interface tests.

pub mod event_bus;
pub mod realtime;
