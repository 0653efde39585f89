//! Signalbus - in-process event distribution
//!
//! An event bus with prioritized, isolated listeners and a bounded
//! queryable history, plus a realtime manager that turns row-level
//! change notifications into typed events.

pub mod bus;
pub mod config;
pub mod interfaces;
pub mod realtime;
pub mod sink;
pub mod utils;
