//! Interface tests for the event bus and realtime manager using Cucumber.
//!
//! Scenarios are written against the public API only and run over the
//! in-memory transport, so no external services are needed.
//!
//! ```bash
//! cargo test --test interfaces
//! ```

mod steps;

use cucumber::World;
use steps::event_bus::EventBusWorld;
use steps::realtime::RealtimeWorld;

#[tokio::main]
async fn main() {
    println!("\n=== Running EventBus Interface Tests ===\n");
    EventBusWorld::cucumber()
        .fail_on_skipped()
        .run("tests/interfaces/features/event_bus.feature")
        .await;

    println!("\n=== Running RealtimeManager Interface Tests ===\n");
    RealtimeWorld::cucumber()
        .fail_on_skipped()
        .run("tests/interfaces/features/realtime.feature")
        .await;
}
