//! signalbus-standalone: single-process event host
//!
//! Runs the event bus, the configured durable sink and a realtime manager
//! over the in-memory change-feed transport. Translated realtime events are
//! re-emitted on the bus, and inserts on the `events` table are bridged
//! back to local listeners.
//!
//! ## Configuration
//! ```yaml
//! bus:
//!   history_capacity: 1000
//!   listener_timeout_ms: 30000
//! sink:
//!   type: sqlite
//!   url: sqlite://signalbus.db?mode=rwc
//! ```

use std::sync::Arc;

use tracing::{error, info};

use signalbus::bus::EventBus;
use signalbus::config::Config;
use signalbus::realtime::{MemoryTransport, RealtimeManager};
use signalbus::sink::init_sink;
use signalbus::utils::bootstrap::{init_tracing, parse_config_path, shutdown_signal};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config_path = parse_config_path();
    let config = Config::load(config_path.as_deref()).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!("Starting signalbus-standalone");

    let sink = init_sink(&config.sink).await.map_err(|e| {
        error!(sink_type = ?config.sink.sink_type, "Failed to initialize sink: {}", e);
        e
    })?;
    let bus = EventBus::new(config.bus.clone(), sink);

    let transport = Arc::new(MemoryTransport::new());
    let realtime = RealtimeManager::new(transport.clone());
    let forwarded = realtime.forward_to(&bus);
    info!(listeners = forwarded.len(), "Realtime events forwarded to bus");

    bus.bridge_change_feed(transport.as_ref(), None, None).await?;
    realtime.subscribe_to_custom_events(&[], None, None).await?;

    shutdown_signal().await;

    info!("Shutting down");
    realtime.unsubscribe_all().await;
    bus.wait_idle().await;
    let stats = bus.stats();
    info!(
        total_events = stats.total_events,
        sink_failures = bus.sink_failures(),
        "Final bus statistics"
    );
    bus.destroy();

    Ok(())
}
