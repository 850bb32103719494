//! # Sticky Status Demo
//!
//! A connection status bus that always knows the latest status.
//! Screens open after the status changed and still render it immediately,
//! then tear down all their receivers with one call when they close.

use std::sync::Arc;

use anyhow::Result;
use courier_core::{
    receiver_fn, Bus, BusConfig, EventBus, RegistrationHelper, StickyEventBus, TokioQueue,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

// ============================================================================
// Events
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Connection {
    Offline,
    Connecting { attempt: u32 },
    Online { latency_ms: u32 },
}

// ============================================================================
// Screens
// ============================================================================

fn open_screen(
    name: &'static str,
    status: &StickyEventBus<Connection>,
    screens: &RegistrationHelper<&'static str>,
) -> Result<()> {
    screens.register(
        name,
        status,
        receiver_fn(name, move |_, conn: &Connection| {
            println!("[{name}] {conn:?}");
            Ok(())
        }),
    )?;
    Ok(())
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Repeated statuses are not re-broadcast.
    let config: BusConfig =
        serde_json::from_str(r#"{ "name": "connection", "sticky": "skip_repeats" }"#)?;

    let queue = Arc::new(TokioQueue::new("ui"));
    let status = EventBus::<Connection>::builder(queue.clone())
        .config(config)
        .build_sticky();
    let screens = RegistrationHelper::new();

    status.broadcast(Connection::Offline)?;
    open_screen("toolbar", &status, &screens)?;
    queue.drain().await?;

    status.broadcast(Connection::Connecting { attempt: 1 })?;
    status.broadcast(Connection::Connecting { attempt: 1 })?;
    status.broadcast(Connection::Online { latency_ms: 42 })?;

    // Opens after the fact and still sees "online".
    open_screen("settings", &status, &screens)?;
    queue.drain().await?;

    let closed = screens.unregister_all(&"settings");
    info!(closed, remaining = status.core().len(), "Settings screen closed");

    status.broadcast(Connection::Offline)?;
    queue.drain().await?;

    queue.shutdown().await;
    Ok(())
}
