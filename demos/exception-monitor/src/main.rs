//! # Exception Monitor Demo
//!
//! Shows how receiver failures become events on a bus of their own.
//! A flaky receiver fails on odd orders, gets unregistered, and the failure
//! lands on a monitoring bus. The healthy receiver never notices.

use std::sync::Arc;

use anyhow::Result;
use courier_core::{receiver_fn, Bus, EventBus, ReceiverFailure, TokioQueue};
use tracing::info;
use tracing_subscriber::EnvFilter;

// ============================================================================
// Events
// ============================================================================

#[derive(Debug, Clone)]
struct OrderPlaced {
    id: u32,
    total_cents: u64,
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,courier_core=debug")),
        )
        .init();

    let queue = Arc::new(TokioQueue::new("orders"));

    // Failures are ordinary events on their own bus.
    let failures = EventBus::<ReceiverFailure>::builder(queue.clone())
        .name("failures")
        .build();
    failures.register(receiver_fn("monitor", |_, failure: &ReceiverFailure| {
        println!(
            "[monitor] {} on '{}' at {}: {:#}",
            failure.as_label(),
            failure.receiver,
            failure.at.format("%H:%M:%S%.3f"),
            failure.error
        );
        Ok(())
    }))?;

    let orders = EventBus::<OrderPlaced>::builder(queue.clone())
        .name("orders")
        .report_to(failures)
        .build();

    orders.register(receiver_fn("ledger", |_, order: &OrderPlaced| {
        println!("[ledger] order #{} for {} cents", order.id, order.total_cents);
        Ok(())
    }))?;

    orders.register(receiver_fn("flaky-mailer", |_, order: &OrderPlaced| {
        if order.id % 2 == 1 {
            anyhow::bail!("mail server refused order #{}", order.id);
        }
        println!("[mailer] confirmation sent for #{}", order.id);
        Ok(())
    }))?;

    for id in 1..=4 {
        orders.broadcast(OrderPlaced {
            id,
            total_cents: u64::from(id) * 1250,
        })?;
    }

    // Reports are submitted while the first batch drains.
    queue.drain().await?;
    queue.drain().await?;

    info!(receivers = orders.len(), "Orders bus after failures");
    queue.shutdown().await;

    Ok(())
}
