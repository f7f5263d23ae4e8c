//! Three nodes on an in-memory broadcast hub. `node-b` has no devices and
//! borrows one; `node-a` and `node-c` race to grant it and the slower of the
//! two stands down.
//!
//! `cargo run --example fleet_race`

use fleetlease::prelude::*;
use std::time::Duration;

async fn node(
    hub: &InMemoryHub,
    name: &str,
    devices: u32,
    backoff_ms: (u64, u64),
) -> Result<(Negotiator, LeaseTable), FleetLeaseError> {
    let config = NegotiatorConfig::builder()
        .peer_id(name)
        .randomized_backoff(
            Duration::from_millis(backoff_ms.0),
            Duration::from_millis(backoff_ms.1),
        )
        .build();
    join_fleet(config, hub, &StaticInventory::uniform(name, "sim-gpu", devices)).await
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    TelemetryConfig::builder()
        .service_name("fleet-race")
        .log_level("info,fleetlease_lease=debug")
        .build()
        .init()?;

    let hub = InMemoryHub::new();
    let (a, table_a) = node(&hub, "node-a", 1, (200, 400)).await?;
    let (c, table_c) = node(&hub, "node-c", 1, (200, 400)).await?;
    let (b, _) = node(&hub, "node-b", 0, (200, 400)).await?;

    println!("node-b requesting a device for 2s...");
    let reservation = b
        .reserve(Duration::from_secs(2), Duration::from_secs(5))
        .await?;
    match &reservation.origin {
        Origin::Remote { granter, .. } => {
            println!("node-b borrowed {} from {granter}", reservation.device)
        }
        Origin::Local { .. } => println!("node-b used its own {}", reservation.device),
    }

    // Let the loser's backoff run out.
    tokio::time::sleep(Duration::from_millis(500)).await;
    for (name, negotiator, table) in [("node-a", &a, &table_a), ("node-c", &c, &table_c)] {
        println!(
            "{name}: leased={} granted={} abstained={}",
            table.live_leases().len(),
            negotiator.metrics().fulfillments_published.get(),
            negotiator.metrics().abstentions.get(),
        );
    }

    tokio::time::sleep(Duration::from_secs(2)).await;
    println!(
        "after expiry: node-a leased={} node-c leased={}",
        table_a.live_leases().len(),
        table_c.live_leases().len()
    );

    fleetlease::telemetry::shutdown_tracing();
    Ok(())
}
