//! fleetlease facade.
//!
//! Re-exports the workspace crates and wires a node together: discover the
//! local devices, build the lease table over them and join the fleet.

pub use fleetlease_core as core;
pub use fleetlease_lease as lease;
pub use fleetlease_logistics as logistics;

pub mod error;
pub mod telemetry;

pub use error::FleetLeaseError;

use fleetlease_core::DeviceInventory;
use fleetlease_lease::{LeaseTable, Negotiator, NegotiatorConfig};
use fleetlease_logistics::Transport;
use std::sync::Arc;

/// Builds a [`LeaseTable`] from `inventory` and starts a [`Negotiator`] over
/// it. Must be called inside a tokio runtime.
///
/// An inventory that fails to enumerate yields a node with no devices; it can
/// still borrow from peers.
pub async fn join_fleet(
    config: NegotiatorConfig,
    transport: &dyn Transport,
    inventory: &dyn DeviceInventory,
) -> Result<(Negotiator, LeaseTable), FleetLeaseError> {
    let table = LeaseTable::from_inventory(inventory);
    let negotiator = Negotiator::start(config, transport, Arc::new(table.clone())).await?;
    tracing::info!(
        peer = %negotiator.peer_id(),
        devices = table.devices().len(),
        "joined fleet"
    );
    Ok((negotiator, table))
}

/// Convenient imports for common use cases.
pub mod prelude {
    pub use crate::FleetLeaseError;
    pub use crate::join_fleet;
    pub use crate::telemetry::TelemetryConfig;
    pub use fleetlease_core::{Device, DeviceId, DeviceInventory, PeerId, StaticInventory};
    pub use fleetlease_lease::prelude::*;
    pub use fleetlease_logistics::{InMemoryHub, Transport};
}

#[cfg(test)]
mod tests {
    use super::prelude::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_join_fleet_serves_local_devices() {
        let hub = InMemoryHub::new();
        let config = NegotiatorConfig::builder().peer_id("node-a").build();
        let (negotiator, table) = join_fleet(
            config,
            &hub,
            &StaticInventory::uniform("node-a", "gpu", 2),
        )
        .await
        .unwrap();

        let reservation = negotiator
            .reserve(Duration::from_secs(60), Duration::from_secs(1))
            .await
            .unwrap();
        assert!(!reservation.is_remote());
        assert!(table.is_allocated(reservation.device.id));
    }

    #[tokio::test]
    async fn test_join_fleet_rejects_bad_config() {
        let hub = InMemoryHub::new();
        let config = NegotiatorConfig::builder().peer_id("").build();
        let err = join_fleet(config, &hub, &StaticInventory::new(Vec::new()))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, FleetLeaseError::Negotiator(_)));
    }
}
