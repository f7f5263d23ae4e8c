use thiserror::Error;

/// Unified error type for the `fleetlease` workspace.
///
/// Aggregates errors from the sub-crates into a single type for
/// application-level error handling.
#[derive(Error, Debug)]
pub enum FleetLeaseError {
    /// A reservation could not be completed.
    #[error("Reservation error: {0}")]
    Reservation(#[from] fleetlease_lease::ReservationError),

    /// The negotiator could not join the fleet.
    #[error("Negotiator error: {0}")]
    Negotiator(#[from] fleetlease_lease::NegotiatorError),

    /// Error related to the broadcast transport.
    #[error("Transport error: {0}")]
    Transport(#[from] fleetlease_logistics::TransportError),

    /// Device enumeration failed.
    #[error("Inventory error: {0}")]
    Inventory(#[from] fleetlease_core::InventoryError),

    /// Invalid negotiator configuration.
    #[error("Configuration error: {0}")]
    Config(#[from] fleetlease_lease::ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn reserve() -> Result<(), FleetLeaseError> {
        let timed_out: Result<(), _> =
            Err(fleetlease_lease::ReservationError::Timeout(Duration::from_millis(500)));
        timed_out?;
        Ok(())
    }

    #[test]
    fn test_sub_crate_errors_convert() {
        let err = reserve().unwrap_err();
        assert!(matches!(err, FleetLeaseError::Reservation(_)));
        assert!(err.to_string().starts_with("Reservation error:"));

        let err: FleetLeaseError = fleetlease_lease::ConfigError::Empty("peer_id").into();
        assert!(matches!(err, FleetLeaseError::Config(_)));
    }

    #[test]
    fn test_io_failures_surface_through_inventory() {
        let missing = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err: FleetLeaseError = fleetlease_core::InventoryError::Spawn {
            program: "nvidia-smi".into(),
            source: missing,
        }
        .into();

        match err {
            FleetLeaseError::Inventory(fleetlease_core::InventoryError::Spawn { source, .. }) => {
                assert_eq!(source.kind(), std::io::ErrorKind::NotFound)
            }
            other => panic!("expected an inventory error, got {other:?}"),
        }
    }
}
