use fleetlease_logistics::TransportError;
use std::time::Duration;
use thiserror::Error;

/// Local lease table failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LeaseError {
    /// Every local device currently holds a live lease.
    #[error("no local device available")]
    NotAvailable,
}

/// Terminal outcomes of [`Negotiator::reserve`](crate::Negotiator::reserve).
#[derive(Debug, Error)]
pub enum ReservationError {
    /// No fulfillment addressed to us arrived before the caller's deadline.
    #[error("no fulfillment received within {0:?}")]
    Timeout(Duration),

    #[error("transport failure while requesting a device: {0}")]
    Transport(#[from] TransportError),

    /// The fulfillment subscription ended while we were waiting.
    #[error("fulfillment subscription closed")]
    Closed,
}

/// Failures that prevent a node from joining the protocol at all.
#[derive(Debug, Error)]
pub enum NegotiatorError {
    #[error("transport setup failed: {0}")]
    Transport(#[from] TransportError),

    #[error("metrics registration failed: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("malformed configuration document: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("backoff range is empty: min {min_ms}ms > max {max_ms}ms")]
    BackoffRange { min_ms: u64, max_ms: u64 },

    #[error("{0} must not be empty")]
    Empty(&'static str),
}
