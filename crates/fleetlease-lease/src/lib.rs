//! Lease Negotiation Logic
//!
//! This crate implements local device leasing and the broadcast protocol that
//! lets nodes borrow devices from each other.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         Negotiator                           │
//! │  ┌──────────────┐  ┌──────────────────┐  ┌───────────────┐  │
//! │  │ reserve()    │  │ request listener │  │ fulfillment   │  │
//! │  │ (requesting) │  │ + backoff race   │  │ monitor       │  │
//! │  └──────────────┘  └──────────────────┘  └───────────────┘  │
//! │         │                  │                     │           │
//! │         ▼                  ▼                     ▼           │
//! │  ┌──────────────┐  ┌──────────────────┐  ┌───────────────┐  │
//! │  │  LeaseTable  │  │  BackoffPolicy   │  │  DedupCache   │  │
//! │  │ + ExpiryQueue│  │ (fixed / random) │  │   (moka)      │  │
//! │  └──────────────┘  └──────────────────┘  └───────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//!                 │  request / fulfillment topics
//!                 ▼
//!        fleetlease_logistics::Transport
//! ```

pub mod backoff;
pub mod config;
pub mod dedup;
mod error;
pub mod expiry;
pub mod metrics;
pub mod negotiator;
pub mod table;
pub mod wire;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use backoff::{BackoffPolicy, FixedBackoff, RandomizedBackoff};
pub use config::{BackoffConfig, NegotiatorConfig, NegotiatorConfigBuilder};
pub use dedup::DedupCache;
pub use error::{ConfigError, LeaseError, NegotiatorError, ReservationError};
pub use expiry::ExpiryQueue;
pub use metrics::NegotiatorMetrics;
pub use negotiator::{Negotiator, Origin, Reservation};
pub use table::{Grant, Lease, LeaseTable, LocalReservation};
pub use wire::{Fulfillment, LeaseTerms, Request, WireError};

// ============================================================================
// PRELUDE
// ============================================================================

/// Convenient imports for common use cases.
pub mod prelude {
    pub use crate::{
        LeaseError, LeaseTable, LocalReservation, Negotiator, NegotiatorConfig, Origin,
        Reservation, ReservationError,
    };
}
