//! Backoff policies for the fulfillment race.
//!
//! Every subscriber sees a request at roughly the same time. Each listener
//! waits a policy-chosen delay before reserving, watching for a competitor's
//! fulfillment meanwhile, so that usually only the quickest node grants.

use rand::Rng;
use std::time::Duration;

pub trait BackoffPolicy: Send + Sync {
    /// Delay before acting on the next request.
    fn delay(&self) -> Duration;
}

/// Uniformly random delay in `[min, max)`.
#[derive(Debug, Clone, Copy)]
pub struct RandomizedBackoff {
    min: Duration,
    max: Duration,
}

impl RandomizedBackoff {
    /// A range with `max <= min` always yields `min`.
    pub fn new(min: Duration, max: Duration) -> Self {
        Self { min, max }
    }

    pub fn min(&self) -> Duration {
        self.min
    }

    pub fn max(&self) -> Duration {
        self.max
    }
}

impl BackoffPolicy for RandomizedBackoff {
    fn delay(&self) -> Duration {
        let lo = nanos(self.min);
        let hi = nanos(self.max);
        // Also covers ranges too long to express in nanoseconds.
        if hi <= lo {
            return self.min;
        }
        Duration::from_nanos(rand::rng().random_range(lo..hi))
    }
}

fn nanos(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}

/// The same delay every time. Deterministic races for tests and for fleets
/// that assign staggered delays per node.
#[derive(Debug, Clone, Copy)]
pub struct FixedBackoff(pub Duration);

impl BackoffPolicy for FixedBackoff {
    fn delay(&self) -> Duration {
        self.0
    }
}
