//! Advisory record of requests known to be spoken for.
//!
//! A node records a request key here once it has seen a fulfillment for it,
//! whether it published that fulfillment itself or observed another node's.
//! The cache only suppresses wasted reservations; the requestor still takes
//! whichever fulfillment reaches it first.

use fleetlease_core::RequestKey;
use moka::Expiry;
use moka::ops::compute::{CompResult, Op};
use moka::sync::Cache;
use std::time::{Duration, Instant};

/// Extra lifetime given to the underlying cache entry so that eviction never
/// precedes the recorded expiry. Lookups still compare against the exact
/// instant.
const EVICTION_SLACK: Duration = Duration::from_millis(5);

struct UntilRecorded;

impl Expiry<RequestKey, Instant> for UntilRecorded {
    fn expire_after_create(
        &self,
        _key: &RequestKey,
        expires_at: &Instant,
        created_at: Instant,
    ) -> Option<Duration> {
        Some(expires_at.saturating_duration_since(created_at) + EVICTION_SLACK)
    }

    fn expire_after_update(
        &self,
        _key: &RequestKey,
        expires_at: &Instant,
        updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(expires_at.saturating_duration_since(updated_at) + EVICTION_SLACK)
    }
}

/// Request key → expiry map with per-entry expiration.
///
/// Clones share the same entries.
#[derive(Clone)]
pub struct DedupCache {
    entries: Cache<RequestKey, Instant>,
}

impl DedupCache {
    pub fn new() -> Self {
        Self {
            entries: Cache::builder()
                .name("fleetlease-dedup")
                .expire_after(UntilRecorded)
                .eviction_listener(|key, _, cause| {
                    tracing::trace!(request = %key, ?cause, "dedup entry dropped");
                })
                .build(),
        }
    }

    /// Records `key` as spoken for until `expires_at`. Last write wins.
    pub fn mark_satisfied(&self, key: RequestKey, expires_at: Instant) {
        self.entries.insert(key, expires_at);
    }

    /// True iff an entry exists whose expiry has not passed.
    pub fn is_satisfied(&self, key: &RequestKey) -> bool {
        self.entries
            .get(key)
            .is_some_and(|expires_at| Instant::now() < expires_at)
    }

    /// Records `key` only if no live entry exists. Returns whether this call
    /// made the entry, so exactly one of several racing callers wins.
    pub fn claim(&self, key: RequestKey, expires_at: Instant) -> bool {
        // Compute calls on one key are serialized, which also covers an entry
        // that outlived its expiry but was not yet evicted.
        let outcome = self
            .entries
            .entry(key)
            .and_compute_with(|current| match current {
                Some(entry) if Instant::now() < *entry.value() => Op::Nop,
                _ => Op::Put(expires_at),
            });
        matches!(outcome, CompResult::Inserted(_) | CompResult::ReplacedWith(_))
    }

    /// Number of entries, including expired ones not yet swept.
    pub fn len(&self) -> u64 {
        self.entries.run_pending_tasks();
        self.entries.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for DedupCache {
    fn default() -> Self {
        Self::new()
    }
}
