//! Protocol counters.
//!
//! Each negotiator owns its own registry, so several nodes can share a
//! process (as in tests and simulations) without colliding.

use prometheus::{IntCounter, Registry};

#[derive(Clone)]
pub struct NegotiatorMetrics {
    registry: Registry,
    /// Requests satisfied from the local inventory.
    pub local_grants: IntCounter,
    pub requests_published: IntCounter,
    /// Fulfillments received for our own requests.
    pub remote_grants: IntCounter,
    pub request_timeouts: IntCounter,
    pub fulfillments_published: IntCounter,
    /// Foreign requests we stood down from after seeing a competitor win.
    pub abstentions: IntCounter,
    /// Foreign requests we competed for but had no free device for.
    pub failed_attempts: IntCounter,
    pub duplicate_requests: IntCounter,
    pub malformed_messages: IntCounter,
}

fn counter(registry: &Registry, name: &str, help: &str) -> Result<IntCounter, prometheus::Error> {
    let c = IntCounter::new(format!("fleetlease_{name}"), help)?;
    registry.register(Box::new(c.clone()))?;
    Ok(c)
}

impl NegotiatorMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        Ok(Self {
            local_grants: counter(&registry, "local_grants_total", "Reservations served locally")?,
            requests_published: counter(
                &registry,
                "requests_published_total",
                "Device requests broadcast to the fleet",
            )?,
            remote_grants: counter(
                &registry,
                "remote_grants_total",
                "Devices granted to this node by peers",
            )?,
            request_timeouts: counter(
                &registry,
                "request_timeouts_total",
                "Requests that received no fulfillment in time",
            )?,
            fulfillments_published: counter(
                &registry,
                "fulfillments_published_total",
                "Devices granted to peers",
            )?,
            abstentions: counter(
                &registry,
                "abstentions_total",
                "Peer requests already fulfilled by another node during backoff",
            )?,
            failed_attempts: counter(
                &registry,
                "failed_attempts_total",
                "Peer requests with no local device free",
            )?,
            duplicate_requests: counter(
                &registry,
                "duplicate_requests_total",
                "Redelivered or already satisfied requests dropped",
            )?,
            malformed_messages: counter(
                &registry,
                "malformed_messages_total",
                "Payloads that failed to decode",
            )?,
            registry,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_are_exported() {
        let metrics = NegotiatorMetrics::new().unwrap();
        metrics.abstentions.inc();

        let families = metrics.registry().gather();
        let text = prometheus::TextEncoder::new()
            .encode_to_string(&families)
            .unwrap();
        assert!(text.contains("fleetlease_abstentions_total 1"));
        assert_eq!(families.len(), 9);
    }

    #[test]
    fn test_instances_do_not_collide() {
        let a = NegotiatorMetrics::new().unwrap();
        let b = NegotiatorMetrics::new().unwrap();
        a.local_grants.inc();
        assert_eq!(b.local_grants.get(), 0);
    }
}
