//! Local lease bookkeeping.
//!
//! The [`LeaseTable`] is the only owner of device exclusivity on a node. It
//! hands out time-bounded leases on the node's own devices and takes them back
//! when they expire.

use crate::error::LeaseError;
use crate::expiry::ExpiryQueue;
use crate::wire::millis;
use fleetlease_core::{Device, DeviceId, DeviceInventory, Token, inventory};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// An exclusive, time-bounded claim on one local device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    pub device_id: DeviceId,
    pub expires_at: Instant,
    pub token: Token,
}

impl Lease {
    pub fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// A successful local reservation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grant {
    pub device: Device,
    pub lease: Lease,
}

/// Reserve any free local device for a duration, or fail.
///
/// The negotiator only ever touches local hardware through this seam.
pub trait LocalReservation: Send + Sync {
    fn reserve(&self, duration: Duration) -> Result<Grant, LeaseError>;

    /// Hands a device back before its lease expires. Idempotent.
    fn release(&self, device_id: DeviceId);
}

/// Longest lease the table will record. Longer requests, `Duration::MAX`
/// included, are held until released or until this horizon passes.
pub const MAX_LEASE: Duration = Duration::from_secs(30 * 365 * 24 * 60 * 60);

type Leases = Arc<Mutex<HashMap<DeviceId, Lease>>>;

/// Mutex-guarded table of live leases over a fixed inventory.
///
/// Cloning is cheap; clones share the same table.
#[derive(Clone)]
pub struct LeaseTable {
    inner: Arc<TableInner>,
}

struct TableInner {
    devices: Vec<Device>,
    leases: Leases,
    expiry: ExpiryQueue<(DeviceId, Token)>,
}

fn lock(leases: &Mutex<HashMap<DeviceId, Lease>>) -> MutexGuard<'_, HashMap<DeviceId, Lease>> {
    leases.lock().unwrap_or_else(PoisonError::into_inner)
}

impl LeaseTable {
    /// Builds a table over `devices`, searched in the given order.
    ///
    /// Spawns the expiry task, so it must be called inside a tokio runtime.
    pub fn new(devices: Vec<Device>) -> Self {
        let leases: Leases = Arc::new(Mutex::new(HashMap::new()));

        let reaper = leases.clone();
        let expiry = ExpiryQueue::spawn(move |(device_id, token): (DeviceId, Token)| {
            let mut leases = lock(&reaper);
            // A stale timer must not end a lease granted after an early release.
            if leases.get(&device_id).is_some_and(|l| l.token == token) {
                leases.remove(&device_id);
                tracing::trace!(device_id, %token, "lease expired");
            }
        });

        Self {
            inner: Arc::new(TableInner {
                devices,
                leases,
                expiry,
            }),
        }
    }

    /// Builds a table from an inventory provider; enumeration failures leave
    /// the table empty.
    pub fn from_inventory(provider: &dyn DeviceInventory) -> Self {
        Self::new(inventory::discover(provider))
    }

    pub fn devices(&self) -> &[Device] {
        &self.inner.devices
    }

    pub fn device(&self, id: DeviceId) -> Option<&Device> {
        self.inner.devices.iter().find(|d| d.id == id)
    }

    /// First-fit reservation over the inventory order.
    pub fn reserve(&self, duration: Duration) -> Result<Grant, LeaseError> {
        let grant = {
            let mut leases = lock(&self.inner.leases);
            let now = Instant::now();

            let device = self
                .inner
                .devices
                .iter()
                .find(|d| !leases.get(&d.id).is_some_and(|l| l.is_live(now)))
                .ok_or(LeaseError::NotAvailable)?;

            let lease = Lease {
                device_id: device.id,
                expires_at: now + duration.min(MAX_LEASE),
                token: Token::generate(),
            };
            leases.insert(device.id, lease.clone());

            Grant {
                device: device.clone(),
                lease,
            }
        };

        self.inner.expiry.schedule(
            (grant.device.id, grant.lease.token.clone()),
            grant.lease.expires_at,
        );
        tracing::debug!(
            device_id = grant.device.id,
            lease_ms = millis(duration),
            "device leased"
        );

        Ok(grant)
    }

    /// Drops the lease on `device_id`. Releasing a free or unknown device is a
    /// no-op.
    pub fn release(&self, device_id: DeviceId) {
        if lock(&self.inner.leases).remove(&device_id).is_some() {
            tracing::debug!(device_id, "lease released");
        }
    }

    pub fn is_allocated(&self, device_id: DeviceId) -> bool {
        let now = Instant::now();
        lock(&self.inner.leases)
            .get(&device_id)
            .is_some_and(|l| l.is_live(now))
    }

    /// Snapshot of the leases that are live right now.
    pub fn live_leases(&self) -> Vec<Lease> {
        let now = Instant::now();
        lock(&self.inner.leases)
            .values()
            .filter(|l| l.is_live(now))
            .cloned()
            .collect()
    }
}

impl LocalReservation for LeaseTable {
    fn reserve(&self, duration: Duration) -> Result<Grant, LeaseError> {
        LeaseTable::reserve(self, duration)
    }

    fn release(&self, device_id: DeviceId) {
        LeaseTable::release(self, device_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetlease_core::StaticInventory;
    use std::collections::HashSet;
    use tokio::time::sleep;

    fn table(n: u32) -> LeaseTable {
        LeaseTable::from_inventory(&StaticInventory::uniform("node-a", "gpu", n))
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_devices_three_reservations() {
        let table = table(2);
        let ten = Duration::from_secs(10);

        let a = table.reserve(ten).unwrap();
        let b = table.reserve(ten).unwrap();
        assert_ne!(a.device.id, b.device.id);
        assert_eq!(table.reserve(ten), Err(LeaseError::NotAvailable));
    }

    #[tokio::test(start_paused = true)]
    async fn test_allocated_exactly_until_expiry() {
        let table = table(1);
        let grant = table.reserve(Duration::from_secs(5)).unwrap();
        let id = grant.device.id;

        assert!(table.is_allocated(id));
        sleep(Duration::from_millis(4_999)).await;
        assert!(table.is_allocated(id));
        assert!(table.reserve(Duration::from_secs(1)).is_err());

        sleep(Duration::from_millis(1)).await;
        assert!(!table.is_allocated(id));
        assert_eq!(table.reserve(Duration::from_secs(1)).unwrap().device.id, id);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_timer_removes_lease() {
        let table = table(1);
        table.reserve(Duration::from_secs(1)).unwrap();
        assert_eq!(table.live_leases().len(), 1);

        sleep(Duration::from_secs(2)).await;
        assert!(table.inner.leases.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_is_idempotent() {
        let table = table(1);
        let grant = table.reserve(Duration::from_secs(60)).unwrap();

        table.release(grant.device.id);
        table.release(grant.device.id);
        table.release(42);
        assert!(!table.is_allocated(grant.device.id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_timer_spares_newer_lease() {
        let table = table(1);
        let first = table.reserve(Duration::from_secs(1)).unwrap();
        table.release(first.device.id);

        let second = table.reserve(Duration::from_secs(10)).unwrap();
        sleep(Duration::from_secs(2)).await;

        assert!(table.is_allocated(second.device.id));
        assert_eq!(table.live_leases(), vec![second.lease]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_lease_is_held_until_released() {
        let table = table(1);
        let grant = table.reserve(Duration::MAX).unwrap();

        assert!(grant.lease.expires_at > Instant::now() + Duration::from_secs(365 * 24 * 60 * 60));
        sleep(Duration::from_secs(7 * 24 * 60 * 60)).await;
        assert!(table.is_allocated(grant.device.id));

        table.release(grant.device.id);
        assert!(!table.is_allocated(grant.device.id));
        assert!(table.reserve(Duration::MAX).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_inventory_is_never_available() {
        let table = LeaseTable::new(Vec::new());
        assert_eq!(
            table.reserve(Duration::from_secs(1)),
            Err(LeaseError::NotAvailable)
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_reservations_are_exclusive() {
        let table = table(8);
        let mut handles = Vec::new();
        for _ in 0..64 {
            let table = table.clone();
            handles.push(tokio::spawn(async move {
                table.reserve(Duration::from_secs(60)).ok().map(|g| g.device.id)
            }));
        }

        let mut granted = Vec::new();
        for h in handles {
            if let Some(id) = h.await.unwrap() {
                granted.push(id);
            }
        }

        let unique: HashSet<_> = granted.iter().collect();
        assert_eq!(granted.len(), 8);
        assert_eq!(unique.len(), 8);
    }
}
