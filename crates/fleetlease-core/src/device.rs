use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a device, unique within the node that owns it.
pub type DeviceId = u32;

/// A leasable accelerator attached to a node.
///
/// Devices are immutable after discovery. Two nodes may both own a device with
/// id `0`; the id is only meaningful together with the node's `address`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    /// Address of the node that owns the device, as announced to peers.
    pub address: String,
    pub name: String,
    pub clock_rate_hz: u64,
    pub memory_bytes: u64,
}

impl Device {
    pub fn new(id: DeviceId, address: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id,
            address: address.into(),
            name: name.into(),
            clock_rate_hz: 0,
            memory_bytes: 0,
        }
    }

    pub fn with_clock_rate_hz(mut self, hz: u64) -> Self {
        self.clock_rate_hz = hz;
        self
    }

    pub fn with_memory_bytes(mut self, bytes: u64) -> Self {
        self.memory_bytes = bytes;
        self
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{} ({})", self.address, self.id, self.name)
    }
}
