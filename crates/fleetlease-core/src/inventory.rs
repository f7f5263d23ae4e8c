//! Device inventory providers.
//!
//! The inventory is read exactly once, when a node starts. Enumeration
//! failures are never fatal: a node that cannot see its hardware simply joins
//! the fleet with nothing to lend.

use crate::device::{Device, DeviceId};
use std::process::Command;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("failed to run `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{program}` exited with {status}")]
    Status { program: String, status: String },

    #[error("unparseable inventory line {line:?}: {reason}")]
    Parse { line: String, reason: &'static str },
}

/// Source of the leasable devices attached to this node.
pub trait DeviceInventory {
    fn list(&self) -> Result<Vec<Device>, InventoryError>;
}

/// Lists the devices of `provider`, falling back to an empty inventory.
pub fn discover(provider: &dyn DeviceInventory) -> Vec<Device> {
    match provider.list() {
        Ok(devices) => {
            tracing::info!(count = devices.len(), "device inventory discovered");
            devices
        }
        Err(e) => {
            tracing::warn!(error = %e, "device discovery failed, starting with an empty inventory");
            Vec::new()
        }
    }
}

/// A fixed device list, for configuration-driven nodes and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticInventory {
    devices: Vec<Device>,
}

impl StaticInventory {
    pub fn new(devices: Vec<Device>) -> Self {
        Self { devices }
    }

    /// `count` identical anonymous devices owned by `address`.
    pub fn uniform(address: &str, name: &str, count: u32) -> Self {
        Self::new(
            (0..count)
                .map(|id| Device::new(id, address, name))
                .collect(),
        )
    }
}

impl DeviceInventory for StaticInventory {
    fn list(&self) -> Result<Vec<Device>, InventoryError> {
        Ok(self.devices.clone())
    }
}

/// Enumerates NVIDIA GPUs through `nvidia-smi`.
#[derive(Debug, Clone)]
pub struct NvidiaSmiInventory {
    address: String,
    program: String,
}

const QUERY_ARGS: [&str; 2] = [
    "--query-gpu=index,name,clocks.max.sm,memory.total",
    "--format=csv,noheader,nounits",
];

impl NvidiaSmiInventory {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            program: "nvidia-smi".into(),
        }
    }

    /// Overrides the binary that is executed.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Parses `index, name, clock MHz, memory MiB` rows.
    pub fn parse(address: &str, output: &str) -> Result<Vec<Device>, InventoryError> {
        output
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| parse_line(address, line))
            .collect()
    }
}

fn parse_line(address: &str, line: &str) -> Result<Device, InventoryError> {
    let bad = |reason| InventoryError::Parse {
        line: line.to_string(),
        reason,
    };

    let parts: Vec<&str> = line.split(',').map(str::trim).collect();
    let [index, name, clock_mhz, memory_mib] = parts.as_slice() else {
        return Err(bad("expected 4 columns"));
    };

    let id: DeviceId = index.parse().map_err(|_| bad("bad index"))?;
    // Unsupported attributes are reported as "[N/A]".
    let clock_mhz: u64 = clock_mhz.parse().unwrap_or(0);
    let memory_mib: u64 = memory_mib.parse().unwrap_or(0);

    Ok(Device::new(id, address, *name)
        .with_clock_rate_hz(clock_mhz * 1_000_000)
        .with_memory_bytes(memory_mib * 1024 * 1024))
}

impl DeviceInventory for NvidiaSmiInventory {
    fn list(&self) -> Result<Vec<Device>, InventoryError> {
        let output = Command::new(&self.program)
            .args(QUERY_ARGS)
            .output()
            .map_err(|source| InventoryError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(InventoryError::Status {
                program: self.program.clone(),
                status: output.status.to_string(),
            });
        }

        Self::parse(&self.address, &String::from_utf8_lossy(&output.stdout))
    }
}
