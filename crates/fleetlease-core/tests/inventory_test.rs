use fleetlease_core::inventory::discover;
use fleetlease_core::{Device, DeviceInventory, InventoryError, NvidiaSmiInventory, StaticInventory};

#[cfg(unix)]
#[test]
fn test_failing_tool_reports_exit_status() {
    let provider = NvidiaSmiInventory::new("node-a").with_program("false");
    assert!(matches!(provider.list(), Err(InventoryError::Status { .. })));
    assert!(discover(&provider).is_empty());
}

#[cfg(unix)]
#[test]
fn test_unexpected_tool_output_is_a_parse_error() {
    // `echo` prints the query arguments back, which is not a device row.
    let provider = NvidiaSmiInventory::new("node-a").with_program("echo");
    assert!(matches!(provider.list(), Err(InventoryError::Parse { .. })));
}

#[test]
fn test_discover_passes_devices_through() {
    let devices = vec![
        Device::new(3, "node-b", "RTX 4090").with_memory_bytes(24 << 30),
        Device::new(1, "node-b", "RTX 4090").with_memory_bytes(24 << 30),
    ];
    let found = discover(&StaticInventory::new(devices.clone()));
    assert_eq!(found, devices);
}
