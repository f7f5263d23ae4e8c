//! Core types shared by every fleetlease crate.
//!
//! A node owns a fixed set of [`Device`]s discovered once at startup through a
//! [`DeviceInventory`]. Peers are told apart by [`PeerId`], and every network
//! request carries a fresh [`Token`] so that fulfillments can be matched back
//! to the request that caused them.

mod device;
mod identity;
pub mod inventory;

pub use device::{Device, DeviceId};
pub use identity::{PeerId, RequestKey, Token};
pub use inventory::{DeviceInventory, InventoryError, NvidiaSmiInventory, StaticInventory};
