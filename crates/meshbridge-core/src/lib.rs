//! Device capability composition and synchronization engine.
//!
//! Bridges the device registry of a mesh network stack to a capability
//! bus:
//!
//! - **[`Bridge`]**: lifecycle facade. [`start()`](Bridge::start)
//!   subscribes to device announcements, asks the network for its device
//!   list and opens the join-on-start window. Each announcement is run
//!   through the discovery pipeline on its own task.
//!
//! - **[`capability`]**: static table mapping `(cluster, direction)` to a
//!   [`CapabilityKind`], plus the thing-type tag used for naming.
//!
//! - **[`ChannelRuntime`]**: one per capability. Configures attribute
//!   reporting, exports itself on the bus and keeps its normalized state
//!   fresh through polling, pushed reports and inbound commands.
//!
//! - **[`BatchGroup`]**: the `batch` channel that fans one update out to a
//!   device's on/off, brightness and color channels.
//!
//! - **[`DeviceRegistry`]**: one record per address with a serialized
//!   per-address entry API; publishes reactive [`DeviceStream`] snapshots.
//!
//! - **[`CapabilityBus`]**: the trait consumers implement to carry exports,
//!   state events and inbound calls.

pub mod bus;
pub mod capability;
pub mod channel;
pub mod command;
pub mod config;
pub mod controller;
pub mod convert;
pub mod discovery;
pub mod error;
pub mod model;
pub mod pairing;
pub mod store;
pub mod stream;

mod services;

// ── Primary re-exports ──────────────────────────────────────────────
pub use bus::{CapabilityBus, ChannelExport, DeviceExport, InboundCall};
pub use capability::{Capability, CapabilityKind, Direction};
pub use channel::batch::BatchGroup;
pub use channel::{ChannelRuntime, Lifecycle};
pub use command::Command;
pub use config::BridgeConfig;
pub use controller::{Bridge, BridgeState};
pub use discovery::DiscoveryOutcome;
pub use error::{BatchFailure, CoreError};
pub use store::{DeviceHandle, DeviceRecord, DeviceRegistry, Identity};
pub use stream::{DeviceFilter, DeviceStream};

pub use model::{
    BatchState, BridgeEvent, ChannelState, ChannelSummary, ColorMode, ColorState, Device,
    DeviceAddress, EndpointDescriptor, ThingType,
};
