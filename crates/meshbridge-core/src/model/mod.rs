// ── Domain model ──
//
// Canonical types the engine works with. Wire types from `meshbridge-api`
// are converted into these at the boundary and never reach the bus.

pub mod address;
pub mod device;
pub mod event;
pub mod state;

// ── Re-exports ──────────────────────────────────────────────────────

pub use address::DeviceAddress;
pub use device::{ChannelSummary, Device, EndpointDescriptor, ThingType};
pub use event::BridgeEvent;
pub use state::{BatchState, ChannelState, ColorMode, ColorState};
