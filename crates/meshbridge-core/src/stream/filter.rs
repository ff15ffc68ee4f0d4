// ── Filter predicates for device streams ──

use crate::capability::CapabilityKind;
use crate::model::{Device, ThingType};

/// Filter predicate for device snapshots.
pub enum DeviceFilter {
    All,
    ByThingType(ThingType),
    WithCapability(CapabilityKind),
    /// Devices that expose a batch channel.
    Batchable,
    Custom(Box<dyn Fn(&Device) -> bool + Send + Sync>),
}

impl DeviceFilter {
    pub fn matches(&self, device: &Device) -> bool {
        match self {
            Self::All => true,
            Self::ByThingType(tt) => device.thing_type == Some(*tt),
            Self::WithCapability(kind) => device.has_channel(*kind),
            Self::Batchable => {
                device.has_channel(CapabilityKind::Brightness)
                    || device.has_channel(CapabilityKind::Color)
            }
            Self::Custom(f) => f(device),
        }
    }
}
