// ── Device domain types ──

use chrono::{DateTime, Utc};
use meshbridge_api::SimpleDescriptor;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::address::DeviceAddress;
use crate::capability::CapabilityKind;

/// One endpoint of a device: its profile, device type and cluster lists.
///
/// Replaced wholesale when the device is rediscovered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointDescriptor {
    pub endpoint_id: u8,
    pub profile_id: u16,
    pub device_type: u16,
    pub input_clusters: Vec<u16>,
    pub output_clusters: Vec<u16>,
}

impl From<SimpleDescriptor> for EndpointDescriptor {
    fn from(d: SimpleDescriptor) -> Self {
        Self {
            endpoint_id: d.endpoint_id,
            profile_id: d.profile_id,
            device_type: d.device_id,
            input_clusters: d.input_clusters,
            output_clusters: d.output_clusters,
        }
    }
}

/// Semantic display tag derived from profile + device type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ThingType {
    Light,
    Socket,
    Sensor,
    Switch,
}

/// A channel as seen from outside the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSummary {
    pub id: String,
    pub kind: CapabilityKind,
    pub protocol: String,
}

/// Point-in-time view of a registered device, published in snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub address: DeviceAddress,
    pub name: String,
    pub manufacturer: String,
    pub model: String,
    pub thing_type: Option<ThingType>,
    pub endpoints: Vec<EndpointDescriptor>,
    pub channels: Vec<ChannelSummary>,
    pub discovered_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

impl Device {
    pub fn natural_id(&self) -> String {
        self.address.natural_id()
    }

    pub fn has_channel(&self, kind: CapabilityKind) -> bool {
        self.channels.iter().any(|c| c.kind == kind)
    }
}
