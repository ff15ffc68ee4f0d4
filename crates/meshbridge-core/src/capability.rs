// ── Capability descriptor ──
//
// Static mapping from (cluster, direction) to the capability channel a
// device exposes for it. Classification is pure: the same endpoint always
// yields the same capabilities, in table order.

use meshbridge_api::{AttributeReportConfig, ZclDataType, attribute, cluster};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use crate::model::{EndpointDescriptor, ThingType};

/// Home-automation profile.
pub const PROFILE_HOME_AUTOMATION: u16 = 0x0104;
/// Light-link profile.
pub const PROFILE_LIGHT_LINK: u16 = 0xC05E;

/// Which cluster list of an endpoint a capability comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Server cluster: the device holds the attribute state.
    Input,
    /// Client cluster: the device sends commands (buttons, remotes).
    Output,
}

/// Kind of capability channel.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, Serialize, Deserialize,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum CapabilityKind {
    OnOff,
    Brightness,
    Color,
    Temperature,
    Humidity,
    Power,
    Presence,
    Button,
}

impl CapabilityKind {
    /// Protocol name the channel is exported under.
    pub fn protocol(self) -> &'static str {
        match self {
            Self::OnOff => "on-off",
            Self::Brightness => "brightness",
            Self::Color => "color",
            Self::Temperature => "temperature",
            Self::Humidity => "humidity",
            Self::Power => "power",
            Self::Presence => "presence",
            Self::Button => "button-momentary",
        }
    }

    /// Inbound methods accepted on the bus.
    pub fn methods(self) -> &'static [&'static str] {
        match self {
            Self::OnOff => &["turnOn", "turnOff", "set", "toggle"],
            Self::Brightness | Self::Color => &["set"],
            Self::Temperature | Self::Humidity | Self::Power | Self::Presence | Self::Button => &[],
        }
    }

    /// Outbound events published on the bus.
    pub fn events(self) -> &'static [&'static str] {
        match self {
            Self::Button => &["pressed"],
            _ => &["state"],
        }
    }

    /// Whether the channel's state is fetched on the poll interval.
    /// Presence and buttons are purely event driven.
    pub fn is_polled(self) -> bool {
        !matches!(self, Self::Presence | Self::Button)
    }

    /// Attribute-reporting configuration, for kinds that support it.
    pub fn reporting(self) -> Option<AttributeReportConfig> {
        let (attribute_id, data_type, min, reportable_change) = match self {
            Self::OnOff => (attribute::ON_OFF, ZclDataType::Boolean, 1, None),
            Self::Power => (attribute::INSTANTANEOUS_DEMAND, ZclDataType::Int24, 1, Some(1)),
            Self::Temperature => (attribute::MEASURED_VALUE, ZclDataType::Int16, 10, Some(1)),
            Self::Humidity => (attribute::MEASURED_VALUE, ZclDataType::Uint16, 10, Some(1)),
            Self::Brightness | Self::Color | Self::Presence | Self::Button => return None,
        };
        Some(AttributeReportConfig {
            attribute_id,
            data_type,
            min_interval_secs: min,
            max_interval_secs: 120,
            reportable_change,
        })
    }

    /// Kinds a batch channel can drive.
    pub fn is_batchable(self) -> bool {
        matches!(self, Self::OnOff | Self::Brightness | Self::Color)
    }
}

/// One capability of one endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Capability {
    pub cluster: u16,
    pub direction: Direction,
    pub kind: CapabilityKind,
}

impl Capability {
    /// Channel id: `"{endpoint}-{cluster}"` with a decimal cluster id,
    /// suffixed `-in`/`-out` when the cluster maps in both directions.
    pub fn channel_id(&self, endpoint_id: u8) -> String {
        let base = format!("{endpoint_id}-{}", self.cluster);
        if maps_both_directions(self.cluster) {
            match self.direction {
                Direction::Input => format!("{base}-in"),
                Direction::Output => format!("{base}-out"),
            }
        } else {
            base
        }
    }
}

/// Channel id of the per-device batch channel.
pub const BATCH_CHANNEL_ID: &str = "batch";

// ── Static table ────────────────────────────────────────────────────

const TABLE: &[Capability] = &[
    Capability {
        cluster: cluster::ON_OFF,
        direction: Direction::Input,
        kind: CapabilityKind::OnOff,
    },
    Capability {
        cluster: cluster::LEVEL_CONTROL,
        direction: Direction::Input,
        kind: CapabilityKind::Brightness,
    },
    Capability {
        cluster: cluster::COLOR_CONTROL,
        direction: Direction::Input,
        kind: CapabilityKind::Color,
    },
    Capability {
        cluster: cluster::TEMPERATURE_MEASUREMENT,
        direction: Direction::Input,
        kind: CapabilityKind::Temperature,
    },
    Capability {
        cluster: cluster::RELATIVE_HUMIDITY,
        direction: Direction::Input,
        kind: CapabilityKind::Humidity,
    },
    Capability {
        cluster: cluster::IAS_ZONE,
        direction: Direction::Input,
        kind: CapabilityKind::Presence,
    },
    Capability {
        cluster: cluster::SIMPLE_METERING,
        direction: Direction::Input,
        kind: CapabilityKind::Power,
    },
    Capability {
        cluster: cluster::ON_OFF,
        direction: Direction::Output,
        kind: CapabilityKind::Button,
    },
];

fn maps_both_directions(cluster_id: u16) -> bool {
    let mut directions = TABLE
        .iter()
        .filter(|c| c.cluster == cluster_id)
        .map(|c| c.direction);
    directions.clone().any(|d| d == Direction::Input) && directions.any(|d| d == Direction::Output)
}

/// Capabilities exposed by one endpoint, in table order. Repeated
/// cluster ids in the descriptor yield a single capability.
pub fn classify(endpoint: &EndpointDescriptor) -> Vec<Capability> {
    TABLE
        .iter()
        .filter(|cap| {
            let clusters = match cap.direction {
                Direction::Input => &endpoint.input_clusters,
                Direction::Output => &endpoint.output_clusters,
            };
            clusters.contains(&cap.cluster)
        })
        .copied()
        .collect()
}

/// Display tag for an endpoint, from profile + device type.
pub fn thing_type(endpoint: &EndpointDescriptor) -> Option<ThingType> {
    match (endpoint.profile_id, endpoint.device_type) {
        (PROFILE_HOME_AUTOMATION, 0x0100..=0x0102 | 0x010C | 0x010D)
        | (PROFILE_LIGHT_LINK, 0x0000..=0x0220) => Some(ThingType::Light),
        (PROFILE_HOME_AUTOMATION, 0x0009 | 0x000A | 0x0051) => Some(ThingType::Socket),
        (PROFILE_HOME_AUTOMATION, 0x0000..=0x0006 | 0x0103..=0x0105 | 0x0820) => {
            Some(ThingType::Switch)
        }
        (PROFILE_HOME_AUTOMATION, 0x0106 | 0x0107 | 0x0302 | 0x0402 | 0x0053) => {
            Some(ThingType::Sensor)
        }
        _ => None,
    }
}

/// Thing type of a whole device: the first endpoint that has one.
pub fn device_thing_type(endpoints: &[EndpointDescriptor]) -> Option<ThingType> {
    endpoints.iter().find_map(thing_type)
}
