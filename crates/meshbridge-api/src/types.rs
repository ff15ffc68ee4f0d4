// ── Wire-level types ──
//
// Descriptors, requests and responses exchanged with the network
// processor's network-manager and gateway services. The core engine
// converts these into its own domain types and never leaks them
// onto the capability bus.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

use crate::error::Error;

// ── Addressing ──────────────────────────────────────────────────────

/// Raw 64-bit IEEE address of a mesh node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IeeeAddress(pub u64);

impl fmt::Display for IeeeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016X}", self.0)
    }
}

impl FromStr for IeeeAddress {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        u64::from_str_radix(digits, 16).map(Self)
    }
}

/// Unicast destination of a gateway request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Destination {
    pub address: IeeeAddress,
    pub endpoint: u8,
}

impl Destination {
    pub fn new(address: IeeeAddress, endpoint: u8) -> Self {
        Self { address, endpoint }
    }
}

// ── Cluster / attribute ids ─────────────────────────────────────────

/// Cluster ids of the home-automation profile used by the bridge.
pub mod cluster {
    pub const BASIC: u16 = 0x0000;
    pub const ON_OFF: u16 = 0x0006;
    pub const LEVEL_CONTROL: u16 = 0x0008;
    pub const COLOR_CONTROL: u16 = 0x0300;
    pub const TEMPERATURE_MEASUREMENT: u16 = 0x0402;
    pub const RELATIVE_HUMIDITY: u16 = 0x0405;
    pub const IAS_ZONE: u16 = 0x0500;
    pub const SIMPLE_METERING: u16 = 0x0702;
}

/// Attribute ids, grouped by cluster.
pub mod attribute {
    pub const BASIC_MANUFACTURER_NAME: u16 = 0x0004;
    pub const BASIC_MODEL_IDENTIFIER: u16 = 0x0005;
    pub const ON_OFF: u16 = 0x0000;
    pub const CURRENT_LEVEL: u16 = 0x0000;
    pub const CURRENT_HUE: u16 = 0x0000;
    pub const CURRENT_SATURATION: u16 = 0x0001;
    pub const MEASURED_VALUE: u16 = 0x0000;
    pub const ZONE_STATUS: u16 = 0x0002;
    pub const INSTANTANEOUS_DEMAND: u16 = 0x0400;
}

// ── Descriptors ─────────────────────────────────────────────────────

/// Endpoint description as enumerated by the network manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimpleDescriptor {
    pub endpoint_id: u8,
    pub profile_id: u16,
    pub device_id: u16,
    #[serde(default)]
    pub input_clusters: Vec<u16>,
    #[serde(default)]
    pub output_clusters: Vec<u16>,
}

/// A device as announced by the network manager, on join or when the
/// device list is re-fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NwkDeviceInfo {
    pub ieee_address: IeeeAddress,
    pub network_address: u16,
    pub simple_descriptors: Vec<SimpleDescriptor>,
}

// ── Status / data types ─────────────────────────────────────────────

/// Status code carried by every gateway confirmation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Success,
    Failure,
    Busy,
    InvalidParameter,
    UnsupportedAttribute,
    Timeout,
}

/// Attribute data types used when configuring reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
pub enum ZclDataType {
    Boolean,
    Uint8,
    Uint16,
    Int16,
    Int24,
    CharString,
}

impl ZclDataType {
    /// On-air type code.
    pub fn code(self) -> u8 {
        match self {
            Self::Boolean => 0x10,
            Self::Uint8 => 0x20,
            Self::Uint16 => 0x21,
            Self::Int16 => 0x29,
            Self::Int24 => 0x2a,
            Self::CharString => 0x42,
        }
    }
}

/// A decoded attribute value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttributeValue {
    Bool(bool),
    U8(u8),
    U16(u16),
    I16(i16),
    I32(i32),
    Text(String),
}

impl AttributeValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Any integer-typed value, widened.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::U8(v) => Some(i64::from(*v)),
            Self::U16(v) => Some(i64::from(*v)),
            Self::I16(v) => Some(i64::from(*v)),
            Self::I32(v) => Some(i64::from(*v)),
            Self::Bool(_) | Self::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeRecord {
    pub attribute_id: u16,
    pub value: AttributeValue,
}

/// One attribute's reporting configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeReportConfig {
    pub attribute_id: u16,
    pub data_type: ZclDataType,
    pub min_interval_secs: u16,
    pub max_interval_secs: u16,
    /// Minimum change that triggers a report. Numeric attributes only.
    pub reportable_change: Option<u32>,
}

// ── Requests ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
pub enum OnOffCommand {
    On,
    Off,
    Toggle,
}

/// A gateway request. Every variant is unicast to one endpoint.
#[derive(Debug, Clone, PartialEq, Eq, IntoStaticStr, Serialize, Deserialize)]
pub enum Request {
    SetAttributeReporting {
        dst: Destination,
        cluster: u16,
        reports: Vec<AttributeReportConfig>,
    },
    ReadAttributes {
        dst: Destination,
        cluster: u16,
        attributes: Vec<u16>,
    },
    GetOnOff {
        dst: Destination,
    },
    SetOnOff {
        dst: Destination,
        command: OnOffCommand,
    },
    GetLevel {
        dst: Destination,
    },
    SetLevel {
        dst: Destination,
        level: u8,
        transition_time: u16,
    },
    GetColor {
        dst: Destination,
    },
    SetColor {
        dst: Destination,
        hue: u8,
        saturation: u8,
    },
    GetTemperature {
        dst: Destination,
    },
    GetHumidity {
        dst: Destination,
    },
    GetPower {
        dst: Destination,
    },
}

impl Request {
    /// Variant name, used in logs and errors.
    pub fn name(&self) -> &'static str {
        self.into()
    }

    pub fn destination(&self) -> Destination {
        match self {
            Self::SetAttributeReporting { dst, .. }
            | Self::ReadAttributes { dst, .. }
            | Self::GetOnOff { dst }
            | Self::SetOnOff { dst, .. }
            | Self::GetLevel { dst }
            | Self::SetLevel { dst, .. }
            | Self::GetColor { dst }
            | Self::SetColor { dst, .. }
            | Self::GetTemperature { dst }
            | Self::GetHumidity { dst }
            | Self::GetPower { dst } => *dst,
        }
    }
}

// ── Responses ───────────────────────────────────────────────────────

/// Payload of a gateway confirmation.
#[derive(Debug, Clone, PartialEq, Eq, IntoStaticStr, Serialize, Deserialize)]
pub enum ResponseBody {
    Ack,
    Attributes(Vec<AttributeRecord>),
    OnOff(bool),
    Level(u8),
    Color { hue: u8, saturation: u8 },
    Temperature(i16),
    Humidity(u16),
    Power(i32),
}

impl ResponseBody {
    pub fn kind(&self) -> &'static str {
        self.into()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub status: Status,
    pub body: ResponseBody,
}

impl Response {
    pub fn ok(body: ResponseBody) -> Self {
        Self {
            status: Status::Success,
            body,
        }
    }

    pub fn with_status(status: Status) -> Self {
        Self {
            status,
            body: ResponseBody::Ack,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    /// Check the status, yielding the body on success.
    pub fn into_result(self, request: &'static str) -> Result<ResponseBody, Error> {
        if self.is_success() {
            Ok(self.body)
        } else {
            Err(Error::Status {
                request,
                status: self.status,
            })
        }
    }
}

// ── Bindings / events ───────────────────────────────────────────────

/// Bind a source endpoint's cluster to a destination endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    pub source: Destination,
    pub cluster: u16,
    pub target: Destination,
}

/// A command received on a cluster bound to the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundClusterEvent {
    pub source: IeeeAddress,
    pub endpoint: u8,
    pub cluster: u16,
    pub command_id: u8,
}

/// IAS zone status change notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneStateEvent {
    pub source: IeeeAddress,
    pub endpoint: u8,
    pub zone_status: u16,
}

/// Pushed attribute report from a device with reporting configured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeReport {
    pub source: IeeeAddress,
    pub endpoint: u8,
    pub cluster: u16,
    pub records: Vec<AttributeRecord>,
}
