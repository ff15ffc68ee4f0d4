// ── Bridge lifecycle events ──

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::IntoStaticStr;

use super::address::DeviceAddress;

/// Events the bridge broadcasts locally and publishes on the bus.
#[derive(Debug, Clone, PartialEq, Eq, IntoStaticStr, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum BridgeEvent {
    /// A join window opened for `duration` seconds (0 closes it).
    PairingStarted { duration: u8 },
    /// A join window elapsed.
    #[serde(rename_all = "camelCase")]
    PairingEnded { devices_found: u64 },
    DeviceDiscovered { address: DeviceAddress, name: String },
    DeviceRediscovered { address: DeviceAddress },
}

impl BridgeEvent {
    /// Event name as published on the bus.
    pub fn name(&self) -> &'static str {
        self.into()
    }

    /// Event body without the `event` tag.
    pub fn payload(&self) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or(Value::Null);
        if let Value::Object(map) = &mut value {
            map.remove("event");
        }
        value
    }
}
