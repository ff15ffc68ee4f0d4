// ── Normalized channel state ──
//
// Everything that crosses the capability bus is normalized: fractions in
// 0.0..=1.0 for brightness, hue, saturation and humidity, degrees Celsius
// for temperature, raw integers for power.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use strum::{Display, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum ColorMode {
    Hue,
    Xy,
    Temperature,
}

/// Color as exchanged on the bus. Only hue mode is settable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorState {
    pub mode: ColorMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hue: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saturation: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

impl ColorState {
    pub fn hue(hue: f64, saturation: f64) -> Self {
        Self {
            mode: ColorMode::Hue,
            hue: Some(hue),
            saturation: Some(saturation),
            x: None,
            y: None,
            temperature: None,
        }
    }
}

/// Last-known normalized state of one channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelState {
    OnOff(bool),
    Brightness(f64),
    Color(ColorState),
    Temperature(f64),
    Humidity(f64),
    Power(i64),
    Presence(bool),
}

impl ChannelState {
    /// Payload of the `state` event published on the bus.
    pub fn to_payload(&self) -> Value {
        match self {
            Self::OnOff(on) | Self::Presence(on) => json!(on),
            Self::Brightness(level) => json!(level),
            Self::Color(color) => json!(color),
            Self::Temperature(value) | Self::Humidity(value) => json!({ "value": value }),
            Self::Power(value) => json!({ "value": value }),
        }
    }
}

/// A "set many properties" request for the batch channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BatchState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_off: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brightness: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<ColorState>,
}

impl BatchState {
    pub fn is_empty(&self) -> bool {
        self.on_off.is_none() && self.brightness.is_none() && self.color.is_none()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn payload_shapes() {
        assert_eq!(ChannelState::OnOff(true).to_payload(), json!(true));
        assert_eq!(ChannelState::Brightness(0.5).to_payload(), json!(0.5));
        assert_eq!(
            ChannelState::Temperature(21.5).to_payload(),
            json!({ "value": 21.5 })
        );
        assert_eq!(ChannelState::Power(42).to_payload(), json!({ "value": 42 }));
        assert_eq!(
            ChannelState::Color(ColorState::hue(0.25, 1.0)).to_payload(),
            json!({ "mode": "hue", "hue": 0.25, "saturation": 1.0 })
        );
    }

    #[test]
    fn batch_state_uses_kebab_case_keys() {
        let batch: BatchState =
            serde_json::from_value(json!({ "on-off": true, "brightness": 0.3 })).unwrap();
        assert_eq!(batch.on_off, Some(true));
        assert_eq!(batch.brightness, Some(0.3));
        assert!(batch.color.is_none());
        assert!(!batch.is_empty());
        assert!(BatchState::default().is_empty());
    }

    #[test]
    fn color_mode_parses_case_insensitively() {
        assert_eq!("Hue".parse::<ColorMode>().unwrap(), ColorMode::Hue);
        assert_eq!(ColorMode::Xy.to_string(), "xy");
    }
}
