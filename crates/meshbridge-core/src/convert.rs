// ── Wire ↔ domain conversion ──
//
// Normalization between raw attribute values and the fractions / units
// published on the capability bus, plus zone-status decoding. Every
// function here is pure.

use meshbridge_api::{AttributeRecord, ResponseBody, attribute};
use strum::{EnumIter, IntoEnumIterator};

use crate::capability::CapabilityKind;
use crate::error::CoreError;
use crate::model::{ChannelState, ColorState};

/// Full scale of the level attribute.
const LEVEL_SCALE: f64 = 255.0;
/// Full scale of hue and saturation. One less than the level scale.
const HUE_SAT_SCALE: f64 = 254.0;
/// Temperature is reported in hundredths of a degree.
const TEMPERATURE_SCALE: f64 = 100.0;
/// Humidity is reported in hundredths of a percent.
const HUMIDITY_SCALE: f64 = 10_000.0;

// ── Normalization ───────────────────────────────────────────────────

pub fn level_to_fraction(level: u8) -> f64 {
    f64::from(level) / LEVEL_SCALE
}

/// Floor of `fraction * 255`. Out-of-range input saturates.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::as_conversions
)]
pub fn fraction_to_level(fraction: f64) -> u8 {
    (fraction * LEVEL_SCALE).floor() as u8
}

pub fn hue_sat_to_fraction(raw: u8) -> f64 {
    f64::from(raw) / HUE_SAT_SCALE
}

/// Floor of `fraction * 254`. Out-of-range input saturates.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::as_conversions
)]
pub fn fraction_to_hue_sat(fraction: f64) -> u8 {
    (fraction * HUE_SAT_SCALE).floor() as u8
}

pub fn temperature_to_celsius(raw: i16) -> f64 {
    f64::from(raw) / TEMPERATURE_SCALE
}

pub fn humidity_to_fraction(raw: u16) -> f64 {
    f64::from(raw) / HUMIDITY_SCALE
}

// ── Zone status ─────────────────────────────────────────────────────

/// IAS zone status flags, in bit order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum ZoneFlag {
    Alarm1,
    Alarm2,
    Tamper,
    Battery,
    SupervisionReports,
    RestoreReports,
    Trouble,
    AcMains,
    Test,
    BatteryDefect,
}

impl ZoneFlag {
    fn bit(self) -> u16 {
        let index = ZoneFlag::iter().position(|f| f == self).unwrap_or_default();
        u16::try_from(index).unwrap_or_default()
    }
}

/// Decoded zone-status bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ZoneStatus(u16);

impl ZoneStatus {
    pub fn from_bits(bits: u16) -> Self {
        Self(bits)
    }

    pub fn is_set(self, flag: ZoneFlag) -> bool {
        (self.0 >> flag.bit()) & 1 == 1
    }

    /// Alarm1 drives the presence state.
    pub fn alarm1(self) -> bool {
        self.is_set(ZoneFlag::Alarm1)
    }

    pub fn active_flags(self) -> Vec<ZoneFlag> {
        ZoneFlag::iter().filter(|f| self.is_set(*f)).collect()
    }
}

// ── Response / report decoding ──────────────────────────────────────

/// Turn a get-request response into the channel's normalized state.
pub fn state_from_response(
    kind: CapabilityKind,
    body: ResponseBody,
) -> Result<ChannelState, CoreError> {
    let state = match (kind, body) {
        (CapabilityKind::OnOff, ResponseBody::OnOff(on)) => ChannelState::OnOff(on),
        (CapabilityKind::Brightness, ResponseBody::Level(level)) => {
            ChannelState::Brightness(level_to_fraction(level))
        }
        (CapabilityKind::Color, ResponseBody::Color { hue, saturation }) => ChannelState::Color(
            ColorState::hue(hue_sat_to_fraction(hue), hue_sat_to_fraction(saturation)),
        ),
        (CapabilityKind::Temperature, ResponseBody::Temperature(raw)) => {
            ChannelState::Temperature(temperature_to_celsius(raw))
        }
        (CapabilityKind::Humidity, ResponseBody::Humidity(raw)) => {
            ChannelState::Humidity(humidity_to_fraction(raw))
        }
        (CapabilityKind::Power, ResponseBody::Power(raw)) => ChannelState::Power(i64::from(raw)),
        (kind, body) => {
            return Err(CoreError::Protocol {
                message: format!("{} response to a {kind} fetch", body.kind()),
            });
        }
    };
    Ok(state)
}

/// Turn a pushed attribute report into the channel's normalized state.
///
/// Returns `None` when the report carries nothing this kind understands.
pub fn state_from_report(
    kind: CapabilityKind,
    records: &[AttributeRecord],
) -> Option<ChannelState> {
    let find = |id: u16| {
        records
            .iter()
            .find(|r| r.attribute_id == id)
            .map(|r| &r.value)
    };
    match kind {
        CapabilityKind::OnOff => find(attribute::ON_OFF)?
            .as_bool()
            .map(ChannelState::OnOff),
        CapabilityKind::Temperature => {
            let raw = i16::try_from(find(attribute::MEASURED_VALUE)?.as_i64()?).ok()?;
            Some(ChannelState::Temperature(temperature_to_celsius(raw)))
        }
        CapabilityKind::Humidity => {
            let raw = u16::try_from(find(attribute::MEASURED_VALUE)?.as_i64()?).ok()?;
            Some(ChannelState::Humidity(humidity_to_fraction(raw)))
        }
        CapabilityKind::Power => find(attribute::INSTANTANEOUS_DEMAND)?
            .as_i64()
            .map(ChannelState::Power),
        CapabilityKind::Brightness
        | CapabilityKind::Color
        | CapabilityKind::Presence
        | CapabilityKind::Button => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use meshbridge_api::AttributeValue;

    use super::*;

    #[test]
    fn level_round_trip_is_exact_on_wire_values() {
        for level in 0..=u8::MAX {
            assert_eq!(fraction_to_level(level_to_fraction(level)), level);
        }
    }

    #[test]
    fn hue_sat_round_trip_below_full_scale() {
        for raw in 0..=254u8 {
            assert_eq!(fraction_to_hue_sat(hue_sat_to_fraction(raw)), raw);
        }
    }

    #[test]
    fn denormalization_floors() {
        assert_eq!(fraction_to_level(0.5), 127);
        assert_eq!(fraction_to_level(1.0), 255);
        assert_eq!(fraction_to_level(0.0), 0);
        assert_eq!(fraction_to_hue_sat(0.5), 127);
        assert_eq!(fraction_to_hue_sat(1.0), 254);
    }

    #[test]
    fn sensor_scales() {
        assert!((temperature_to_celsius(2150) - 21.5).abs() < f64::EPSILON);
        assert!((temperature_to_celsius(-500) + 5.0).abs() < f64::EPSILON);
        assert!((humidity_to_fraction(4500) - 0.45).abs() < 1e-9);
    }

    #[test]
    fn zone_status_decodes_by_bit_position() {
        let status = ZoneStatus::from_bits(0b0000_0000_0000_0101);
        assert!(status.alarm1());
        assert!(status.is_set(ZoneFlag::Tamper));
        assert!(!status.is_set(ZoneFlag::Alarm2));
        assert_eq!(status.active_flags(), vec![ZoneFlag::Alarm1, ZoneFlag::Tamper]);
        assert!(!ZoneStatus::from_bits(0b1000).alarm1());
        assert_eq!(ZoneFlag::BatteryDefect.bit(), 9);
    }

    #[test]
    fn mismatched_response_is_protocol_error() {
        let err = state_from_response(CapabilityKind::OnOff, ResponseBody::Level(3)).unwrap_err();
        assert!(err.is_protocol());
    }

    #[test]
    fn color_response_normalizes_both_components() {
        let state = state_from_response(
            CapabilityKind::Color,
            ResponseBody::Color {
                hue: 127,
                saturation: 254,
            },
        )
        .unwrap();
        assert_eq!(state, ChannelState::Color(ColorState::hue(0.5, 1.0)));
    }

    #[test]
    fn reports_decode_per_kind() {
        let records = vec![AttributeRecord {
            attribute_id: attribute::MEASURED_VALUE,
            value: AttributeValue::I16(1850),
        }];
        assert_eq!(
            state_from_report(CapabilityKind::Temperature, &records),
            Some(ChannelState::Temperature(18.5))
        );
        assert_eq!(state_from_report(CapabilityKind::OnOff, &records), None);

        let power = vec![AttributeRecord {
            attribute_id: attribute::INSTANTANEOUS_DEMAND,
            value: AttributeValue::I32(-12),
        }];
        assert_eq!(
            state_from_report(CapabilityKind::Power, &power),
            Some(ChannelState::Power(-12))
        );
    }
}
