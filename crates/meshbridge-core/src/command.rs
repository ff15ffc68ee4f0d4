// ── Inbound command API ──
//
// Bus calls arrive as a method name plus JSON params. They are parsed
// into a typed `Command` before reaching a channel, so bad input is
// rejected before anything is sent to the network.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::capability::CapabilityKind;
use crate::error::CoreError;
use crate::model::{BatchState, ColorState};

/// Protocol name of the batch channel.
pub const BATCH_PROTOCOL: &str = "core/batching";
/// The one method of the batch channel.
pub const BATCH_METHOD: &str = "setBatch";

/// A typed write operation against one channel or the batch channel.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    TurnOn,
    TurnOff,
    Toggle,
    SetOnOff(bool),
    SetBrightness(f64),
    SetColor(ColorState),
    SetBatch(BatchState),
}

impl Command {
    /// Parse a call addressed to a channel of `kind`.
    pub fn parse(kind: CapabilityKind, method: &str, params: &Value) -> Result<Self, CoreError> {
        match (kind, method) {
            (CapabilityKind::OnOff, "turnOn") => Ok(Self::TurnOn),
            (CapabilityKind::OnOff, "turnOff") => Ok(Self::TurnOff),
            (CapabilityKind::OnOff, "toggle") => Ok(Self::Toggle),
            (CapabilityKind::OnOff, "set") => first_param(method, params).map(Self::SetOnOff),
            (CapabilityKind::Brightness, "set") => {
                first_param(method, params).map(Self::SetBrightness)
            }
            (CapabilityKind::Color, "set") => first_param(method, params).map(Self::SetColor),
            _ => Err(CoreError::UnknownMethod {
                protocol: kind.protocol(),
                method: method.to_owned(),
            }),
        }
    }

    /// Parse a call addressed to a batch channel.
    pub fn parse_batch(method: &str, params: &Value) -> Result<Self, CoreError> {
        if method == BATCH_METHOD {
            first_param(method, params).map(Self::SetBatch)
        } else {
            Err(CoreError::UnknownMethod {
                protocol: BATCH_PROTOCOL,
                method: method.to_owned(),
            })
        }
    }
}

/// JSON-RPC style params: either a positional array (first element is
/// used) or a bare value.
fn first_param<T: DeserializeOwned>(method: &str, params: &Value) -> Result<T, CoreError> {
    let value = match params {
        Value::Array(items) => items.first().ok_or_else(|| CoreError::InvalidParams {
            method: method.to_owned(),
            message: "expected one parameter, got none".into(),
        })?,
        other => other,
    };
    serde_json::from_value(value.clone()).map_err(|e| CoreError::InvalidParams {
        method: method.to_owned(),
        message: e.to_string(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::model::ColorMode;

    #[test]
    fn on_off_methods() {
        let kind = CapabilityKind::OnOff;
        assert_eq!(
            Command::parse(kind, "turnOn", &Value::Null).unwrap(),
            Command::TurnOn
        );
        assert_eq!(
            Command::parse(kind, "toggle", &json!([])).unwrap(),
            Command::Toggle
        );
        assert_eq!(
            Command::parse(kind, "set", &json!([false])).unwrap(),
            Command::SetOnOff(false)
        );
    }

    #[test]
    fn positional_and_bare_params() {
        let kind = CapabilityKind::Brightness;
        assert_eq!(
            Command::parse(kind, "set", &json!([0.25])).unwrap(),
            Command::SetBrightness(0.25)
        );
        assert_eq!(
            Command::parse(kind, "set", &json!(0.75)).unwrap(),
            Command::SetBrightness(0.75)
        );
    }

    #[test]
    fn color_params_deserialize() {
        let cmd = Command::parse(
            CapabilityKind::Color,
            "set",
            &json!([{ "mode": "hue", "hue": 0.1, "saturation": 0.9 }]),
        )
        .unwrap();
        let Command::SetColor(color) = cmd else {
            panic!("expected SetColor, got {cmd:?}");
        };
        assert_eq!(color.mode, ColorMode::Hue);
        assert_eq!(color.saturation, Some(0.9));
    }

    #[test]
    fn unknown_method_is_rejected() {
        let err = Command::parse(CapabilityKind::Brightness, "turnOn", &Value::Null).unwrap_err();
        assert!(matches!(err, CoreError::UnknownMethod { protocol: "brightness", .. }));

        let err = Command::parse(CapabilityKind::Temperature, "set", &json!([1])).unwrap_err();
        assert!(matches!(err, CoreError::UnknownMethod { .. }));
    }

    #[test]
    fn bad_params_are_rejected() {
        let err = Command::parse(CapabilityKind::OnOff, "set", &json!(["yes"])).unwrap_err();
        assert!(matches!(err, CoreError::InvalidParams { .. }));

        let err = Command::parse(CapabilityKind::OnOff, "set", &json!([])).unwrap_err();
        assert!(matches!(err, CoreError::InvalidParams { .. }));
    }

    #[test]
    fn batch_parses_kebab_case_state() {
        let cmd =
            Command::parse_batch("setBatch", &json!([{ "on-off": true, "brightness": 0.5 }]))
                .unwrap();
        let Command::SetBatch(batch) = cmd else {
            panic!("expected SetBatch, got {cmd:?}");
        };
        assert_eq!(batch.on_off, Some(true));
        assert_eq!(batch.brightness, Some(0.5));
        assert!(Command::parse_batch("set", &Value::Null).is_err());
    }
}
