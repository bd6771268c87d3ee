//! Sensor channels, the records of the sensor document.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Channel types that surface as binary sensors when they live on a kube.
pub const BINARY_TYPES: [&str; 3] = ["movement", "vibration", "error"];

/// Channel class of radio modules.
pub const KUBE_CLASS: &str = "kube";

/// Reference into a kube or flx document.
///
/// Devices publish these as numbers, older firmware sometimes as strings;
/// both map to the same document key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IndexRef {
    /// Numeric index
    Number(u64),
    /// Textual index
    Text(String),
}

impl fmt::Display for IndexRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// One logical channel of the sensor document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorChannel {
    /// Stable channel identifier
    pub id: String,
    /// Enable flag, boolean-ish
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable: Option<Value>,
    /// Channel class (`kube` for radio modules)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    /// Kube reference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<IndexRef>,
    /// Port references; the first one points into the flx document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<Vec<IndexRef>>,
    /// User-assigned function label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    /// Domain tag: electricity, gas, water, temperature, ...
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub sensor_type: Option<String>,
    /// Native gauge/counter tag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    /// Refinement of the type, e.g. `pf`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
}

impl SensorChannel {
    /// Decode a raw channel record.
    ///
    /// # Errors
    ///
    /// Returns error if the record does not have the channel shape.
    pub fn from_value(value: &Value) -> Result<Self, serde_json::Error> {
        Self::deserialize(value)
    }

    /// Whether the channel takes part in entity derivation.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        enable_flag(self.enable.as_ref())
    }

    /// Whether the channel belongs to a kube module.
    #[must_use]
    pub fn is_kube(&self) -> bool {
        self.class.as_deref() == Some(KUBE_CLASS)
    }

    /// Binary channels are kube movement, vibration and error channels.
    #[must_use]
    pub fn is_binary(&self) -> bool {
        self.is_kube()
            && self
                .sensor_type
                .as_deref()
                .is_some_and(|t| BINARY_TYPES.contains(&t))
    }

    /// Key of the flx entry this channel is wired to.
    #[must_use]
    pub fn flx_port(&self) -> Option<&IndexRef> {
        self.port.as_ref().and_then(|ports| ports.first())
    }

    /// Copy of this channel with the data type replaced by a representation.
    #[must_use]
    pub fn with_data_type(&self, data_type: &str) -> Self {
        Self {
            data_type: Some(data_type.to_string()),
            ..self.clone()
        }
    }
}

/// Check the enable flag of a raw record without decoding it.
#[must_use]
pub fn is_enabled_record(record: &Value) -> bool {
    enable_flag(record.get("enable"))
}

fn enable_flag(flag: Option<&Value>) -> bool {
    match flag {
        None | Some(Value::Null | Value::Bool(false)) => false,
        Some(Value::Number(n)) => n.as_f64() != Some(0.0),
        Some(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn channel(value: &Value) -> SensorChannel {
        SensorChannel::from_value(value).unwrap()
    }

    #[test]
    fn enable_flag_semantics() {
        assert!(!channel(&json!({"id": "a"})).is_enabled());
        assert!(!channel(&json!({"id": "a", "enable": 0})).is_enabled());
        assert!(!channel(&json!({"id": "a", "enable": false})).is_enabled());
        assert!(!channel(&json!({"id": "a", "enable": null})).is_enabled());
        assert!(channel(&json!({"id": "a", "enable": 1})).is_enabled());
        assert!(channel(&json!({"id": "a", "enable": true})).is_enabled());
        assert!(!is_enabled_record(&json!({"enable": 0})));
        assert!(is_enabled_record(&json!({"enable": 1})));
    }

    #[test]
    fn decodes_device_record() {
        let c = channel(&json!({
            "id": "a1b2",
            "enable": 1,
            "class": "analog",
            "port": [3],
            "type": "electricity",
            "data_type": "counter",
            "subtype": "pplus",
            "function": "Main"
        }));
        assert_eq!(c.sensor_type.as_deref(), Some("electricity"));
        assert_eq!(c.flx_port(), Some(&IndexRef::Number(3)));
        assert_eq!(c.subtype.as_deref(), Some("pplus"));
        assert!(!c.is_kube());
    }

    #[test]
    fn index_refs_accept_numbers_and_strings() {
        let c = channel(&json!({"id": "x", "kid": "7", "port": [1, "2"]}));
        assert_eq!(c.kid.as_ref().map(ToString::to_string).as_deref(), Some("7"));
        let ports: Vec<String> = c.port.unwrap().iter().map(ToString::to_string).collect();
        assert_eq!(ports, vec!["1", "2"]);
    }

    #[test]
    fn binary_classification_is_exhaustive() {
        let types = [
            "electricity",
            "gas",
            "water",
            "temperature",
            "pressure",
            "battery",
            "light",
            "humidity",
            "error",
            "proximity",
            "movement",
            "vibration",
        ];
        for class in ["kube", "analog", "pulse"] {
            for t in types {
                let c = channel(&json!({"id": "x", "class": class, "type": t}));
                let expected = class == "kube" && matches!(t, "movement" | "vibration" | "error");
                assert_eq!(c.is_binary(), expected, "class={class} type={t}");
            }
        }
        assert!(!channel(&json!({"id": "x", "type": "movement"})).is_binary());
    }

    #[test]
    fn with_data_type_only_touches_data_type() {
        let c = channel(&json!({"id": "x", "type": "gas", "data_type": "counter"}));
        let g = c.with_data_type("gauge");
        assert_eq!(g.data_type.as_deref(), Some("gauge"));
        assert_eq!(g.sensor_type, c.sensor_type);
        assert_eq!(g.id, c.id);
    }
}
