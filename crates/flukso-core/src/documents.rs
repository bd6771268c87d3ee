//! Configuration documents published by a device.
//!
//! A device publishes one JSON document per [`ConfigKind`]. Each document is
//! an object keyed by an integer-like string. The sensor document keeps its
//! insertion order, which decides entity registration order downstream.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Kind of configuration document, read from the last topic segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigKind {
    /// Logical channels; mandatory
    Sensor,
    /// Physical module descriptors
    Kube,
    /// Physical port descriptors
    Flx,
}

impl ConfigKind {
    /// Every kind a device may publish.
    pub const ALL: [ConfigKind; 3] = [ConfigKind::Sensor, ConfigKind::Kube, ConfigKind::Flx];

    /// Topic segment for this kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sensor => "sensor",
            Self::Kube => "kube",
            Self::Flx => "flx",
        }
    }

    /// Whether discovery fails without this document.
    #[must_use]
    pub fn is_mandatory(self) -> bool {
        self == Self::Sensor
    }
}

impl fmt::Display for ConfigKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConfigKind {
    type Err = DocumentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sensor" => Ok(Self::Sensor),
            "kube" => Ok(Self::Kube),
            "flx" => Ok(Self::Flx),
            other => Err(DocumentError::UnknownKind(other.to_string())),
        }
    }
}

/// The mandatory sensor document: channel key to raw channel record.
///
/// Records are kept as raw JSON so that one malformed channel cannot spoil
/// the decoding of the others.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SensorDocument(Map<String, Value>);

impl SensorDocument {
    /// Iterate channel records in publication order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of channel records, enabled or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the document has no channel records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Map<String, Value>> for SensorDocument {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// A kube or flx document: index to descriptor with an optional `name`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuxDocument(Map<String, Value>);

impl AuxDocument {
    /// Human-readable name of the entry at `index`, if present and non-empty.
    #[must_use]
    pub fn name(&self, index: &str) -> Option<&str> {
        self.0
            .get(index)
            .and_then(|entry| entry.get("name"))
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the document is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Map<String, Value>> for AuxDocument {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// One decoded configuration message.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigDocument {
    /// Sensor document
    Sensor(SensorDocument),
    /// Kube document
    Kube(AuxDocument),
    /// Flx document
    Flx(AuxDocument),
}

impl ConfigDocument {
    /// Decode a configuration payload of the given kind.
    ///
    /// # Errors
    ///
    /// Returns error if the payload is not JSON or not a JSON object.
    pub fn parse(kind: ConfigKind, payload: &[u8]) -> Result<Self, DocumentError> {
        let value: Value =
            serde_json::from_slice(payload).map_err(|e| DocumentError::Json(e.to_string()))?;
        let Value::Object(map) = value else {
            return Err(DocumentError::NotAnObject(kind));
        };

        Ok(match kind {
            ConfigKind::Sensor => Self::Sensor(SensorDocument(map)),
            ConfigKind::Kube => Self::Kube(AuxDocument(map)),
            ConfigKind::Flx => Self::Flx(AuxDocument(map)),
        })
    }

    /// Kind of this document.
    #[must_use]
    pub fn kind(&self) -> ConfigKind {
        match self {
            Self::Sensor(_) => ConfigKind::Sensor,
            Self::Kube(_) => ConfigKind::Kube,
            Self::Flx(_) => ConfigKind::Flx,
        }
    }
}

/// The full document set of a device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigDocuments {
    /// Sensor document (mandatory)
    pub sensor: SensorDocument,
    /// Kube document, when published
    pub kube: Option<AuxDocument>,
    /// Flx document, when published
    pub flx: Option<AuxDocument>,
}

impl ConfigDocuments {
    /// Document set with only the mandatory sensor document.
    #[must_use]
    pub fn with_sensor(sensor: SensorDocument) -> Self {
        Self {
            sensor,
            kube: None,
            flx: None,
        }
    }
}

/// Errors decoding configuration documents.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DocumentError {
    /// Topic carried a kind that is not sensor, kube or flx
    #[error("unknown config kind: {0}")]
    UnknownKind(String),
    /// Payload is not valid JSON
    #[error("invalid JSON: {0}")]
    Json(String),
    /// Payload is JSON but not an object
    #[error("{0} config is not a JSON object")]
    NotAnObject(ConfigKind),
}
