//! Entity descriptors derived from a discovered device.
//!
//! Every enabled channel of the sensor document becomes one binary sensor
//! or one analog sensor per representation. Descriptors keep the order of
//! the sensor document. A channel that cannot be turned into a valid
//! descriptor is reported as a [`BuildIssue`] and does not stop the others.

use crate::channel::{is_enabled_record, SensorChannel};
use crate::device::{DeviceMetadata, DeviceProfile, Generation};
use crate::documents::ConfigDocuments;
use crate::mapper::{CapabilityMapper, Resolved};
use crate::tables::{DeviceClass, Representation, StateClass};
use crate::transform::{ValueTransform, EVENT_OFF_DELAY_SECS};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Host platform an entity is rendered on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    /// Numeric measurement
    Sensor,
    /// ON/OFF flag
    BinarySensor,
}

impl Platform {
    /// Host component name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sensor => "sensor",
            Self::BinarySensor => "binary_sensor",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Host entity category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityCategory {
    /// Diagnostic entity
    Diagnostic,
}

/// A fully resolved entity, ready for the host platform.
///
/// Serializes to the host's discovery document; fields that only matter
/// locally are skipped.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityDescriptor {
    /// Display name
    pub name: String,
    /// Requested object id
    pub object_id: String,
    /// `{device hash}_{channel id}_{data type}`
    pub unique_id: String,
    /// Unit of measurement
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_of_measurement: Option<&'static str>,
    /// Device class
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_class: Option<DeviceClass>,
    /// State class
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_class: Option<StateClass>,
    /// Icon
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<&'static str>,
    /// Payload to state transform
    #[serde(rename = "value_template")]
    pub value_transform: ValueTransform,
    /// `/sensor/{channel id}/{data type}`
    pub state_topic: String,
    /// Seconds after which an event flag reverts to OFF
    #[serde(skip_serializing_if = "Option::is_none")]
    pub off_delay: Option<u32>,
    /// Subscription QoS
    pub qos: u8,
    /// Record every update, even unchanged ones
    pub force_update: bool,
    /// Entity category
    pub entity_category: EntityCategory,
    /// Enabled when first registered
    pub enabled_by_default: bool,
    /// Owning device
    pub device: DeviceMetadata,
    /// Platform the entity belongs to
    #[serde(skip)]
    pub platform: Platform,
    /// Source channel id
    #[serde(skip)]
    pub channel_id: String,
    /// Data type the entity reads
    #[serde(skip)]
    pub data_type: String,
}

impl EntityDescriptor {
    /// Whether this is a binary sensor.
    #[must_use]
    pub fn is_binary(&self) -> bool {
        self.platform == Platform::BinarySensor
    }

    /// Check the descriptor against the host schema.
    ///
    /// # Errors
    ///
    /// Returns the first structural problem found.
    pub fn validate(&self) -> Result<(), BuildError> {
        check_segment(&self.channel_id)?;
        check_segment(&self.data_type)?;
        if self.name.is_empty() {
            return Err(BuildError::EmptyName);
        }
        if let Some(class) = self.device_class {
            if class.platform() != self.platform {
                return Err(BuildError::DeviceClassPlatform {
                    class,
                    platform: self.platform,
                });
            }
        }
        if self.value_transform.is_binary() != self.is_binary() {
            return Err(BuildError::TransformPlatform(self.platform));
        }
        if self.is_binary() {
            if self.unit_of_measurement.is_some() {
                return Err(BuildError::BinaryAttribute("unit_of_measurement"));
            }
            if self.state_class.is_some() {
                return Err(BuildError::BinaryAttribute("state_class"));
            }
        } else if self.off_delay.is_some() {
            return Err(BuildError::AnalogOffDelay);
        }
        Ok(())
    }
}

/// Why a channel produced no descriptor.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    /// Record does not decode as a channel
    #[error("malformed channel record: {0}")]
    MalformedChannel(String),
    /// Binary channels publish on their own data type, which is missing
    #[error("binary channel has no data_type")]
    MissingDataType,
    /// Type does not expand to any representation
    #[error("type {sensor_type:?} has no representations on {generation}")]
    NoRepresentations {
        /// Channel type
        sensor_type: Option<String>,
        /// Generation whose tables were consulted
        generation: Generation,
    },
    /// Expansion stopped on a branch because an attribute is missing
    #[error("type {0} needs a data_type and subtype to expand")]
    AmbiguousRepresentations(String),
    /// Value cannot be used as a topic segment
    #[error("invalid topic segment {0:?}")]
    InvalidTopicSegment(String),
    /// Name resolved to an empty string
    #[error("entity name is empty")]
    EmptyName,
    /// Device class belongs to the other platform
    #[error("device class {class} is not valid on {platform}")]
    DeviceClassPlatform {
        /// Offending class
        class: DeviceClass,
        /// Platform of the descriptor
        platform: Platform,
    },
    /// Transform output does not fit the platform
    #[error("value transform does not fit {0}")]
    TransformPlatform(Platform),
    /// Binary sensors do not take this attribute
    #[error("binary sensors cannot carry {0}")]
    BinaryAttribute(&'static str),
    /// Analog sensors do not take an off delay
    #[error("analog sensors cannot carry off_delay")]
    AnalogOffDelay,
}

/// A channel (or one representation of it) that was dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildIssue {
    /// Channel id, or the document key when the record has no id
    pub channel_id: String,
    /// Representation being built, if the failure is specific to one
    pub data_type: Option<String>,
    /// What went wrong
    pub error: BuildError,
}

impl fmt::Display for BuildIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.data_type {
            Some(data_type) => write!(f, "channel {} ({data_type}): {}", self.channel_id, self.error),
            None => write!(f, "channel {}: {}", self.channel_id, self.error),
        }
    }
}

/// Descriptors of one device, split per platform, plus diagnostics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityReport {
    /// Analog sensors in sensor document order
    pub sensors: Vec<EntityDescriptor>,
    /// Binary sensors in sensor document order
    pub binary_sensors: Vec<EntityDescriptor>,
    /// Dropped channels
    pub issues: Vec<BuildIssue>,
}

impl EntityReport {
    /// Descriptors for one platform.
    #[must_use]
    pub fn for_platform(&self, platform: Platform) -> &[EntityDescriptor] {
        match platform {
            Platform::Sensor => &self.sensors,
            Platform::BinarySensor => &self.binary_sensors,
        }
    }

    /// All descriptors, analog first.
    pub fn descriptors(&self) -> impl Iterator<Item = &EntityDescriptor> {
        self.sensors.iter().chain(&self.binary_sensors)
    }

    /// Total number of descriptors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sensors.len() + self.binary_sensors.len()
    }

    /// Whether no descriptor was produced.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Build the entity descriptors of a device.
#[must_use]
pub fn build_entities(profile: &DeviceProfile) -> EntityReport {
    EntityBuilder::new(profile).build()
}

/// Turns the channels of one device into descriptors.
pub struct EntityBuilder<'a> {
    profile: &'a DeviceProfile,
    mapper: CapabilityMapper,
    device: DeviceMetadata,
}

impl<'a> EntityBuilder<'a> {
    /// Builder for a device, using the tables of its generation.
    #[must_use]
    pub fn new(profile: &'a DeviceProfile) -> Self {
        Self {
            profile,
            mapper: CapabilityMapper::new(profile.generation),
            device: DeviceMetadata::for_profile(profile),
        }
    }

    /// Build descriptors for every enabled channel.
    #[must_use]
    pub fn build(&self) -> EntityReport {
        let mut report = EntityReport::default();

        for (key, record) in self.profile.documents.sensor.iter() {
            if !is_enabled_record(record) {
                continue;
            }

            let channel = match SensorChannel::from_value(record) {
                Ok(channel) => channel,
                Err(err) => {
                    let channel_id = record
                        .get("id")
                        .and_then(serde_json::Value::as_str)
                        .unwrap_or(key);
                    report.issues.push(BuildIssue {
                        channel_id: channel_id.to_string(),
                        data_type: None,
                        error: BuildError::MalformedChannel(err.to_string()),
                    });
                    continue;
                }
            };

            if channel.is_binary() {
                match self.binary(&channel) {
                    Ok(descriptor) => report.binary_sensors.push(descriptor),
                    Err(issue) => report.issues.push(issue),
                }
            } else {
                match self.representations(&channel) {
                    Ok(representations) => {
                        for representation in representations {
                            match self.analog(&channel, *representation) {
                                Ok(descriptor) => report.sensors.push(descriptor),
                                Err(issue) => report.issues.push(issue),
                            }
                        }
                    }
                    Err(issue) => report.issues.push(issue),
                }
            }
        }

        tracing::debug!(
            device = %self.profile.hash,
            generation = %self.profile.generation,
            sensors = report.sensors.len(),
            binary_sensors = report.binary_sensors.len(),
            issues = report.issues.len(),
            "Built entity descriptors"
        );

        report
    }

    fn binary(&self, channel: &SensorChannel) -> Result<EntityDescriptor, BuildIssue> {
        let issue = |error| BuildIssue {
            channel_id: channel.id.clone(),
            data_type: channel.data_type.clone(),
            error,
        };

        if channel.data_type.is_none() {
            return Err(issue(BuildError::MissingDataType));
        }

        let device_class = self.mapper.device_class(channel);
        let (value_transform, off_delay) = if device_class == Some(DeviceClass::Problem) {
            (ValueTransform::ProblemCode, None)
        } else {
            (ValueTransform::EventFlag, Some(EVENT_OFF_DELAY_SECS))
        };

        let descriptor = self.describe(
            channel,
            Platform::BinarySensor,
            value_transform,
            off_delay,
            None,
        );
        descriptor.validate().map_err(issue)?;
        Ok(descriptor)
    }

    fn representations(
        &self,
        channel: &SensorChannel,
    ) -> Result<&'static [Representation], BuildIssue> {
        let issue = |error| BuildIssue {
            channel_id: channel.id.clone(),
            data_type: None,
            error,
        };

        match self.mapper.representations(channel) {
            Resolved::Leaf(representations) => Ok(representations.as_slice()),
            Resolved::Branch(_) => Err(issue(BuildError::AmbiguousRepresentations(
                channel.sensor_type.clone().unwrap_or_default(),
            ))),
            Resolved::Absent => Err(issue(BuildError::NoRepresentations {
                sensor_type: channel.sensor_type.clone(),
                generation: self.mapper.generation(),
            })),
        }
    }

    fn analog(
        &self,
        channel: &SensorChannel,
        representation: Representation,
    ) -> Result<EntityDescriptor, BuildIssue> {
        let facet = channel.with_data_type(representation.as_str());
        let value_transform =
            ValueTransform::for_analog(facet.sensor_type.as_deref(), facet.subtype.as_deref());
        let state_class = self.mapper.state_class(&facet);

        let descriptor = self.describe(&facet, Platform::Sensor, value_transform, None, state_class);
        descriptor.validate().map_err(|error| BuildIssue {
            channel_id: facet.id.clone(),
            data_type: Some(representation.to_string()),
            error,
        })?;
        Ok(descriptor)
    }

    fn describe(
        &self,
        channel: &SensorChannel,
        platform: Platform,
        value_transform: ValueTransform,
        off_delay: Option<u32>,
        state_class: Option<StateClass>,
    ) -> EntityDescriptor {
        let data_type = channel.data_type.clone().unwrap_or_default();
        let base = base_name(channel, &self.profile.documents);

        EntityDescriptor {
            object_id: object_id(&base, channel),
            name: base,
            unique_id: format!("{}_{}_{data_type}", self.profile.hash, channel.id),
            unit_of_measurement: self.mapper.unit(channel),
            device_class: self.mapper.device_class(channel),
            state_class,
            icon: self.mapper.icon(channel),
            value_transform,
            state_topic: format!("/sensor/{}/{data_type}", channel.id),
            off_delay,
            qos: 0,
            force_update: platform == Platform::Sensor,
            entity_category: EntityCategory::Diagnostic,
            enabled_by_default: true,
            device: self.device.clone(),
            platform,
            channel_id: channel.id.clone(),
            data_type,
        }
    }
}

/// Display name: linked kube/flx name, then function, then a fallback.
fn base_name(channel: &SensorChannel, documents: &ConfigDocuments) -> String {
    let linked = if channel.is_kube() {
        documents
            .kube
            .as_ref()
            .zip(channel.kid.as_ref())
            .and_then(|(kube, kid)| kube.name(&kid.to_string()))
    } else {
        documents
            .flx
            .as_ref()
            .zip(channel.flx_port())
            .and_then(|(flx, port)| flx.name(&port.to_string()))
    };

    linked
        .or_else(|| channel.function.as_deref().filter(|f| !f.is_empty()))
        .map_or_else(
            || {
                if channel.is_kube() {
                    "unknown kube".to_string()
                } else {
                    "unknown sensor".to_string()
                }
            },
            str::to_string,
        )
}

/// Base name plus type, and data type where one channel yields several
/// entities.
fn object_id(base: &str, channel: &SensorChannel) -> String {
    let mut id = base.to_string();
    let Some(sensor_type) = channel.sensor_type.as_deref() else {
        return id;
    };
    id.push(' ');
    id.push_str(sensor_type);

    if let Some(data_type) = channel.data_type.as_deref() {
        match (sensor_type, channel.subtype.as_deref()) {
            ("electricity", Some(subtype)) => {
                id.push_str(&format!(" {subtype} {data_type}"));
            }
            ("electricity" | "water" | "gas", _) => {
                id.push(' ');
                id.push_str(data_type);
            }
            _ => {}
        }
    }
    id
}

fn check_segment(segment: &str) -> Result<(), BuildError> {
    if segment.is_empty() || segment.contains(['/', '+', '#']) {
        return Err(BuildError::InvalidTopicSegment(segment.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceHash, Identity};
    use crate::documents::{AuxDocument, SensorDocument};
    use crate::tables::units;
    use crate::transform::StateValue;
    use serde_json::{json, Value};

    const HASH: &str = "0123456789abcdef0123456789abcdef";

    fn object(value: Value) -> serde_json::Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    fn profile(sensor: Value, gen3: bool) -> DeviceProfile {
        let identity = gen3.then(|| Identity {
            serial: "FL03001234".to_string(),
            firmware: "3.0.1".to_string(),
        });
        DeviceProfile::new(
            DeviceHash::parse(HASH).unwrap(),
            identity,
            ConfigDocuments::with_sensor(SensorDocument::from(object(sensor))),
        )
    }

    fn evaluate(descriptor: &EntityDescriptor, payload: &str) -> StateValue {
        descriptor.value_transform.evaluate(payload).unwrap()
    }

    #[test]
    fn disabled_channels_produce_nothing() {
        let report = build_entities(&profile(
            json!({
                "1": {"id": "a", "type": "gas", "data_type": "counter"},
                "2": {"id": "b", "enable": 0, "type": "gas", "data_type": "counter"},
                "3": {"id": "c", "enable": 0, "class": "kube", "type": "movement", "data_type": "counter"},
                "4": {"enable": 0, "id": 42}
            }),
            true,
        ));
        assert!(report.is_empty());
        assert!(report.issues.is_empty());
    }

    #[test]
    fn counter_channel_expands_into_two_representations() {
        let report = build_entities(&profile(
            json!({"1": {"id": "gas1", "enable": 1, "port": [1], "type": "gas", "data_type": "counter"}}),
            false,
        ));
        let ids: Vec<&str> = report.sensors.iter().map(|d| d.unique_id.as_str()).collect();
        assert_eq!(
            ids,
            vec![format!("{HASH}_gas1_gauge"), format!("{HASH}_gas1_counter")]
        );
        let counter = &report.sensors[1];
        assert_eq!(counter.state_topic, "/sensor/gas1/counter");
        assert_eq!(counter.unit_of_measurement, Some(units::CUBIC_METRE));
        assert_eq!(counter.state_class, Some(StateClass::TotalIncreasing));
        assert_eq!(counter.icon, Some("mdi:fire"));
        assert_eq!(evaluate(counter, "1700000000,5000"), StateValue::Number(5.0));
        assert!(counter.force_update);
    }

    #[test]
    fn gen3_power_factor_entity() {
        let report = build_entities(&profile(
            json!({"1": {
                "id": "pf1", "enable": 1, "port": [1], "type": "electricity",
                "data_type": "gauge", "subtype": "pf"
            }}),
            true,
        ));
        assert_eq!(report.sensors.len(), 1);
        let pf = &report.sensors[0];
        assert_eq!(pf.device_class, Some(DeviceClass::PowerFactor));
        assert_eq!(pf.unit_of_measurement, Some(units::PERCENTAGE));
        assert_eq!(evaluate(pf, "1700000000,0.5"), StateValue::Number(50.0));
        assert_eq!(pf.device.name, "FL03001234");
        assert_eq!(pf.device.sw_version, "3.0.1");
    }

    #[test]
    fn battery_entity_scales_to_percent() {
        let report = build_entities(&profile(
            json!({"1": {"id": "bat", "enable": 1, "class": "kube", "kid": 1, "type": "battery", "data_type": "gauge"}}),
            true,
        ));
        let battery = &report.sensors[0];
        assert_eq!(evaluate(battery, "1700000000,3.3"), StateValue::Number(100.0));
        assert_eq!(evaluate(battery, "1700000000,0.0"), StateValue::Number(0.0));
        assert_eq!(battery.device_class, Some(DeviceClass::Battery));
    }

    #[test]
    fn binary_paths() {
        let report = build_entities(&profile(
            json!({
                "1": {"id": "mov", "enable": 1, "class": "kube", "kid": 2, "type": "movement", "data_type": "counter"},
                "2": {"id": "err", "enable": 1, "class": "kube", "kid": 2, "type": "error", "data_type": "gauge"}
            }),
            true,
        ));
        assert!(report.sensors.is_empty());
        assert_eq!(report.binary_sensors.len(), 2);

        let movement = &report.binary_sensors[0];
        assert_eq!(movement.state_topic, "/sensor/mov/counter");
        assert_eq!(movement.value_transform, ValueTransform::EventFlag);
        assert_eq!(movement.off_delay, Some(EVENT_OFF_DELAY_SECS));
        assert!(!movement.force_update);

        let error = &report.binary_sensors[1];
        assert_eq!(error.device_class, Some(DeviceClass::Problem));
        assert_eq!(error.off_delay, None);
        assert_eq!(evaluate(error, "1700000000,4"), StateValue::Flag(true));
        assert_eq!(evaluate(error, "1700000000,0"), StateValue::Flag(false));
    }

    #[test]
    fn binary_without_data_type_is_reported() {
        let report = build_entities(&profile(
            json!({"1": {"id": "vib", "enable": 1, "class": "kube", "type": "vibration"}}),
            true,
        ));
        assert!(report.is_empty());
        assert_eq!(report.issues[0].error, BuildError::MissingDataType);
        assert_eq!(report.issues[0].channel_id, "vib");
    }

    #[test]
    fn analog_error_channel_fails_validation_without_aborting() {
        let report = build_entities(&profile(
            json!({
                "1": {"id": "e1", "enable": 1, "port": [1], "type": "error", "data_type": "gauge"},
                "2": {"id": "t1", "enable": 1, "port": [2], "type": "temperature", "data_type": "gauge"}
            }),
            false,
        ));
        assert_eq!(report.sensors.len(), 1);
        assert_eq!(report.sensors[0].channel_id, "t1");
        assert_eq!(
            report.issues,
            vec![BuildIssue {
                channel_id: "e1".to_string(),
                data_type: Some("gauge".to_string()),
                error: BuildError::DeviceClassPlatform {
                    class: DeviceClass::Problem,
                    platform: Platform::Sensor,
                },
            }]
        );
    }

    #[test]
    fn malformed_record_is_isolated() {
        let report = build_entities(&profile(
            json!({
                "1": {"id": ["not", "a", "string"], "enable": 1},
                "2": {"id": "w1", "enable": 1, "type": "water", "data_type": "counter"},
                "3": {"id": "x", "enable": 1, "type": "radiation"},
                "4": {"id": "e", "enable": 1, "type": "electricity", "subtype": "pf"}
            }),
            true,
        ));
        assert_eq!(report.sensors.len(), 2);
        assert_eq!(report.issues.len(), 3);
        assert_eq!(report.issues[0].channel_id, "1");
        assert!(matches!(report.issues[0].error, BuildError::MalformedChannel(_)));
        assert!(matches!(
            report.issues[1].error,
            BuildError::NoRepresentations { .. }
        ));
        assert_eq!(
            report.issues[2].error,
            BuildError::AmbiguousRepresentations("electricity".to_string())
        );
    }

    #[test]
    fn naming_precedence() {
        let mut p = profile(
            json!({
                "1": {"id": "a", "enable": 1, "port": [1], "function": "Heat pump", "type": "electricity", "data_type": "counter"},
                "2": {"id": "b", "enable": 1, "port": [2], "function": "Solar", "type": "electricity", "data_type": "counter"},
                "3": {"id": "c", "enable": 1, "class": "kube", "kid": 7, "type": "temperature", "data_type": "gauge"},
                "4": {"id": "d", "enable": 1, "class": "kube", "kid": 8, "type": "humidity", "data_type": "gauge"},
                "5": {"id": "e", "enable": 1, "type": "water", "data_type": "counter"}
            }),
            false,
        );
        p.documents.flx = Some(AuxDocument::from(object(json!({"1": {"name": "Grid"}, "2": {"name": ""}}))));
        p.documents.kube = Some(AuxDocument::from(object(json!({"7": {"name": "Attic"}}))));

        let report = build_entities(&p);
        let names: Vec<&str> = report.sensors.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "Grid",
                "Grid",
                "Solar",
                "Solar",
                "Attic",
                "unknown kube",
                "unknown sensor",
                "unknown sensor"
            ]
        );
        let object_ids: Vec<&str> = report.sensors.iter().map(|d| d.object_id.as_str()).collect();
        assert_eq!(
            object_ids,
            vec![
                "Grid electricity gauge",
                "Grid electricity counter",
                "Solar electricity gauge",
                "Solar electricity counter",
                "Attic temperature",
                "unknown kube humidity",
                "unknown sensor water gauge",
                "unknown sensor water counter"
            ]
        );
    }

    #[test]
    fn electricity_object_id_includes_subtype() {
        let report = build_entities(&profile(
            json!({"1": {
                "id": "q", "enable": 1, "function": "Main", "type": "electricity",
                "data_type": "counter", "subtype": "q1"
            }}),
            true,
        ));
        let ids: Vec<&str> = report.sensors.iter().map(|d| d.object_id.as_str()).collect();
        assert_eq!(ids, vec!["Main electricity q1 gauge", "Main electricity q1 counter"]);
        assert_eq!(report.sensors[0].unit_of_measurement, Some(units::VAR));
        assert_eq!(report.sensors[1].unit_of_measurement, Some(units::VAR_HOUR));
        assert_eq!(report.sensors[1].device_class, None);
    }

    #[test]
    fn gen2_electricity_uses_flat_tables() {
        let report = build_entities(&profile(
            json!({"1": {"id": "m", "enable": 1, "type": "electricity", "data_type": "counter"}}),
            false,
        ));
        let classes: Vec<Option<DeviceClass>> = report.sensors.iter().map(|d| d.device_class).collect();
        assert_eq!(classes, vec![Some(DeviceClass::Power), Some(DeviceClass::Energy)]);
        assert_eq!(report.sensors[0].device.model, "FLM02");
    }

    #[test]
    fn sensor_document_order_is_preserved() {
        let report = build_entities(&profile(
            json!({
                "9": {"id": "z", "enable": 1, "type": "light", "data_type": "gauge"},
                "1": {"id": "a", "enable": 1, "type": "pressure", "data_type": "gauge"},
                "5": {"id": "m", "enable": 1, "type": "humidity", "data_type": "gauge"}
            }),
            false,
        ));
        let ids: Vec<&str> = report.sensors.iter().map(|d| d.channel_id.as_str()).collect();
        assert_eq!(ids, vec!["z", "a", "m"]);
    }

    #[test]
    fn descriptor_serializes_to_discovery_document() {
        let report = build_entities(&profile(
            json!({"1": {"id": "t", "enable": 1, "function": "Office", "type": "temperature", "data_type": "gauge"}}),
            false,
        ));
        let doc = serde_json::to_value(&report.sensors[0]).unwrap();
        assert_eq!(doc["unique_id"], format!("{HASH}_t_gauge"));
        assert_eq!(doc["state_topic"], "/sensor/t/gauge");
        assert_eq!(doc["device_class"], "temperature");
        assert_eq!(doc["state_class"], "measurement");
        assert_eq!(
            doc["value_template"],
            r#"{{ (value.split(",")[1] | float) | round(1) }}"#
        );
        assert_eq!(doc["entity_category"], "diagnostic");
        assert!(doc.get("off_delay").is_none());
        assert!(doc.get("platform").is_none());
    }
}
