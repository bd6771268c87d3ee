//! Generation-keyed capability tables.
//!
//! Every table is a tree of at most three levels,
//! `type → data_type → subtype`, whose nodes are either a terminal value or
//! a further branch. Two immutable instances exist, one per [`Generation`],
//! built on first use and shared for the lifetime of the process.
//!
//! The data-type table is the odd one out: its terminal values are lists of
//! [`Representation`]s. The native `data_type` of a channel (level two) and
//! the representations it expands to both use the words gauge and counter.

use crate::device::Generation;
use crate::entity::Platform;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Every channel type the tables know about.
pub const SENSOR_TYPES: [&str; 12] = [
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

const ELECTRICITY_GAUGE_SUBTYPES: [&str; 6] = ["pf", "vrms", "irms", "vthd", "ithd", "alpha"];
const ELECTRICITY_COUNTER_SUBTYPES: [&str; 6] = ["q1", "q2", "q3", "q4", "pplus", "pminus"];
const REACTIVE_SUBTYPES: [&str; 4] = ["q1", "q2", "q3", "q4"];
const ACTIVE_SUBTYPES: [&str; 2] = ["pplus", "pminus"];

/// Units of measurement.
pub mod units {
    /// Percentage
    pub const PERCENTAGE: &str = "%";
    /// Watt
    pub const WATT: &str = "W";
    /// Watt hour
    pub const WATT_HOUR: &str = "Wh";
    /// Volt-ampere reactive
    pub const VAR: &str = "var";
    /// Volt-ampere reactive hour
    pub const VAR_HOUR: &str = "VARh";
    /// Volt
    pub const VOLT: &str = "V";
    /// Ampere
    pub const AMPERE: &str = "A";
    /// Degree Celsius
    pub const CELSIUS: &str = "°C";
    /// Hectopascal
    pub const HECTOPASCAL: &str = "hPa";
    /// Lux
    pub const LUX: &str = "lx";
    /// Litre
    pub const LITRE: &str = "L";
    /// Litre per second
    pub const LITRE_PER_SECOND: &str = "L/s";
    /// Cubic metre
    pub const CUBIC_METRE: &str = "m³";
    /// Cubic metre per second
    pub const CUBIC_METRE_PER_SECOND: &str = "m³/s";
}

/// A gauge or counter facet of a channel type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Representation {
    /// Instantaneous value
    Gauge,
    /// Monotonic total
    Counter,
}

impl Representation {
    /// Data type string used in topics and identifiers.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gauge => "gauge",
            Self::Counter => "counter",
        }
    }
}

impl fmt::Display for Representation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Host device classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceClass {
    /// Active power
    Power,
    /// Active energy
    Energy,
    /// Power factor
    PowerFactor,
    /// Reactive power
    ReactivePower,
    /// Voltage
    Voltage,
    /// Current
    Current,
    /// Water volume
    Water,
    /// Gas volume
    Gas,
    /// Temperature
    Temperature,
    /// Pressure
    Pressure,
    /// Battery level
    Battery,
    /// Illuminance
    Illuminance,
    /// Humidity
    Humidity,
    /// Problem flag (binary sensors only)
    Problem,
}

impl DeviceClass {
    /// Host name of the class.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Power => "power",
            Self::Energy => "energy",
            Self::PowerFactor => "power_factor",
            Self::ReactivePower => "reactive_power",
            Self::Voltage => "voltage",
            Self::Current => "current",
            Self::Water => "water",
            Self::Gas => "gas",
            Self::Temperature => "temperature",
            Self::Pressure => "pressure",
            Self::Battery => "battery",
            Self::Illuminance => "illuminance",
            Self::Humidity => "humidity",
            Self::Problem => "problem",
        }
    }

    /// The only platform this class is valid on.
    #[must_use]
    pub fn platform(self) -> Platform {
        match self {
            Self::Problem => Platform::BinarySensor,
            _ => Platform::Sensor,
        }
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Host state classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateClass {
    /// Instantaneous measurement
    Measurement,
    /// Monotonically increasing total
    TotalIncreasing,
}

impl fmt::Display for StateClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Measurement => "measurement",
            Self::TotalIncreasing => "total_increasing",
        })
    }
}

/// One node of a capability table.
#[derive(Debug, Clone, PartialEq)]
pub enum Node<V> {
    /// Terminal value
    Leaf(V),
    /// Next lookup level
    Branch(Branch<V>),
}

/// A lookup level: key to node.
#[derive(Debug, Clone, PartialEq)]
pub struct Branch<V>(BTreeMap<&'static str, Node<V>>);

impl<V> Branch<V> {
    /// Node under `key`, if any.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Node<V>> {
        self.0.get(key)
    }

    /// Keys of this level in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.0.keys().copied()
    }

    /// Entries of this level in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &Node<V>)> {
        self.0.iter().map(|(k, v)| (*k, v))
    }

    /// Whether `key` exists at this level.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }
}

impl<V> FromIterator<(&'static str, Node<V>)> for Branch<V> {
    fn from_iter<I: IntoIterator<Item = (&'static str, Node<V>)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// A complete table, rooted at the `type` level.
pub type Table<V> = Branch<V>;

fn leaf<V>(value: V) -> Node<V> {
    Node::Leaf(value)
}

fn branch<V>(entries: impl IntoIterator<Item = (&'static str, Node<V>)>) -> Node<V> {
    Node::Branch(entries.into_iter().collect())
}

fn same<V: Clone>(keys: &[&'static str], value: &V) -> Vec<(&'static str, Node<V>)> {
    keys.iter().map(|k| (*k, leaf(value.clone()))).collect()
}

/// The five lookup tables for one hardware generation.
#[derive(Debug, Clone, PartialEq)]
pub struct CapabilityTables {
    /// Generation these tables describe
    pub generation: Generation,
    /// Representations each type expands to
    pub data_types: Table<Vec<Representation>>,
    /// Unit of measurement
    pub units: Table<&'static str>,
    /// Device class
    pub device_classes: Table<DeviceClass>,
    /// Icon
    pub icons: Table<&'static str>,
    /// State class
    pub state_classes: Table<StateClass>,
}

static GEN2_TABLES: Lazy<CapabilityTables> = Lazy::new(|| CapabilityTables::build(Generation::Gen2));
static GEN3_TABLES: Lazy<CapabilityTables> = Lazy::new(|| CapabilityTables::build(Generation::Gen3));

impl CapabilityTables {
    /// The shared table instance for a generation.
    #[must_use]
    pub fn for_generation(generation: Generation) -> &'static Self {
        match generation {
            Generation::Gen2 => &GEN2_TABLES,
            Generation::Gen3 => &GEN3_TABLES,
        }
    }

    /// Channel types this generation can expand into entities.
    pub fn types(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.data_types.keys()
    }

    fn build(generation: Generation) -> Self {
        Self {
            generation,
            data_types: data_type_table(generation),
            units: unit_table(generation),
            device_classes: device_class_table(generation),
            icons: icon_table(),
            state_classes: state_class_table(),
        }
    }
}

fn data_type_table(generation: Generation) -> Table<Vec<Representation>> {
    use Representation::{Counter, Gauge};

    let gauge = || leaf(vec![Gauge]);
    let both = || leaf(vec![Gauge, Counter]);

    let electricity = match generation {
        Generation::Gen3 => branch([
            (
                "gauge",
                branch(same(&ELECTRICITY_GAUGE_SUBTYPES, &vec![Gauge])),
            ),
            (
                "counter",
                branch(same(&ELECTRICITY_COUNTER_SUBTYPES, &vec![Gauge, Counter])),
            ),
        ]),
        Generation::Gen2 => branch([("counter", both())]),
    };

    [
        ("electricity", electricity),
        ("gas", branch([("counter", both())])),
        ("water", branch([("counter", both())])),
        ("temperature", branch([("gauge", gauge())])),
        ("pressure", branch([("gauge", gauge())])),
        ("battery", branch([("gauge", gauge())])),
        ("light", branch([("gauge", gauge())])),
        ("humidity", branch([("gauge", gauge())])),
        ("error", branch([("gauge", gauge())])),
        ("proximity", branch([("counter", gauge())])),
        ("movement", branch([("counter", gauge())])),
        ("vibration", branch([("counter", gauge())])),
    ]
    .into_iter()
    .collect()
}

fn unit_table(generation: Generation) -> Table<&'static str> {
    let electricity = match generation {
        Generation::Gen3 => {
            let mut gauge = vec![
                ("pf", leaf(units::PERCENTAGE)),
                ("vrms", leaf(units::VOLT)),
                ("irms", leaf(units::AMPERE)),
            ];
            gauge.extend(same(&REACTIVE_SUBTYPES, &units::VAR));
            gauge.extend(same(&ACTIVE_SUBTYPES, &units::WATT));

            let mut counter = same(&REACTIVE_SUBTYPES, &units::VAR_HOUR);
            counter.extend(same(&ACTIVE_SUBTYPES, &units::WATT_HOUR));

            branch([("gauge", branch(gauge)), ("counter", branch(counter))])
        }
        Generation::Gen2 => branch([
            ("gauge", leaf(units::WATT)),
            ("counter", leaf(units::WATT_HOUR)),
        ]),
    };

    [
        ("electricity", electricity),
        ("temperature", leaf(units::CELSIUS)),
        ("pressure", leaf(units::HECTOPASCAL)),
        ("battery", leaf(units::PERCENTAGE)),
        (
            "water",
            branch([
                ("gauge", leaf(units::LITRE_PER_SECOND)),
                ("counter", leaf(units::LITRE)),
            ]),
        ),
        ("light", leaf(units::LUX)),
        ("humidity", leaf(units::PERCENTAGE)),
        (
            "gas",
            branch([
                ("gauge", leaf(units::CUBIC_METRE_PER_SECOND)),
                ("counter", leaf(units::CUBIC_METRE)),
            ]),
        ),
    ]
    .into_iter()
    .collect()
}

fn device_class_table(generation: Generation) -> Table<DeviceClass> {
    let electricity = match generation {
        Generation::Gen3 => {
            let mut gauge = vec![
                ("pf", leaf(DeviceClass::PowerFactor)),
                ("vrms", leaf(DeviceClass::Voltage)),
                ("irms", leaf(DeviceClass::Current)),
            ];
            gauge.extend(same(&REACTIVE_SUBTYPES, &DeviceClass::ReactivePower));
            gauge.extend(same(&ACTIVE_SUBTYPES, &DeviceClass::Power));

            branch([
                ("gauge", branch(gauge)),
                (
                    "counter",
                    branch(same(&ACTIVE_SUBTYPES, &DeviceClass::Energy)),
                ),
            ])
        }
        Generation::Gen2 => branch([
            ("gauge", leaf(DeviceClass::Power)),
            ("counter", leaf(DeviceClass::Energy)),
        ]),
    };

    [
        ("electricity", electricity),
        ("water", leaf(DeviceClass::Water)),
        ("temperature", leaf(DeviceClass::Temperature)),
        ("pressure", leaf(DeviceClass::Pressure)),
        ("battery", leaf(DeviceClass::Battery)),
        ("light", leaf(DeviceClass::Illuminance)),
        ("humidity", leaf(DeviceClass::Humidity)),
        ("gas", leaf(DeviceClass::Gas)),
        ("error", leaf(DeviceClass::Problem)),
    ]
    .into_iter()
    .collect()
}

fn icon_table() -> Table<&'static str> {
    [
        ("electricity", leaf("mdi:lightning-bolt")),
        ("water", leaf("mdi:water")),
        ("proximity", leaf("mdi:ruler")),
        ("gas", leaf("mdi:fire")),
    ]
    .into_iter()
    .collect()
}

fn state_class_table() -> Table<StateClass> {
    let split = || {
        branch([
            ("counter", leaf(StateClass::TotalIncreasing)),
            ("gauge", leaf(StateClass::Measurement)),
        ])
    };

    let mut entries = vec![
        ("electricity", split()),
        ("water", split()),
        ("gas", split()),
    ];
    entries.extend(
        SENSOR_TYPES
            .iter()
            .filter(|t| !matches!(**t, "electricity" | "water" | "gas"))
            .map(|t| (*t, leaf(StateClass::Measurement))),
    );
    entries.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_type_expands_in_both_generations() {
        for generation in Generation::ALL {
            let tables = CapabilityTables::for_generation(generation);
            let types: Vec<&str> = tables.types().collect();
            for t in SENSOR_TYPES {
                assert!(types.contains(&t), "{generation}: {t} missing");
                assert!(tables.state_classes.contains(t), "{generation}: {t}");
            }
            assert_eq!(types.len(), SENSOR_TYPES.len());
        }
    }

    #[test]
    fn gen2_electricity_is_flat() {
        let tables = CapabilityTables::for_generation(Generation::Gen2);
        let Some(Node::Branch(electricity)) = tables.units.get("electricity") else {
            panic!("electricity units must branch on data type");
        };
        assert_eq!(electricity.get("gauge"), Some(&Node::Leaf(units::WATT)));
        assert_eq!(electricity.get("counter"), Some(&Node::Leaf(units::WATT_HOUR)));
    }

    #[test]
    fn gen3_electricity_branches_on_subtype() {
        let tables = CapabilityTables::for_generation(Generation::Gen3);
        let Some(Node::Branch(electricity)) = tables.data_types.get("electricity") else {
            panic!("electricity data types must branch");
        };
        let Some(Node::Branch(counter)) = electricity.get("counter") else {
            panic!("counter must branch on subtype");
        };
        assert_eq!(
            counter.get("q1"),
            Some(&Node::Leaf(vec![
                Representation::Gauge,
                Representation::Counter
            ]))
        );
        assert_eq!(counter.keys().count(), 6);
    }

    #[test]
    fn shared_tables_are_identical_across_generations() {
        let gen2 = CapabilityTables::for_generation(Generation::Gen2);
        let gen3 = CapabilityTables::for_generation(Generation::Gen3);
        assert_eq!(gen2.icons, gen3.icons);
        assert_eq!(gen2.state_classes, gen3.state_classes);
        assert_ne!(gen2.units, gen3.units);
    }

    #[test]
    fn only_problem_belongs_to_binary_sensors() {
        assert_eq!(DeviceClass::Problem.platform(), Platform::BinarySensor);
        assert_eq!(DeviceClass::Power.platform(), Platform::Sensor);
        assert_eq!(DeviceClass::PowerFactor.as_str(), "power_factor");
    }
}
