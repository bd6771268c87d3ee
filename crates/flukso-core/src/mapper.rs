//! Capability lookup for sensor channels.
//!
//! [`resolve`] walks a table using the channel's `type`, `data_type` and
//! `subtype`, in that order:
//!
//! - a terminal value ends the walk;
//! - a channel without the attribute for the next level ends the walk at the
//!   node reached so far, which may still be a branch;
//! - an attribute the table has no key for yields [`Resolved::Absent`].
//!
//! Absence is an ordinary result, never an error.

use crate::channel::SensorChannel;
use crate::device::Generation;
use crate::tables::{Branch, CapabilityTables, DeviceClass, Node, Representation, StateClass};

/// Outcome of a table lookup.
#[derive(Debug, PartialEq)]
pub enum Resolved<'a, V> {
    /// The walk ended on a terminal value
    Leaf(&'a V),
    /// The walk stopped early on a branch
    Branch(&'a Branch<V>),
    /// A level had no matching key
    Absent,
}

impl<'a, V> Resolved<'a, V> {
    /// The terminal value, if the walk reached one.
    #[must_use]
    pub fn leaf(&self) -> Option<&'a V> {
        match *self {
            Self::Leaf(value) => Some(value),
            Self::Branch(_) | Self::Absent => None,
        }
    }

    /// Whether a level had no matching key.
    #[must_use]
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }
}

// Derived impls would require `V: Clone`.
impl<V> Clone for Resolved<'_, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<V> Copy for Resolved<'_, V> {}

/// Look a channel up in one table.
#[must_use]
pub fn resolve<'a, V>(channel: &SensorChannel, table: &'a Branch<V>) -> Resolved<'a, V> {
    let levels = [
        channel.sensor_type.as_deref(),
        channel.data_type.as_deref(),
        channel.subtype.as_deref(),
    ];

    let mut current = table;
    for level in levels {
        let Some(key) = level else {
            return Resolved::Branch(current);
        };
        match current.get(key) {
            None => return Resolved::Absent,
            Some(Node::Leaf(value)) => return Resolved::Leaf(value),
            Some(Node::Branch(next)) => current = next,
        }
    }

    Resolved::Branch(current)
}

/// Lookups against the tables of one generation.
#[derive(Debug, Clone, Copy)]
pub struct CapabilityMapper {
    tables: &'static CapabilityTables,
}

impl CapabilityMapper {
    /// Mapper for the given generation.
    #[must_use]
    pub fn new(generation: Generation) -> Self {
        Self {
            tables: CapabilityTables::for_generation(generation),
        }
    }

    /// Generation whose tables are used.
    #[must_use]
    pub fn generation(&self) -> Generation {
        self.tables.generation
    }

    /// Representations the channel expands to.
    #[must_use]
    pub fn representations(&self, channel: &SensorChannel) -> Resolved<'static, Vec<Representation>> {
        resolve(channel, &self.tables.data_types)
    }

    /// Unit of measurement.
    #[must_use]
    pub fn unit(&self, channel: &SensorChannel) -> Option<&'static str> {
        resolve(channel, &self.tables.units).leaf().copied()
    }

    /// Device class.
    #[must_use]
    pub fn device_class(&self, channel: &SensorChannel) -> Option<DeviceClass> {
        resolve(channel, &self.tables.device_classes).leaf().copied()
    }

    /// Icon.
    #[must_use]
    pub fn icon(&self, channel: &SensorChannel) -> Option<&'static str> {
        resolve(channel, &self.tables.icons).leaf().copied()
    }

    /// State class.
    #[must_use]
    pub fn state_class(&self, channel: &SensorChannel) -> Option<StateClass> {
        resolve(channel, &self.tables.state_classes).leaf().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::{units, SENSOR_TYPES};
    use serde_json::json;

    fn channel(value: serde_json::Value) -> SensorChannel {
        SensorChannel::from_value(&value).unwrap()
    }

    #[test]
    fn unknown_type_is_absent() {
        let tables = CapabilityTables::for_generation(Generation::Gen3);
        let c = channel(json!({"id": "x", "type": "radiation"}));
        assert!(resolve(&c, &tables.units).is_absent());
        assert!(resolve(&c, &tables.data_types).is_absent());
    }

    #[test]
    fn missing_data_type_stops_at_type_level() {
        let tables = CapabilityTables::for_generation(Generation::Gen3);
        let c = channel(json!({"id": "x", "type": "electricity", "subtype": "pf"}));
        let Resolved::Branch(branch) = resolve(&c, &tables.units) else {
            panic!("expected the electricity branch");
        };
        assert!(branch.contains("gauge"));
        assert!(branch.contains("counter"));
    }

    #[test]
    fn missing_type_returns_root() {
        let tables = CapabilityTables::for_generation(Generation::Gen2);
        let c = channel(json!({"id": "x"}));
        assert_eq!(resolve(&c, &tables.icons), Resolved::Branch(&tables.icons));
    }

    #[test]
    fn leaf_ends_walk_regardless_of_deeper_attributes() {
        let mapper = CapabilityMapper::new(Generation::Gen3);
        let c = channel(json!({"id": "x", "type": "temperature", "data_type": "gauge", "subtype": "x"}));
        assert_eq!(mapper.unit(&c), Some(units::CELSIUS));
    }

    #[test]
    fn unknown_data_type_is_absent_not_defaulted() {
        let mapper = CapabilityMapper::new(Generation::Gen3);
        let c = channel(json!({"id": "x", "type": "water", "data_type": "rate"}));
        assert_eq!(mapper.unit(&c), None);
        assert!(mapper.representations(&c).is_absent());
    }

    #[test]
    fn generation_changes_electricity_lookups() {
        let pf = channel(json!({
            "id": "x", "type": "electricity", "data_type": "gauge", "subtype": "pf"
        }));
        let gen3 = CapabilityMapper::new(Generation::Gen3);
        let gen2 = CapabilityMapper::new(Generation::Gen2);

        assert_eq!(gen3.unit(&pf), Some(units::PERCENTAGE));
        assert_eq!(gen3.device_class(&pf), Some(DeviceClass::PowerFactor));
        assert_eq!(gen2.unit(&pf), Some(units::WATT));
        assert_eq!(gen2.device_class(&pf), Some(DeviceClass::Power));
        assert!(gen2.representations(&pf).is_absent());
    }

    #[test]
    fn lookups_never_panic_over_type_universe() {
        for generation in Generation::ALL {
            let mapper = CapabilityMapper::new(generation);
            for t in SENSOR_TYPES {
                for dt in [None, Some("gauge"), Some("counter"), Some("bogus")] {
                    for st in [None, Some("pf"), Some("pplus"), Some("bogus")] {
                        let c = SensorChannel {
                            sensor_type: Some(t.to_string()),
                            data_type: dt.map(str::to_string),
                            subtype: st.map(str::to_string),
                            ..channel(json!({"id": "x"}))
                        };
                        let _ = mapper.unit(&c);
                        let _ = mapper.device_class(&c);
                        let _ = mapper.icon(&c);
                        let _ = mapper.state_class(&c);
                        let _ = mapper.representations(&c);
                    }
                }
            }
        }
    }

    #[test]
    fn state_class_follows_native_data_type() {
        let mapper = CapabilityMapper::new(Generation::Gen2);
        let counter = channel(json!({"id": "x", "type": "gas", "data_type": "counter"}));
        let gauge = counter.with_data_type("gauge");
        assert_eq!(mapper.state_class(&counter), Some(StateClass::TotalIncreasing));
        assert_eq!(mapper.state_class(&gauge), Some(StateClass::Measurement));
        assert_eq!(mapper.icon(&counter), Some("mdi:fire"));
    }
}
