//! # Flukso Discovery
//!
//! Discovers Flukso devices over a publish/subscribe broker.
//!
//! ## Protocol
//!
//! For each device hash a [`DiscoveryCoordinator`] subscribes to the
//! device's config and tap topics, collects the sensor, kube and flx
//! documents, and infers the hardware generation from the identity banner.
//! The [`DeviceRegistry`] keeps the latest result per device.
//!
//! ## Brokers
//!
//! - [`MemoryBus`]: in-process, for tests and embedding
//! - [`MqttBus`]: MQTT via `rumqttc`

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bus;
pub mod coordinator;
pub mod mqtt;
pub mod registry;

pub use bus::{BusError, BusMessage, MemoryBus, PubSub, Subscription, SubscriptionId};
pub use coordinator::{DiscoveryCoordinator, DiscoveryError, DiscoveryPhase, DiscoveryTimeouts};
pub use mqtt::{parse_mqtt_url, MqttBus, MqttBusConfig};
pub use registry::DeviceRegistry;
