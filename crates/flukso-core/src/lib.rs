//! # Flukso Core
//!
//! Device model and capability mapping for Flukso energy monitors.
//!
//! This crate provides:
//! - Device hashes, hardware generations and discovered device profiles
//! - Configuration documents (sensor, kube, flx) as published by devices
//! - Generation-keyed capability tables and the lookup over them
//! - Value transforms for state payloads
//! - The entity descriptor builder that ties everything together

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod channel;
pub mod device;
pub mod documents;
pub mod entity;
pub mod mapper;
pub mod tables;
pub mod transform;

pub use channel::{IndexRef, SensorChannel};
pub use device::{DeviceHash, DeviceHashError, DeviceMetadata, DeviceProfile, Generation, Identity};
pub use documents::{AuxDocument, ConfigDocument, ConfigDocuments, ConfigKind, DocumentError, SensorDocument};
pub use entity::{
    build_entities, BuildError, BuildIssue, EntityBuilder, EntityCategory, EntityDescriptor, EntityReport,
    Platform,
};
pub use mapper::{CapabilityMapper, Resolved};
pub use tables::{CapabilityTables, DeviceClass, Representation, StateClass};
pub use transform::{Reading, StateValue, TransformError, ValueTransform};
