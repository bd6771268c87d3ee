//! Device identity, hardware generation and the per-device discovery result.
//!
//! A Flukso device is addressed by a 32-character hash. Everything the
//! discovery protocol learns about it is collected into a [`DeviceProfile`],
//! which is replaced as a whole on every discovery run.

use crate::documents::ConfigDocuments;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Length of a device hash.
pub const DEVICE_HASH_LEN: usize = 32;

/// Integration domain, used to build stable device identifiers.
pub const DOMAIN: &str = "flukso";

/// Manufacturer reported in device metadata.
pub const MANUFACTURER: &str = "Flukso";

/// Opaque, fixed-length device identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceHash(String);

impl DeviceHash {
    /// Validate and wrap a device hash.
    ///
    /// # Errors
    ///
    /// Returns error if the value is not exactly 32 characters long or
    /// contains a character that is not allowed inside a topic segment.
    pub fn parse(value: impl Into<String>) -> Result<Self, DeviceHashError> {
        let value = value.into();
        let actual = value.chars().count();
        if actual != DEVICE_HASH_LEN {
            return Err(DeviceHashError::InvalidLength {
                expected: DEVICE_HASH_LEN,
                actual,
            });
        }
        if let Some(c) = value
            .chars()
            .find(|&c| matches!(c, '/' | '+' | '#') || c.is_whitespace())
        {
            return Err(DeviceHashError::InvalidCharacter(c));
        }
        Ok(Self(value))
    }

    /// Borrow the hash as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Stable identifier used to group entities under one host device.
    #[must_use]
    pub fn device_identifier(&self) -> String {
        format!("{DOMAIN}_{}", self.0)
    }
}

impl fmt::Display for DeviceHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for DeviceHash {
    type Err = DeviceHashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for DeviceHash {
    type Error = DeviceHashError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<DeviceHash> for String {
    fn from(hash: DeviceHash) -> Self {
        hash.0
    }
}

impl AsRef<str> for DeviceHash {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Errors for device hash validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeviceHashError {
    /// Hash has the wrong length
    #[error("device hash must be {expected} characters, got {actual}")]
    InvalidLength {
        /// Required length
        expected: usize,
        /// Length of the rejected value
        actual: usize,
    },
    /// Hash contains a character that cannot appear in a topic segment
    #[error("device hash contains invalid character {0:?}")]
    InvalidCharacter(char),
}

/// Hardware generation, inferred from the presence of the identity banner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Generation {
    /// FLM02: never publishes an identity banner
    Gen2,
    /// FLM03: publishes serial and firmware on the tap topic
    Gen3,
}

impl Generation {
    /// Both generations, oldest first.
    pub const ALL: [Generation; 2] = [Generation::Gen2, Generation::Gen3];

    /// Classify a device from whether it answered with an identity banner.
    #[must_use]
    pub fn from_banner(identity: Option<&Identity>) -> Self {
        if identity.is_some() {
            Self::Gen3
        } else {
            Self::Gen2
        }
    }

    /// Product model name of this generation.
    #[must_use]
    pub fn model(self) -> &'static str {
        match self {
            Self::Gen2 => "FLM02",
            Self::Gen3 => "FLM03",
        }
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.model())
    }
}

/// Serial number and firmware version extracted from the identity banner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Device serial number
    pub serial: String,
    /// Firmware version string
    pub firmware: String,
}

/// Everything one discovery run learned about a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceProfile {
    /// Device hash
    pub hash: DeviceHash,
    /// Detected hardware generation
    pub generation: Generation,
    /// Identity banner contents (Gen3 only)
    pub identity: Option<Identity>,
    /// Configuration documents published by the device
    pub documents: ConfigDocuments,
}

impl DeviceProfile {
    /// Assemble a profile; the generation follows from the identity.
    #[must_use]
    pub fn new(hash: DeviceHash, identity: Option<Identity>, documents: ConfigDocuments) -> Self {
        Self {
            generation: Generation::from_banner(identity.as_ref()),
            hash,
            identity,
            documents,
        }
    }
}

/// Host-facing device metadata attached to every entity descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceMetadata {
    /// Stable identifiers used to group entities
    pub identifiers: Vec<String>,
    /// Connections (always empty for Flukso devices)
    pub connections: Vec<(String, String)>,
    /// Manufacturer name
    pub manufacturer: String,
    /// Device model (FLM02 / FLM03)
    pub model: String,
    /// Display name: serial when known, hash otherwise
    pub name: String,
    /// Firmware version, `unknown` when the banner was not received
    pub sw_version: String,
}

impl DeviceMetadata {
    /// Derive the metadata for a discovered device.
    #[must_use]
    pub fn for_profile(profile: &DeviceProfile) -> Self {
        let (name, sw_version) = match &profile.identity {
            Some(identity) => (identity.serial.clone(), identity.firmware.clone()),
            None => (profile.hash.to_string(), "unknown".to_string()),
        };
        Self {
            identifiers: vec![profile.hash.device_identifier()],
            connections: Vec::new(),
            manufacturer: MANUFACTURER.to_string(),
            model: profile.generation.model().to_string(),
            name,
            sw_version,
        }
    }
}
