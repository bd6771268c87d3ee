//! Topic scheme of the Flukso discovery protocol.
//!
//! Device topics are rooted at `/` and split into five segments:
//!
//! - `/device/{hash}/config/{kind}`: JSON configuration documents
//! - `/device/{hash}/test/tap`: identity banner (Gen3 only)
//!
//! State is published on `/sensor/{channel id}/{data type}`. Entity
//! descriptors are handed to the host on
//! `{discovery_prefix}/{platform}/{unique_id}/config`.

use flukso_core::{ConfigKind, DeviceHash, DeviceHashError, Platform};
use serde::{Deserialize, Serialize};

/// Default host discovery prefix.
pub const DEFAULT_DISCOVERY_PREFIX: &str = "homeassistant";

/// Number of segments in a device topic, counting the empty leading one.
pub const DEVICE_TOPIC_SEGMENTS: usize = 5;

const HASH_SEGMENT: usize = 2;
const KIND_SEGMENT: usize = 4;

/// Topic scheme configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicScheme {
    /// Prefix for host discovery documents
    pub discovery_prefix: String,
}

impl Default for TopicScheme {
    fn default() -> Self {
        Self::new(DEFAULT_DISCOVERY_PREFIX)
    }
}

impl TopicScheme {
    /// Create a topic scheme with the given discovery prefix.
    #[must_use]
    pub fn new(discovery_prefix: impl Into<String>) -> Self {
        Self {
            discovery_prefix: discovery_prefix.into(),
        }
    }

    /// Subscription for every configuration document of a device.
    #[must_use]
    pub fn config_wildcard(&self, hash: &DeviceHash) -> String {
        format!("/device/{hash}/config/+")
    }

    /// Topic of one configuration document.
    #[must_use]
    pub fn config(&self, hash: &DeviceHash, kind: ConfigKind) -> String {
        format!("/device/{hash}/config/{kind}")
    }

    /// Topic of the identity banner.
    #[must_use]
    pub fn tap(&self, hash: &DeviceHash) -> String {
        format!("/device/{hash}/test/tap")
    }

    /// State topic of one channel representation.
    #[must_use]
    pub fn sensor_state(&self, channel_id: &str, data_type: &str) -> String {
        format!("/sensor/{channel_id}/{data_type}")
    }

    /// Subscription matching the sensor document of every device.
    #[must_use]
    pub fn announcement_filter(&self) -> &'static str {
        "/device/+/config/sensor"
    }

    /// Host discovery topic for an entity.
    #[must_use]
    pub fn discovery(&self, platform: Platform, unique_id: &str) -> String {
        format!("{}/{platform}/{unique_id}/config", self.discovery_prefix)
    }

    /// Device announced by a topic.
    ///
    /// Any five-segment topic whose third segment is a valid device hash
    /// counts as an announcement.
    #[must_use]
    pub fn announcement(topic: &str) -> Option<DeviceHash> {
        let segments: Vec<&str> = topic.split('/').collect();
        if segments.len() != DEVICE_TOPIC_SEGMENTS {
            return None;
        }
        DeviceHash::parse(segments[HASH_SEGMENT]).ok()
    }

    /// Parse a device topic.
    ///
    /// # Errors
    ///
    /// Returns error if the topic is not a device config or tap topic, or
    /// carries an invalid device hash.
    pub fn parse(&self, topic: &str) -> Result<DeviceTopic, TopicError> {
        let segments: Vec<&str> = topic.split('/').collect();
        if segments.len() != DEVICE_TOPIC_SEGMENTS || !segments[0].is_empty() || segments[1] != "device" {
            return Err(TopicError::NotADeviceTopic(topic.to_string()));
        }

        let device_hash = DeviceHash::parse(segments[HASH_SEGMENT])?;
        let message = match (segments[3], segments[KIND_SEGMENT]) {
            ("config", kind) => match kind.parse::<ConfigKind>() {
                Ok(kind) => DeviceMessage::Config(kind),
                Err(_) => DeviceMessage::UnknownConfig(kind.to_string()),
            },
            ("test", "tap") => DeviceMessage::Tap,
            _ => return Err(TopicError::NotADeviceTopic(topic.to_string())),
        };

        Ok(DeviceTopic {
            device_hash,
            message,
        })
    }
}

/// A parsed device topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceTopic {
    /// Device the topic belongs to
    pub device_hash: DeviceHash,
    /// What the topic carries
    pub message: DeviceMessage,
}

/// Message carried on a device topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceMessage {
    /// A configuration document
    Config(ConfigKind),
    /// A configuration topic with a kind nobody knows
    UnknownConfig(String),
    /// The identity banner
    Tap,
}

/// Errors parsing topics.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TopicError {
    /// Topic is not a device config or tap topic
    #[error("not a device topic: {0}")]
    NotADeviceTopic(String),
    /// Hash segment is not a device hash
    #[error("invalid device hash: {0}")]
    InvalidHash(#[from] DeviceHashError),
}

/// Whether an MQTT topic filter matches a topic name.
///
/// `+` matches exactly one level and `#` the remaining levels, including
/// none.
#[must_use]
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');

    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => {}
            (Some(f), Some(t)) if f == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}
