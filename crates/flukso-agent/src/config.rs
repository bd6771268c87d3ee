//! Agent configuration.

use anyhow::{Context, Result};
use flukso_core::DeviceHash;
use flukso_discovery::{DiscoveryTimeouts, MqttBusConfig};
use flukso_proto::topics::DEFAULT_DISCOVERY_PREFIX;
use std::time::Duration;
use uuid::Uuid;

/// Agent configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// MQTT broker URL
    pub mqtt_broker: String,

    /// MQTT client ID; generated when not set
    pub client_id: Option<String>,

    /// MQTT keep-alive interval
    pub keep_alive: Duration,

    /// Devices to discover at startup
    pub devices: Vec<DeviceHash>,

    /// Discover devices as they announce themselves
    pub auto_discover: bool,

    /// Discovery waits
    pub timeouts: DiscoveryTimeouts,

    /// Prefix of host discovery topics
    pub discovery_prefix: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            mqtt_broker: "tcp://localhost:1883".to_string(),
            client_id: None,
            keep_alive: Duration::from_secs(30),
            devices: Vec::new(),
            auto_discover: false,
            timeouts: DiscoveryTimeouts::default(),
            discovery_prefix: DEFAULT_DISCOVERY_PREFIX.to_string(),
        }
    }
}

impl AgentConfig {
    /// Load configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `FLUKSO_MQTT_BROKER`: MQTT broker URL
    /// - `FLUKSO_CLIENT_ID`: MQTT client ID
    /// - `FLUKSO_DEVICES`: comma separated device hashes
    /// - `FLUKSO_AUTO_DISCOVER`: `true`/`1` to follow device announcements
    /// - `FLUKSO_CONFIG_TIMEOUT_MS`: wait for config documents
    /// - `FLUKSO_TAP_TIMEOUT_MS`: wait for the identity banner
    /// - `FLUKSO_DISCOVERY_PREFIX`: host discovery prefix
    ///
    /// # Errors
    ///
    /// Returns error if a variable is set to an invalid value.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(mqtt) = lookup("FLUKSO_MQTT_BROKER") {
            config.mqtt_broker = mqtt;
        }

        if let Some(client_id) = lookup("FLUKSO_CLIENT_ID") {
            config.client_id = Some(client_id);
        }

        if let Some(devices) = lookup("FLUKSO_DEVICES") {
            config.devices = devices
                .split(',')
                .map(str::trim)
                .filter(|hash| !hash.is_empty())
                .map(|hash| {
                    DeviceHash::parse(hash).with_context(|| format!("Invalid device hash in FLUKSO_DEVICES: {hash}"))
                })
                .collect::<Result<_>>()?;
        }

        if let Some(flag) = lookup("FLUKSO_AUTO_DISCOVER") {
            config.auto_discover = parse_flag(&flag).context("Invalid FLUKSO_AUTO_DISCOVER")?;
        }

        if let Some(ms) = lookup("FLUKSO_CONFIG_TIMEOUT_MS") {
            config.timeouts.config = parse_millis(&ms).context("Invalid FLUKSO_CONFIG_TIMEOUT_MS")?;
        }

        if let Some(ms) = lookup("FLUKSO_TAP_TIMEOUT_MS") {
            config.timeouts.tap = parse_millis(&ms).context("Invalid FLUKSO_TAP_TIMEOUT_MS")?;
        }

        if let Some(prefix) = lookup("FLUKSO_DISCOVERY_PREFIX") {
            config.discovery_prefix = prefix;
        }

        Ok(config)
    }

    /// MQTT connection settings; a random client ID is used when none is set.
    #[must_use]
    pub fn mqtt(&self) -> MqttBusConfig {
        MqttBusConfig {
            mqtt_broker: self.mqtt_broker.clone(),
            client_id: self
                .client_id
                .clone()
                .unwrap_or_else(|| format!("flukso-agent-{}", Uuid::new_v4())),
            keep_alive: self.keep_alive,
        }
    }
}

fn parse_flag(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => anyhow::bail!("expected a boolean, got '{other}'"),
    }
}

fn parse_millis(value: &str) -> Result<Duration> {
    let ms: u64 = value.trim().parse().context("expected milliseconds")?;
    Ok(Duration::from_millis(ms))
}
