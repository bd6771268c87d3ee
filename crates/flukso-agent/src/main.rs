//! # Flukso Agent
//!
//! Discovers Flukso energy monitors on an MQTT broker and publishes their
//! sensors as Home Assistant discovery documents.
//!
//! ## Operation
//!
//! 1. **Discovery**: for each configured device (and, with auto-discovery,
//!    each device announcing a sensor config) collect its configuration and
//!    identity over MQTT
//! 2. **Mapping**: derive entity descriptors from the device's channels
//! 3. **Hand-off**: publish one retained discovery document per entity,
//!    retracting entities that disappeared

use anyhow::Result;
use tracing_subscriber::EnvFilter;

mod config;
mod publisher;
mod runtime;

pub use config::AgentConfig;
pub use runtime::Agent;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting Flukso agent");

    let config = AgentConfig::from_env()?;
    tracing::info!(
        broker = %config.mqtt_broker,
        devices = config.devices.len(),
        auto_discover = config.auto_discover,
        "Configuration loaded"
    );

    Agent::new(config).run().await?;

    Ok(())
}
