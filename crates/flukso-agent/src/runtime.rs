//! Agent runtime orchestration.

use crate::config::AgentConfig;
use crate::publisher::EntityPublisher;
use anyhow::{Context, Result};
use flukso_core::DeviceHash;
use flukso_discovery::{DeviceRegistry, DiscoveryCoordinator, DiscoveryError, MqttBus, PubSub};
use flukso_proto::TopicScheme;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinSet;

/// The main agent runtime.
pub struct Agent {
    config: AgentConfig,
}

impl Agent {
    /// Create a new agent.
    #[must_use]
    pub fn new(config: AgentConfig) -> Self {
        Self { config }
    }

    /// Run the agent until interrupted.
    ///
    /// # Errors
    ///
    /// Returns error if the broker cannot be reached or configured.
    pub async fn run(self) -> Result<()> {
        tracing::info!("Starting agent runtime");

        let bus = Arc::new(MqttBus::connect(&self.config.mqtt()).context("Failed to create MQTT bus")?);
        let result = self.serve(bus.clone()).await;
        bus.disconnect().await;
        result
    }

    async fn serve(&self, bus: Arc<dyn PubSub>) -> Result<()> {
        let topics = TopicScheme::new(&self.config.discovery_prefix);
        let registry = Arc::new(DeviceRegistry::new(DiscoveryCoordinator::new(
            Arc::clone(&bus),
            topics.clone(),
            self.config.timeouts,
        )));
        let publisher = Arc::new(EntityPublisher::new(Arc::clone(&bus), topics.clone()));
        let mut discoveries = JoinSet::new();

        for hash in &self.config.devices {
            spawn_discovery(&mut discoveries, &registry, &publisher, hash.clone());
        }

        let mut announcements = if self.config.auto_discover {
            let filter = topics.announcement_filter();
            tracing::info!(filter, "Following device announcements");
            Some(
                bus.subscribe(filter)
                    .await
                    .context("Failed to subscribe to device announcements")?,
            )
        } else {
            None
        };
        let mut announced: HashMap<DeviceHash, Vec<u8>> = HashMap::new();

        tracing::info!(devices = self.config.devices.len(), "Agent running, press Ctrl+C to stop");

        loop {
            tokio::select! {
                Some(message) = async {
                    match announcements.as_mut() {
                        Some(rx) => rx.recv().await,
                        None => std::future::pending().await,
                    }
                } => {
                    let Some(hash) = TopicScheme::announcement(&message.topic) else {
                        tracing::debug!(topic = %message.topic, "Ignoring announcement");
                        continue;
                    };
                    if message.payload.is_empty() {
                        continue;
                    }
                    if announced.get(&hash) == Some(&message.payload) {
                        continue;
                    }
                    announced.insert(hash.clone(), message.payload);
                    spawn_discovery(&mut discoveries, &registry, &publisher, hash);
                }

                Some(joined) = discoveries.join_next() => {
                    if let Err(e) = joined {
                        tracing::error!(error = %e, "Discovery task failed");
                    }
                }

                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Shutdown signal received");
                    break;
                }
            }
        }

        discoveries.shutdown().await;
        if let Some(subscription) = &announcements {
            if let Err(e) = bus.unsubscribe(subscription.id()).await {
                tracing::warn!(error = %e, "Failed to unsubscribe from announcements");
            }
        }

        tracing::info!("Agent stopped");
        Ok(())
    }
}

fn spawn_discovery(
    tasks: &mut JoinSet<()>,
    registry: &Arc<DeviceRegistry>,
    publisher: &Arc<EntityPublisher>,
    hash: DeviceHash,
) {
    let registry = Arc::clone(registry);
    let publisher = Arc::clone(publisher);
    tasks.spawn(async move {
        discover_and_publish(&registry, &publisher, &hash).await;
    });
}

async fn discover_and_publish(registry: &DeviceRegistry, publisher: &EntityPublisher, hash: &DeviceHash) {
    match registry.activate(hash).await {
        Ok(profile) => {
            if let Err(e) = publisher.publish(&profile).await {
                tracing::error!(device = %hash, error = %e, "Failed to publish entities");
            }
        }
        Err(DiscoveryError::AlreadyInProgress(_)) => {}
        Err(e) => {
            tracing::error!(device = %hash, error = %e, "Discovery failed");
            if let Err(e) = publisher.retract(hash).await {
                tracing::warn!(device = %hash, error = %e, "Failed to retract entities");
            }
        }
    }
}
