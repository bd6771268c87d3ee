//! Hands entity descriptors to the host as retained discovery documents.

use anyhow::{Context, Result};
use flukso_core::{build_entities, DeviceHash, DeviceProfile, EntityReport};
use flukso_discovery::PubSub;
use flukso_proto::TopicScheme;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Publishes and retracts host discovery documents per device.
pub struct EntityPublisher {
    bus: Arc<dyn PubSub>,
    topics: TopicScheme,
    published: Mutex<HashMap<DeviceHash, BTreeSet<String>>>,
}

impl EntityPublisher {
    /// Create a publisher.
    pub fn new(bus: Arc<dyn PubSub>, topics: TopicScheme) -> Self {
        Self {
            bus,
            topics,
            published: Mutex::new(HashMap::new()),
        }
    }

    /// Build and publish the entities of a device.
    ///
    /// Entities published for an earlier profile of the same device that no
    /// longer exist are retracted.
    ///
    /// # Errors
    ///
    /// Returns error if a document cannot be encoded or published.
    pub async fn publish(&self, profile: &DeviceProfile) -> Result<EntityReport> {
        let report = build_entities(profile);
        for issue in &report.issues {
            tracing::error!(device = %profile.hash, %issue, "Entity not created");
        }

        let mut topics = BTreeSet::new();
        for descriptor in report.descriptors() {
            let topic = self.topics.discovery(descriptor.platform, &descriptor.unique_id);
            let payload = serde_json::to_vec(descriptor)
                .with_context(|| format!("Failed to encode {}", descriptor.unique_id))?;
            self.bus
                .publish(&topic, payload, true)
                .await
                .with_context(|| format!("Failed to publish {topic}"))?;
            topics.insert(topic);
        }

        let previous = self
            .published
            .lock()
            .await
            .insert(profile.hash.clone(), topics.clone())
            .unwrap_or_default();
        self.clear(&profile.hash, previous.difference(&topics)).await?;

        tracing::info!(
            device = %profile.hash,
            sensors = report.sensors.len(),
            binary_sensors = report.binary_sensors.len(),
            issues = report.issues.len(),
            "Published entities"
        );
        Ok(report)
    }

    /// Retract every entity of a device.
    ///
    /// # Errors
    ///
    /// Returns error if a retraction cannot be published.
    pub async fn retract(&self, hash: &DeviceHash) -> Result<()> {
        let previous = self.published.lock().await.remove(hash).unwrap_or_default();
        if !previous.is_empty() {
            tracing::info!(device = %hash, entities = previous.len(), "Retracting entities");
        }
        self.clear(hash, previous.iter()).await
    }

    async fn clear<'a>(&self, hash: &DeviceHash, topics: impl Iterator<Item = &'a String>) -> Result<()> {
        for topic in topics {
            tracing::debug!(device = %hash, topic = %topic, "Removing entity");
            self.bus
                .publish(topic, Vec::new(), true)
                .await
                .with_context(|| format!("Failed to clear {topic}"))?;
        }
        Ok(())
    }
}
