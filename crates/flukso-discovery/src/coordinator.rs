//! Per-device discovery run.
//!
//! A run subscribes to the device's config and tap topics, collects the
//! configuration documents within `config_timeout`, then waits up to
//! `tap_timeout` for the identity banner. Both subscriptions are dropped
//! before the run returns, whatever the outcome. A run cancelled from
//! outside unsubscribes from a spawned task.

use crate::bus::{BusError, BusMessage, PubSub, Subscription, SubscriptionId};
use flukso_core::{
    AuxDocument, ConfigDocument, ConfigDocuments, ConfigKind, DeviceHash, DeviceProfile, Generation,
    Identity, SensorDocument,
};
use flukso_proto::{parse_banner, DeviceMessage, TopicScheme};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

/// Default wait for configuration documents.
pub const DEFAULT_CONFIG_TIMEOUT: Duration = Duration::from_secs(2);

/// Default wait for the identity banner.
pub const DEFAULT_TAP_TIMEOUT: Duration = Duration::from_secs(2);

/// Bounded waits of a discovery run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryTimeouts {
    /// Wait for the configuration documents
    pub config: Duration,
    /// Wait for the identity banner
    pub tap: Duration,
}

impl Default for DiscoveryTimeouts {
    fn default() -> Self {
        Self {
            config: DEFAULT_CONFIG_TIMEOUT,
            tap: DEFAULT_TAP_TIMEOUT,
        }
    }
}

/// Where a discovery run is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryPhase {
    /// Not started
    Idle,
    /// Config and tap subscriptions are in place
    Subscribed,
    /// Waiting for the sensor document
    SensorPending,
    /// Sensor document received
    SensorDone,
    /// Waiting for kube and flx documents
    OptionalPending,
    /// Optional documents received or given up on
    OptionalDone,
    /// Waiting for the identity banner
    GenerationPending,
    /// Generation decided
    GenerationDone,
    /// Profile assembled
    Finalized,
}

impl fmt::Display for DiscoveryPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Errors from a discovery run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DiscoveryError {
    /// The device published no usable sensor document in time
    #[error("no sensor config received from device {0}")]
    SensorConfigTimeout(DeviceHash),
    /// The device is already being discovered
    #[error("discovery already in progress for device {0}")]
    AlreadyInProgress(DeviceHash),
    /// Broker error
    #[error("bus error: {0}")]
    Bus(#[from] BusError),
}

/// Runs discovery against a bus.
#[derive(Clone)]
pub struct DiscoveryCoordinator {
    bus: Arc<dyn PubSub>,
    topics: TopicScheme,
    timeouts: DiscoveryTimeouts,
}

impl DiscoveryCoordinator {
    /// Create a coordinator.
    #[must_use]
    pub fn new(bus: Arc<dyn PubSub>, topics: TopicScheme, timeouts: DiscoveryTimeouts) -> Self {
        Self {
            bus,
            topics,
            timeouts,
        }
    }

    /// Topic scheme in use.
    #[must_use]
    pub fn topics(&self) -> &TopicScheme {
        &self.topics
    }

    /// Bus in use.
    #[must_use]
    pub fn bus(&self) -> &Arc<dyn PubSub> {
        &self.bus
    }

    /// Discover one device.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::SensorConfigTimeout`] if no sensor document
    /// arrives within the config timeout, or [`DiscoveryError::Bus`] if a
    /// subscription cannot be set up.
    pub async fn discover(&self, hash: &DeviceHash) -> Result<DeviceProfile, DiscoveryError> {
        let mut teardown = Teardown::new(Arc::clone(&self.bus), hash.clone());

        let mut configs = self.bus.subscribe(&self.topics.config_wildcard(hash)).await?;
        teardown.track(configs.id());
        let mut tap = match self.bus.subscribe(&self.topics.tap(hash)).await {
            Ok(rx) => rx,
            Err(e) => {
                teardown.run().await;
                return Err(e.into());
            }
        };
        teardown.track(tap.id());

        let result = self.collect(hash, &mut configs, &mut tap).await;
        teardown.run().await;
        result
    }

    async fn collect(
        &self,
        hash: &DeviceHash,
        configs: &mut Subscription,
        tap: &mut Subscription,
    ) -> Result<DeviceProfile, DiscoveryError> {
        let mut run = DiscoveryRun::new(hash, &self.topics);
        run.advance(DiscoveryPhase::Subscribed);
        run.advance(DiscoveryPhase::SensorPending);

        let configs_complete = timeout(self.timeouts.config, async {
            while !run.has_all_configs() {
                tokio::select! {
                    Some(message) = configs.recv() => run.on_config(&message),
                    Some(message) = tap.recv() => run.on_tap(&message),
                    else => break,
                }
            }
        })
        .await
        .is_ok();

        if !run.has(ConfigKind::Sensor) {
            tracing::error!(device = %hash, "No sensor config received, giving up");
            return Err(DiscoveryError::SensorConfigTimeout(hash.clone()));
        }
        run.advance(DiscoveryPhase::SensorDone);
        run.advance(DiscoveryPhase::OptionalPending);
        if !configs_complete {
            for kind in [ConfigKind::Kube, ConfigKind::Flx] {
                if !run.has(kind) {
                    tracing::info!(device = %hash, kind = %kind, "Config not received, continuing without it");
                }
            }
        }
        run.advance(DiscoveryPhase::OptionalDone);

        run.advance(DiscoveryPhase::GenerationPending);
        if run.identity.is_none() {
            let banner = timeout(self.timeouts.tap, async {
                while run.identity.is_none() {
                    tokio::select! {
                        Some(message) = tap.recv() => run.on_tap(&message),
                        Some(message) = configs.recv() => run.on_config(&message),
                        else => break,
                    }
                }
            })
            .await;
            if banner.is_err() {
                tracing::info!(device = %hash, "No identity banner received");
            }
        }
        run.advance(DiscoveryPhase::GenerationDone);

        Ok(run.finalize())
    }
}

/// Unsubscribes a run's subscriptions.
///
/// [`Teardown::run`] does it in place. If the run is dropped first, the
/// remaining subscriptions are released from a task on the current runtime.
struct Teardown {
    bus: Arc<dyn PubSub>,
    hash: DeviceHash,
    subscriptions: Vec<SubscriptionId>,
}

impl Teardown {
    fn new(bus: Arc<dyn PubSub>, hash: DeviceHash) -> Self {
        Self {
            bus,
            hash,
            subscriptions: Vec::new(),
        }
    }

    fn track(&mut self, subscription: &SubscriptionId) {
        self.subscriptions.push(subscription.clone());
    }

    async fn run(&mut self) {
        // Popped only once released, so a cancelled teardown leaves the rest to `drop`.
        while let Some(subscription) = self.subscriptions.last() {
            unsubscribe(self.bus.as_ref(), &self.hash, subscription).await;
            self.subscriptions.pop();
        }
    }
}

impl Drop for Teardown {
    fn drop(&mut self) {
        if self.subscriptions.is_empty() {
            return;
        }
        let subscriptions = std::mem::take(&mut self.subscriptions);
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(device = %self.hash, "Discovery dropped outside a runtime, subscriptions left open");
            return;
        };

        tracing::debug!(device = %self.hash, "Discovery cancelled, releasing subscriptions");
        let bus = Arc::clone(&self.bus);
        let hash = self.hash.clone();
        runtime.spawn(async move {
            for subscription in &subscriptions {
                unsubscribe(bus.as_ref(), &hash, subscription).await;
            }
        });
    }
}

async fn unsubscribe(bus: &dyn PubSub, hash: &DeviceHash, subscription: &SubscriptionId) {
    if let Err(e) = bus.unsubscribe(subscription).await {
        tracing::warn!(device = %hash, filter = subscription.filter(), error = %e, "Failed to unsubscribe");
    }
}

/// State of one run.
struct DiscoveryRun<'a> {
    hash: &'a DeviceHash,
    topics: &'a TopicScheme,
    phase: DiscoveryPhase,
    sensor: Option<SensorDocument>,
    kube: Option<AuxDocument>,
    flx: Option<AuxDocument>,
    received: HashSet<ConfigKind>,
    identity: Option<Identity>,
}

impl<'a> DiscoveryRun<'a> {
    fn new(hash: &'a DeviceHash, topics: &'a TopicScheme) -> Self {
        Self {
            hash,
            topics,
            phase: DiscoveryPhase::Idle,
            sensor: None,
            kube: None,
            flx: None,
            received: HashSet::new(),
            identity: None,
        }
    }

    fn advance(&mut self, phase: DiscoveryPhase) {
        tracing::debug!(device = %self.hash, from = %self.phase, to = %phase, "Discovery phase");
        self.phase = phase;
    }

    fn has(&self, kind: ConfigKind) -> bool {
        self.received.contains(&kind)
    }

    fn has_all_configs(&self) -> bool {
        ConfigKind::ALL.iter().all(|kind| self.has(*kind))
    }

    fn on_config(&mut self, message: &BusMessage) {
        let kind = match self.topics.parse(&message.topic) {
            Ok(parsed) if &parsed.device_hash != self.hash => {
                tracing::warn!(device = %self.hash, topic = %message.topic, "Config for another device, ignoring");
                return;
            }
            Ok(parsed) => match parsed.message {
                DeviceMessage::Config(kind) => kind,
                DeviceMessage::UnknownConfig(kind) => {
                    tracing::warn!(device = %self.hash, kind = %kind, "Unknown config kind, ignoring");
                    return;
                }
                DeviceMessage::Tap => return,
            },
            Err(e) => {
                tracing::warn!(device = %self.hash, topic = %message.topic, error = %e, "Unexpected topic, ignoring");
                return;
            }
        };

        let document = match ConfigDocument::parse(kind, &message.payload) {
            Ok(document) => document,
            Err(e) => {
                tracing::warn!(device = %self.hash, kind = %kind, error = %e, "Malformed config, ignoring");
                return;
            }
        };

        match document {
            ConfigDocument::Sensor(doc) => self.sensor = Some(doc),
            ConfigDocument::Kube(doc) => self.kube = Some(doc),
            ConfigDocument::Flx(doc) => self.flx = Some(doc),
        }

        if self.received.insert(kind) {
            tracing::debug!(device = %self.hash, kind = %kind, "Config received");
        } else {
            tracing::debug!(device = %self.hash, kind = %kind, "Config updated");
        }
    }

    fn on_tap(&mut self, message: &BusMessage) {
        match parse_banner(&message.payload) {
            Ok(identity) => {
                tracing::debug!(device = %self.hash, serial = %identity.serial, "Identity banner received");
                self.identity = Some(identity);
            }
            Err(e) => {
                tracing::warn!(device = %self.hash, error = %e, "Identity banner ignored");
            }
        }
    }

    fn finalize(mut self) -> DeviceProfile {
        self.advance(DiscoveryPhase::Finalized);
        let documents = ConfigDocuments {
            sensor: self.sensor.unwrap_or_default(),
            kube: self.kube,
            flx: self.flx,
        };
        let profile = DeviceProfile::new(self.hash.clone(), self.identity, documents);

        match (&profile.generation, &profile.identity) {
            (Generation::Gen3, Some(identity)) => tracing::info!(
                device = %profile.hash,
                serial = %identity.serial,
                firmware = %identity.firmware,
                "Discovered FLM03"
            ),
            _ => tracing::info!(device = %profile.hash, "Discovered FLM02"),
        }
        profile
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::MemoryBus;

    const HASH: &str = "0123456789abcdef0123456789abcdef";
    const SENSOR: &[u8] = br#"{"1": {"id": "a", "enable": 1, "type": "gas", "data_type": "counter"}}"#;
    const BANNER: &[u8] = b"# serial: FL03001234\n# firmware: 3.0.1\n";

    fn hash() -> DeviceHash {
        DeviceHash::parse(HASH).unwrap()
    }

    fn coordinator(bus: &Arc<MemoryBus>) -> DiscoveryCoordinator {
        DiscoveryCoordinator::new(bus.clone(), TopicScheme::default(), DiscoveryTimeouts::default())
    }

    async fn retain(bus: &MemoryBus, topic: String, payload: &[u8]) {
        bus.publish(&topic, payload.to_vec(), true).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn sensor_only_is_gen2() {
        let bus = Arc::new(MemoryBus::new());
        retain(&bus, format!("/device/{HASH}/config/sensor"), SENSOR).await;

        let profile = coordinator(&bus).discover(&hash()).await.unwrap();
        assert_eq!(profile.generation, Generation::Gen2);
        assert!(profile.identity.is_none());
        assert_eq!(profile.documents.sensor.len(), 1);
        assert!(profile.documents.kube.is_none());
        assert!(bus.active_filters().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn full_set_with_banner_is_gen3() {
        let bus = Arc::new(MemoryBus::new());
        retain(&bus, format!("/device/{HASH}/config/sensor"), SENSOR).await;
        retain(&bus, format!("/device/{HASH}/config/kube"), br#"{"1": {"name": "Attic"}}"#).await;
        retain(&bus, format!("/device/{HASH}/config/flx"), br#"{"1": {"name": "Grid"}}"#).await;
        retain(&bus, format!("/device/{HASH}/test/tap"), BANNER).await;

        let started = tokio::time::Instant::now();
        let profile = coordinator(&bus).discover(&hash()).await.unwrap();
        assert!(started.elapsed() < DEFAULT_CONFIG_TIMEOUT);
        assert_eq!(profile.generation, Generation::Gen3);
        assert_eq!(profile.identity.unwrap().serial, "FL03001234");
        assert_eq!(profile.documents.kube.unwrap().name("1"), Some("Attic"));
        assert_eq!(profile.documents.flx.unwrap().name("1"), Some("Grid"));
        assert!(bus.active_filters().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_published_fails_and_tears_down() {
        let bus = Arc::new(MemoryBus::new());
        let err = coordinator(&bus).discover(&hash()).await.unwrap_err();
        assert_eq!(err, DiscoveryError::SensorConfigTimeout(hash()));
        assert!(bus.active_filters().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_sensor_config_is_not_stored() {
        let bus = Arc::new(MemoryBus::new());
        retain(&bus, format!("/device/{HASH}/config/sensor"), b"{not json").await;
        retain(&bus, format!("/device/{HASH}/config/kube"), b"{}").await;

        let err = coordinator(&bus).discover(&hash()).await.unwrap_err();
        assert!(matches!(err, DiscoveryError::SensorConfigTimeout(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_kind_and_partial_banner_are_ignored() {
        let bus = Arc::new(MemoryBus::new());
        retain(&bus, format!("/device/{HASH}/config/sensor"), SENSOR).await;
        retain(&bus, format!("/device/{HASH}/config/wifi"), b"{}").await;
        retain(&bus, format!("/device/{HASH}/test/tap"), b"# serial: FL03001234\n").await;

        let profile = coordinator(&bus).discover(&hash()).await.unwrap();
        assert_eq!(profile.generation, Generation::Gen2);
        assert!(profile.identity.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn late_config_overwrites_earlier_document() {
        let bus = Arc::new(MemoryBus::new());
        retain(&bus, format!("/device/{HASH}/config/sensor"), SENSOR).await;

        let publisher = {
            let bus = bus.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(500)).await;
                let updated = br#"{"1": {"id": "a"}, "2": {"id": "b"}}"#;
                bus.publish(&format!("/device/{HASH}/config/sensor"), updated.to_vec(), false)
                    .await
                    .unwrap();
            })
        };

        let profile = coordinator(&bus).discover(&hash()).await.unwrap();
        publisher.await.unwrap();
        assert_eq!(profile.documents.sensor.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn banner_arriving_during_tap_wait_is_used() {
        let bus = Arc::new(MemoryBus::new());
        retain(&bus, format!("/device/{HASH}/config/sensor"), SENSOR).await;

        let publisher = {
            let bus = bus.clone();
            tokio::spawn(async move {
                tokio::time::sleep(DEFAULT_CONFIG_TIMEOUT + Duration::from_millis(500)).await;
                bus.publish(&format!("/device/{HASH}/test/tap"), BANNER.to_vec(), false)
                    .await
                    .unwrap();
            })
        };

        let profile = coordinator(&bus).discover(&hash()).await.unwrap();
        publisher.await.unwrap();
        assert_eq!(profile.generation, Generation::Gen3);
        assert_eq!(profile.identity.unwrap().firmware, "3.0.1");
    }

    #[tokio::test(start_paused = true)]
    async fn other_devices_do_not_leak_in() {
        let bus = Arc::new(MemoryBus::new());
        let other = "ffffffffffffffffffffffffffffffff";
        retain(&bus, format!("/device/{other}/config/sensor"), SENSOR).await;

        let err = coordinator(&bus).discover(&hash()).await.unwrap_err();
        assert_eq!(err, DiscoveryError::SensorConfigTimeout(hash()));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_run_releases_subscriptions() {
        let bus = Arc::new(MemoryBus::new());
        let cancelled = tokio::time::timeout(Duration::from_millis(100), coordinator(&bus).discover(&hash())).await;
        assert!(cancelled.is_err());

        // Let the release task run before time moves on.
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(bus.active_filters().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_runs_keep_their_own_subscriptions() {
        let bus = Arc::new(MemoryBus::new());
        let impatient = DiscoveryCoordinator::new(
            bus.clone(),
            TopicScheme::default(),
            DiscoveryTimeouts {
                config: Duration::from_millis(100),
                tap: Duration::from_millis(100),
            },
        );

        let publisher = {
            let bus = bus.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(1)).await;
                bus.publish(&format!("/device/{HASH}/config/sensor"), SENSOR.to_vec(), false)
                    .await
                    .unwrap();
            })
        };

        let hash = hash();
        let patient_coordinator = coordinator(&bus);
        let (short, patient) = tokio::join!(impatient.discover(&hash), patient_coordinator.discover(&hash));
        publisher.await.unwrap();

        assert_eq!(short.unwrap_err(), DiscoveryError::SensorConfigTimeout(hash.clone()));
        assert_eq!(patient.unwrap().documents.sensor.len(), 1);
        assert!(bus.active_filters().await.is_empty());
    }
}
