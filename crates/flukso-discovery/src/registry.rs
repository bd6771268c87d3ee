//! Discovered devices, keyed by hash.

use crate::coordinator::{DiscoveryCoordinator, DiscoveryError};
use flukso_core::{build_entities, DeviceHash, DeviceProfile, EntityReport};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::RwLock;

/// Registry of discovered devices.
///
/// Each successful discovery replaces the device's profile as a whole; a
/// failed one removes it. Only one discovery per device runs at a time.
pub struct DeviceRegistry {
    coordinator: DiscoveryCoordinator,
    devices: RwLock<HashMap<DeviceHash, Arc<DeviceProfile>>>,
    in_flight: Mutex<HashSet<DeviceHash>>,
}

impl DeviceRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new(coordinator: DiscoveryCoordinator) -> Self {
        Self {
            coordinator,
            devices: RwLock::new(HashMap::new()),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Coordinator used for discovery runs.
    #[must_use]
    pub fn coordinator(&self) -> &DiscoveryCoordinator {
        &self.coordinator
    }

    /// Run discovery for a device and record the outcome.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::AlreadyInProgress`] if the device is being
    /// discovered already, or the error of the discovery run.
    pub async fn activate(&self, hash: &DeviceHash) -> Result<Arc<DeviceProfile>, DiscoveryError> {
        let _guard = InFlight::acquire(&self.in_flight, hash)?;
        tracing::info!(device = %hash, "Starting discovery");

        match self.coordinator.discover(hash).await {
            Ok(profile) => {
                let profile = Arc::new(profile);
                let previous = self
                    .devices
                    .write()
                    .await
                    .insert(hash.clone(), Arc::clone(&profile));
                if previous.is_some() {
                    tracing::info!(device = %hash, "Replaced previous discovery result");
                }
                Ok(profile)
            }
            Err(e) => {
                if self.devices.write().await.remove(hash).is_some() {
                    tracing::warn!(device = %hash, "Dropped stale discovery result");
                }
                Err(e)
            }
        }
    }

    /// Profile of a discovered device.
    pub async fn get(&self, hash: &DeviceHash) -> Option<Arc<DeviceProfile>> {
        self.devices.read().await.get(hash).cloned()
    }

    /// Forget a device.
    pub async fn remove(&self, hash: &DeviceHash) -> Option<Arc<DeviceProfile>> {
        self.devices.write().await.remove(hash)
    }

    /// Every discovered device, ordered by hash.
    pub async fn devices(&self) -> Vec<Arc<DeviceProfile>> {
        let mut devices: Vec<_> = self.devices.read().await.values().cloned().collect();
        devices.sort_by(|a, b| a.hash.cmp(&b.hash));
        devices
    }

    /// Entity descriptors of a discovered device.
    pub async fn entities(&self, hash: &DeviceHash) -> Option<EntityReport> {
        self.get(hash).await.map(|profile| build_entities(&profile))
    }

    /// Whether a discovery for the device is running.
    #[must_use]
    pub fn is_discovering(&self, hash: &DeviceHash) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(hash)
    }
}

/// Marks a device as being discovered until dropped.
struct InFlight<'a> {
    set: &'a Mutex<HashSet<DeviceHash>>,
    hash: DeviceHash,
}

impl<'a> InFlight<'a> {
    fn acquire(set: &'a Mutex<HashSet<DeviceHash>>, hash: &DeviceHash) -> Result<Self, DiscoveryError> {
        let inserted = set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(hash.clone());
        if !inserted {
            tracing::warn!(device = %hash, "Discovery already in progress");
            return Err(DiscoveryError::AlreadyInProgress(hash.clone()));
        }
        Ok(Self {
            set,
            hash: hash.clone(),
        })
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.hash);
    }
}
