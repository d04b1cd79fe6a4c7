//! Device Registry
//!
//! Canonical store of every device seen by discovery. Devices live in an
//! append-only arena indexed by identity, so there is never more than one
//! `Device` per USB serial or IP:port, and a rediscovery updates the
//! existing instance in place.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::device::{Device, DeviceDetails, DeviceIdentity, DeviceState};

/// One device line as seen by discovery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceObservation {
    pub identity: DeviceIdentity,
    pub state: DeviceState,
    pub product: String,
    pub model: String,
    pub device_name: String,
    pub transport_id: Option<u32>,
}

impl DeviceObservation {
    fn into_parts(self) -> (DeviceIdentity, DeviceDetails) {
        (
            self.identity,
            DeviceDetails {
                state: self.state,
                product: self.product,
                model: self.model,
                device_name: self.device_name,
                transport_id: self.transport_id,
            },
        )
    }
}

#[derive(Default)]
struct RegistryInner {
    devices: Vec<Arc<Device>>,
    index: HashMap<DeviceIdentity, usize>,
}

/// Shared identity → device map
///
/// Writes (`upsert`, `mark_absent`) take the lock exclusively; lookups share it.
#[derive(Default)]
pub struct DeviceRegistry {
    inner: RwLock<RegistryInner>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a newly seen device or update the known instance in place
    pub fn upsert(&self, observation: DeviceObservation) -> Arc<Device> {
        let (identity, details) = observation.into_parts();
        let mut inner = self.inner.write();

        if let Some(&slot) = inner.index.get(&identity) {
            let device = Arc::clone(&inner.devices[slot]);
            let new_state = details.state;
            let previous = device.update(details);
            if previous != new_state {
                info!("Device {} changed state: {} -> {}", identity, previous, new_state);
            }
            return device;
        }

        info!("Discovered device {} ({})", identity, details.state);
        let device = Arc::new(Device::new(identity.clone(), details));
        let slot = inner.devices.len();
        inner.devices.push(Arc::clone(&device));
        inner.index.insert(identity, slot);
        device
    }

    pub fn lookup(&self, identity: &DeviceIdentity) -> Option<Arc<Device>> {
        let inner = self.inner.read();
        inner
            .index
            .get(identity)
            .map(|&slot| Arc::clone(&inner.devices[slot]))
    }

    /// Look up by the raw identity string (`serial` or `a.b.c.d:port`)
    pub fn lookup_str(&self, identity: &str) -> Option<Arc<Device>> {
        self.lookup(&DeviceIdentity::parse(identity))
    }

    /// Whether `device` is the instance this registry holds for its identity
    pub fn resolves(&self, device: &Device) -> bool {
        self.lookup(device.identity())
            .is_some_and(|known| std::ptr::eq(Arc::as_ptr(&known), device))
    }

    /// Snapshot of all known devices, in discovery order
    pub fn all(&self) -> Vec<Arc<Device>> {
        self.inner.read().devices.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.read().devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Mark every device not in `seen` as offline; returns those that changed
    pub fn mark_absent(&self, seen: &HashSet<DeviceIdentity>) -> Vec<Arc<Device>> {
        let inner = self.inner.write();
        let mut stale = Vec::new();

        for device in inner.devices.iter() {
            if seen.contains(device.identity()) {
                continue;
            }
            let previous = device.set_state(DeviceState::Offline);
            if previous != DeviceState::Offline {
                debug!("Device {} no longer listed, marking offline", device.identity());
                stale.push(Arc::clone(device));
            }
        }

        stale
    }
}
