//! Device registry: `device_uid` is opaque (a specific local disk, a
//! specific GDrive account), so each `Device` record here is pared down
//! to what the cache and command layers actually consume: a kind tag, a
//! display name, and a last-seen timestamp. See DESIGN.md for the fields
//! deliberately left out.

use crate::shared::DeviceUid;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendKind {
    Local,
    GDrive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub device_uid: DeviceUid,
    pub backend_kind: BackendKind,
    pub display_name: String,
    pub last_seen_ts: DateTime<Utc>,
}

impl Device {
    pub fn new(device_uid: DeviceUid, backend_kind: BackendKind, display_name: impl Into<String>) -> Self {
        Self {
            device_uid,
            backend_kind,
            display_name: display_name.into(),
            last_seen_ts: Utc::now(),
        }
    }

    pub fn mark_seen(&mut self) {
        self.last_seen_ts = Utc::now();
    }
}

/// In-memory registry of known devices, populated as the cache discovers
/// (or is told about) backend instances. Not persisted separately — the
/// node cache's diskstore is the durable record; this is
/// just the process-local index used for lookups by `device_uid`.
#[derive(Default)]
pub struct DeviceRegistry {
    devices: RwLock<HashMap<DeviceUid, Device>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, device: Device) {
        self.devices.write().unwrap().insert(device.device_uid, device);
    }

    pub fn get(&self, device_uid: DeviceUid) -> Option<Device> {
        self.devices.read().unwrap().get(&device_uid).cloned()
    }

    pub fn all(&self) -> Vec<Device> {
        self.devices.read().unwrap().values().cloned().collect()
    }

    pub fn backend_kind(&self, device_uid: DeviceUid) -> Option<BackendKind> {
        self.devices
            .read()
            .unwrap()
            .get(&device_uid)
            .map(|d| d.backend_kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_and_looks_up_by_uid() {
        let reg = DeviceRegistry::new();
        let uid = DeviceUid::new();
        reg.register(Device::new(uid, BackendKind::Local, "laptop"));
        assert_eq!(reg.backend_kind(uid), Some(BackendKind::Local));
    }
}
