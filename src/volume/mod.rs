//! Volume registry used only by the copy-strategy router (src/command/strategy.rs)
//! to decide whether a local-to-local copy can use a same-filesystem move/clone
//! or must fall back to a streaming copy. Pared down to the fields the
//! router actually compares: filesystem id, mount point, capacity.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Volume {
    pub filesystem_id: String,
    pub mount_point: String,
    pub total_bytes: u64,
    pub available_bytes: u64,
}

impl Volume {
    pub fn new(filesystem_id: impl Into<String>, mount_point: impl Into<String>, total_bytes: u64, available_bytes: u64) -> Self {
        Self {
            filesystem_id: filesystem_id.into(),
            mount_point: mount_point.into(),
            total_bytes,
            available_bytes,
        }
    }

    pub fn contains_path(&self, path: &str) -> bool {
        path.starts_with(&self.mount_point)
    }
}

/// Process-local table of known local volumes, keyed by mount point. The
/// strategy router uses this to answer "are these two paths on the same
/// filesystem?" without shelling out to `stat` on every copy.
#[derive(Default)]
pub struct VolumeManager {
    volumes: RwLock<HashMap<String, Volume>>,
}

impl VolumeManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, volume: Volume) {
        self.volumes
            .write()
            .unwrap()
            .insert(volume.mount_point.clone(), volume);
    }

    /// Finds the volume whose mount point is the longest prefix match for
    /// `path` — the same "most specific mount wins" rule `df`/`mount` use.
    pub fn volume_for_path(&self, path: &str) -> Option<Volume> {
        self.volumes
            .read()
            .unwrap()
            .values()
            .filter(|v| v.contains_path(path))
            .max_by_key(|v| v.mount_point.len())
            .cloned()
    }

    /// Two paths are on the same filesystem iff they resolve to the same
    /// `filesystem_id`. Used by the router to pick a same-device move over
    /// a streaming cross-device copy.
    pub fn same_filesystem(&self, a: &str, b: &str) -> bool {
        match (self.volume_for_path(a), self.volume_for_path(b)) {
            (Some(va), Some(vb)) => va.filesystem_id == vb.filesystem_id,
            _ => false,
        }
    }
}
