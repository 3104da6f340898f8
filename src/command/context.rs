//! `CommandContext`: everything a [`super::Command`] needs
//! to run, bundled so the executor doesn't pass five separate arguments.

use crate::cache::CacheManager;
use crate::config::RetryConfig;
use crate::content_hash::ContentHasher;
use crate::error::{OutletError, OutletResult};
use crate::gdrive_client::GDriveClient;
use crate::model::node::Node;
use crate::shared::DeviceUid;
use crate::uid::UidMapper;
use crate::volume::VolumeManager;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

pub struct CommandContext {
    pub staging_dir: PathBuf,
    pub cache: Arc<CacheManager>,
    pub gdrive_client: Option<Arc<dyn GDriveClient>>,
    pub hasher: Arc<dyn ContentHasher>,
    pub retry: RetryConfig,
    pub volumes: Arc<VolumeManager>,
    /// One [`UidMapper`] per local device — how local commands turn a
    /// node's `(device_uid, uid)` back into an absolute path.
    pub uid_mappers: Arc<RwLock<HashMap<DeviceUid, Arc<UidMapper>>>>,
}

impl CommandContext {
    /// Per-call staging path for an in-flight copy/download, named by
    /// content md5 once known.
    pub fn staging_path(&self, hint: &str) -> PathBuf {
        self.staging_dir.join(hint)
    }

    pub fn gdrive(&self) -> OutletResult<&Arc<dyn GDriveClient>> {
        self.gdrive_client
            .as_ref()
            .ok_or_else(|| OutletError::Other("no GDrive client configured".to_string()))
    }

    /// Resolves a local node's absolute path via its device's
    /// [`UidMapper`]. Errors with `CacheInconsistency` if the device has
    /// no registered mapper or the uid has no known path yet.
    pub fn local_path(&self, node: &Node) -> OutletResult<String> {
        let dn_uid = node.node_id();
        let mapper = self
            .uid_mappers
            .read()
            .unwrap()
            .get(&dn_uid.device_uid)
            .cloned()
            .ok_or_else(|| OutletError::cache_inconsistency(format!("no UID mapper for device {}", dn_uid.device_uid)))?;
        mapper
            .path_for_uid(dn_uid.uid)
            .ok_or_else(|| OutletError::cache_inconsistency(format!("no path registered for {dn_uid}")))
    }
}
