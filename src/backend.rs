//! `Backend`: wires every subsystem together into one handle an embedder
//! (the CLI, or a future daemon) constructs once per process — one
//! struct owning the shared `Arc`s every subsystem needs, built from an
//! `OutletConfig` and torn down via a graceful-shutdown `watch::<bool>`.

use crate::cache::CacheManager;
use crate::command::{CommandContext, Executor};
use crate::config::OutletConfig;
use crate::content_hash::Blake3Hasher;
use crate::device::{BackendKind, Device, DeviceRegistry};
use crate::error::OutletResult;
use crate::gdrive_client::GDriveClient;
use crate::infrastructure::events::EventBus;
use crate::ledger::OpLedger;
use crate::op_graph::OpGraph;
use crate::op_manager::OpManager;
use crate::scheduling::PriorityTaskQueue;
use crate::shared::DeviceUid;
use crate::uid::{UidGenerator, UidMapper};
use crate::volume::VolumeManager;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::watch;
use tracing::info;

/// Everything a running Outlet process needs, built once at startup.
pub struct Backend {
    pub config: OutletConfig,
    pub cache: Arc<CacheManager>,
    pub graph: Arc<OpGraph>,
    pub ledger: Arc<OpLedger>,
    pub events: Arc<EventBus>,
    pub op_manager: Arc<OpManager>,
    pub devices: Arc<DeviceRegistry>,
    pub volumes: Arc<VolumeManager>,
    pub uid_mappers: Arc<RwLock<HashMap<DeviceUid, Arc<UidMapper>>>>,
    /// Generator backing this process's local device's `UidMapper`,
    /// seeded from the ledger's persisted watermark at startup and
    /// written back on shutdown.
    pub uid_generator: Arc<UidGenerator>,
    pub scheduler: Arc<PriorityTaskQueue>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Backend {
    pub async fn start(config: OutletConfig) -> OutletResult<Self> {
        config
            .ensure_directories()
            .map_err(|e| crate::error::OutletError::Other(e.to_string()))?;

        let events = Arc::new(EventBus::default());
        let cache = Arc::new(CacheManager::new(config.data_dir.clone(), events.clone()));
        let graph = Arc::new(OpGraph::new());
        let ledger = Arc::new(OpLedger::open(&config.ops_db_path()).await?);
        let op_manager = Arc::new(OpManager::new(cache.clone(), graph.clone(), ledger.clone(), events.clone()));

        info!("resuming pending ops from disk");
        op_manager.resume_pending_ops_from_disk().await?;

        let watermark = ledger.load_watermark().await?;
        let uid_generator = Arc::new(UidGenerator::new(watermark));
        let local_device_uid = config.local_device_uid;
        let local_mapper = Arc::new(UidMapper::new(uid_generator.clone()));

        let devices = Arc::new(DeviceRegistry::new());
        devices.register(Device::new(local_device_uid, BackendKind::Local, "local"));

        let mut uid_mappers = HashMap::new();
        uid_mappers.insert(local_device_uid, local_mapper);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Self {
            config,
            cache,
            graph,
            ledger,
            events,
            op_manager,
            devices,
            volumes: Arc::new(VolumeManager::new()),
            uid_mappers: Arc::new(RwLock::new(uid_mappers)),
            uid_generator,
            scheduler: Arc::new(PriorityTaskQueue::new()),
            shutdown_tx,
            shutdown_rx,
        })
    }

    /// Registers the [`UidMapper`] a local device resolves its paths
    /// through; local commands fail with `CacheInconsistency` until this
    /// has been called for every local device a batch touches.
    pub fn register_uid_mapper(&self, device_uid: DeviceUid, mapper: Arc<UidMapper>) {
        self.uid_mappers.write().unwrap().insert(device_uid, mapper);
    }

    /// Builds an [`Executor`] bound to this backend's live state and
    /// the (optional) GDrive client — `None` means every GDrive-backed op
    /// will fail at dispatch with `OutletError::Other`.
    pub fn executor(&self, gdrive_client: Option<Arc<dyn GDriveClient>>) -> Executor {
        let ctx = Arc::new(CommandContext {
            staging_dir: self.config.staging_dir(),
            cache: self.cache.clone(),
            gdrive_client,
            hasher: Arc::new(Blake3Hasher),
            retry: self.config.executor.retry.clone(),
            volumes: self.volumes.clone(),
            uid_mappers: self.uid_mappers.clone(),
        });
        Executor::new(self.op_manager.clone(), ctx, self.config.executor.max_concurrent_ops)
    }

    /// Writes the UID generator's current watermark to the ledger so the
    /// next startup resumes issuing UIDs above every one handed out this
    /// run.
    pub async fn persist_watermark(&self) -> OutletResult<()> {
        self.ledger.save_watermark(self.uid_generator.watermark()).await
    }

    pub fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    /// Signals every subsystem watching `shutdown_receiver()` to stop.
    pub fn shutdown(&self) {
        info!("backend shutdown requested");
        let _ = self.shutdown_tx.send(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn start_creates_data_dir_layout_and_resumes_empty_ledger() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = OutletConfig::default_with_dir(dir.path().to_path_buf());
        let backend = Backend::start(config).await.unwrap();

        assert!(dir.path().join("staging").exists());
        assert_eq!(backend.op_manager.graph().len(), 1); // root only
    }

    #[tokio::test]
    async fn start_registers_a_uid_mapper_for_the_local_device() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = OutletConfig::default_with_dir(dir.path().to_path_buf());
        let local_device_uid = config.local_device_uid;
        let backend = Backend::start(config).await.unwrap();

        let mappers = backend.uid_mappers.read().unwrap();
        assert!(mappers.contains_key(&local_device_uid));
    }

    #[tokio::test]
    async fn watermark_survives_a_restart() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = OutletConfig::default_with_dir(dir.path().to_path_buf());

        let backend = Backend::start(config.clone()).await.unwrap();
        for _ in 0..5 {
            backend.uid_generator.next_uid();
        }
        let issued_watermark = backend.uid_generator.watermark();
        backend.persist_watermark().await.unwrap();

        let restarted = Backend::start(config).await.unwrap();
        assert_eq!(restarted.uid_generator.watermark(), issued_watermark);
    }
}
