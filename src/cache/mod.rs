//! Node cache: memstore + diskstore behind one
//! three-phase write contract (update memstore → update diskstore → emit
//! signals), tolerant of a crash between phases since memstore is the
//! runtime source of truth and diskstore is re-synchronized at startup.

pub mod diskstore;
pub mod memstore;
pub mod write_op;

use crate::error::OutletResult;
use crate::infrastructure::events::{EventBus, Signal};
use crate::model::node::Node;
use crate::shared::{DeviceUid, DnUid};
use memstore::Memstore;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use tracing::debug;
pub use write_op::CacheWriteOp;

/// Owns the in-memory tree plus one on-disk store per device, and
/// arbitrates every mutation through [`CacheManager::apply`].
pub struct CacheManager {
    memstore: Memstore,
    diskstores: AsyncMutex<HashMap<DeviceUid, Arc<diskstore::Diskstore>>>,
    diskstore_dir: PathBuf,
    events: Arc<EventBus>,
}

impl CacheManager {
    pub fn new(diskstore_dir: PathBuf, events: Arc<EventBus>) -> Self {
        Self {
            memstore: Memstore::new(),
            diskstores: AsyncMutex::new(HashMap::new()),
            diskstore_dir,
            events,
        }
    }

    pub fn memstore(&self) -> &Memstore {
        &self.memstore
    }

    async fn diskstore_for(&self, device_uid: DeviceUid) -> OutletResult<Arc<diskstore::Diskstore>> {
        let mut stores = self.diskstores.lock().await;
        if let Some(store) = stores.get(&device_uid) {
            return Ok(store.clone());
        }
        let path = self.diskstore_dir.join(format!("{device_uid}.cache.db"));
        let store = Arc::new(diskstore::Diskstore::open(&path).await?);
        stores.insert(device_uid, store.clone());
        Ok(store)
    }

    /// Three-phase contract for a single node upsert.
    pub async fn upsert_single_node(&self, node: Node) -> OutletResult<memstore::UpsertOutcome> {
        let outcome = self.memstore.upsert_single_node(node);

        if outcome.needs_disk_update && outcome.node.is_live() {
            let store = self.diskstore_for(outcome.node.node_id().device_uid).await?;
            store.upsert(&outcome.node).await?;
        }

        self.events.emit(Signal::NodeUpsertedInCache {
            node: Box::new(outcome.node.clone()),
        });
        debug!(node_id = %outcome.node.node_id(), "upserted node into cache");

        Ok(outcome)
    }

    pub async fn remove_single_node(&self, dn_uid: DnUid) -> OutletResult<()> {
        if self.memstore.remove_single_node(dn_uid).is_some() {
            let store = self.diskstore_for(dn_uid.device_uid).await?;
            store.remove(dn_uid).await?;
            self.events.emit(Signal::NodeRemovedInCache { dn_uid });
        }
        Ok(())
    }

    pub async fn remove_subtree(&self, root: DnUid) -> OutletResult<Vec<Node>> {
        let removed = self.memstore.remove_subtree(root);
        let store = self.diskstore_for(root.device_uid).await?;
        for node in &removed {
            store.remove(node.node_id()).await?;
        }
        self.events.emit(Signal::SubtreeNodesChangedInCache { root });
        Ok(removed)
    }

    /// Replaces a folder's authoritative child list for a fully-fetched
    /// folder.
    pub async fn refresh_folder(&self, folder: DnUid, children: Vec<Node>) -> OutletResult<()> {
        let store = self.diskstore_for(folder.device_uid).await?;
        for child in &children {
            store.upsert(child).await?;
        }
        self.memstore.refresh_folder(folder, &children);
        self.events.emit(Signal::SubtreeNodesChangedInCache { root: folder });
        Ok(())
    }

    /// Dispatches a [`CacheWriteOp`] through the appropriate phase
    /// sequence. `BatchChanges` simply replays each inner op in order.
    pub async fn apply(&self, op: CacheWriteOp) -> OutletResult<()> {
        match op {
            CacheWriteOp::UpsertSingleNode(node) => {
                self.upsert_single_node(*node).await?;
            }
            CacheWriteOp::RemoveSingleNode(dn_uid) => {
                self.remove_single_node(dn_uid).await?;
            }
            CacheWriteOp::RemoveSubtree(root) => {
                self.remove_subtree(root).await?;
            }
            CacheWriteOp::BatchChanges(ops) => {
                for inner in ops {
                    Box::pin(self.apply(inner)).await?;
                }
            }
            CacheWriteOp::RefreshFolder { folder, children } => {
                self.refresh_folder(folder, children).await?;
            }
            CacheWriteOp::CreateUser { .. }
            | CacheWriteOp::UpsertMimeType { .. }
            | CacheWriteOp::DeleteAllData => {
                debug!("cache write op has no effect outside the node cache proper");
            }
        }
        Ok(())
    }
}
