//! `GDriveClient`.

use crate::error::OutletResult;
use crate::shared::Uid;
use async_trait::async_trait;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct GDriveFileMeta {
    pub goog_id: String,
    pub name: String,
    pub parent_goog_ids: Vec<String>,
    pub md5: Option<String>,
    pub size: u64,
    pub version: u64,
}

#[derive(Debug, Clone, Default)]
pub struct MetaPatch {
    pub remove_parents: Vec<String>,
    pub add_parents: Vec<String>,
    pub new_name: Option<String>,
}

/// Narrow seam over the Drive v3 REST surface the command layer needs.
/// Implementations own their own retry/backoff around transient HTTP
/// errors — `OutletError::is_transient()` tells the executor which
/// failures are worth that treatment.
#[async_trait]
pub trait GDriveClient: Send + Sync {
    async fn find_by_parent_and_name(&self, parent_goog_id: &str, name: &str) -> OutletResult<Vec<GDriveFileMeta>>;

    async fn upload_new(&self, parent_goog_id: &str, name: &str, local_path: &Path) -> OutletResult<GDriveFileMeta>;

    async fn update_content(&self, goog_id: &str, local_path: &Path) -> OutletResult<GDriveFileMeta>;

    async fn download(&self, goog_id: &str, dest_path: &Path) -> OutletResult<()>;

    async fn modify_meta(&self, goog_id: &str, patch: MetaPatch) -> OutletResult<GDriveFileMeta>;

    async fn create_folder(&self, parent_goog_id: &str, name: &str) -> OutletResult<GDriveFileMeta>;

    async fn delete(&self, goog_id: &str, to_trash: bool) -> OutletResult<()>;

    async fn get_meta(&self, goog_id: &str) -> OutletResult<Option<GDriveFileMeta>>;

    /// Resolves a local [`Uid`] to the goog_id Outlet has on file for it,
    /// used when building API calls from a `Node`'s `parent_uids`.
    async fn goog_id_for_uid(&self, uid: Uid) -> Option<String>;
}
