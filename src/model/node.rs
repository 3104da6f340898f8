//! Node — the tagged variant at the heart of the node cache: common
//! fields shared by every backend plus one backend-specific payload
//! variant, spanning local files/dirs and GDrive files/folders.

use crate::shared::{DeviceUid, DnUid, Uid};
use serde::{Deserialize, Serialize};

/// Whether a node is currently trashed, and why.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrashStatus {
    /// Not trashed.
    None,
    /// The user (or a RM op) explicitly trashed this node.
    Explicit,
    /// An ancestor directory was trashed, implicitly trashing this node.
    Implicit,
}

impl Default for TrashStatus {
    fn default() -> Self {
        TrashStatus::None
    }
}

/// A node in the unified cache: common fields plus one backend-specific
/// payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub node_id: DnUid,
    pub trashed: TrashStatus,
    pub is_shared: bool,
    pub icon_override: Option<String>,
    pub data: NodeData,
}

/// The backend-specific payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum NodeData {
    LocalFile {
        parent_uid: Uid,
        size: u64,
        /// Seconds since epoch, unlike the millisecond timestamps elsewhere.
        sync_ts: i64,
        modify_ts: i64,
        change_ts: i64,
        md5: Option<String>,
        sha256: Option<String>,
        is_live: bool,
    },
    LocalDir {
        parent_uid: Uid,
        is_live: bool,
        all_children_fetched: bool,
    },
    GDriveFile {
        goog_id: Option<String>,
        name: String,
        mime_type_uid: u32,
        parent_uids: Vec<Uid>,
        version: u64,
        md5: Option<String>,
        size: u64,
        drive_id: Option<String>,
        owner_uid: Option<Uid>,
        create_ts: i64,
        modify_ts: i64,
        sync_ts: i64,
    },
    GDriveFolder {
        goog_id: Option<String>,
        name: String,
        parent_uids: Vec<Uid>,
        all_children_fetched: bool,
    },
    /// A grouping node with no backend identity of its own (e.g. "this
    /// device" in a display tree). Not written to any diskstore.
    Container { name: String },
    /// A display-only grouping by change category ("added"/"deleted"/…).
    Category { label: String },
    /// The root of one device's subtree within a larger multi-device tree.
    RootType { device_uid: DeviceUid },
    /// A placeholder for a path that does not (or no longer) exists.
    Nonexistent,
}

impl Node {
    pub fn node_id(&self) -> DnUid {
        self.node_id
    }

    /// True iff this node reflects a currently existing backend object.
    /// Container/Category/RootType nodes are synthetic and never live;
    /// Nonexistent is never live.
    pub fn is_live(&self) -> bool {
        match &self.data {
            NodeData::LocalFile { is_live, .. } => *is_live,
            NodeData::LocalDir { is_live, .. } => *is_live,
            NodeData::GDriveFile { .. } | NodeData::GDriveFolder { .. } => true,
            NodeData::Container { .. }
            | NodeData::Category { .. }
            | NodeData::RootType { .. }
            | NodeData::Nonexistent => false,
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(
            &self.data,
            NodeData::LocalDir { .. } | NodeData::GDriveFolder { .. }
        )
    }

    pub fn is_file(&self) -> bool {
        matches!(
            &self.data,
            NodeData::LocalFile { .. } | NodeData::GDriveFile { .. }
        )
    }

    /// Local nodes have exactly one parent; GDrive nodes may have
    /// several via multiple parents.
    pub fn parent_uids(&self) -> Vec<Uid> {
        match &self.data {
            NodeData::LocalFile { parent_uid, .. } => vec![*parent_uid],
            NodeData::LocalDir { parent_uid, .. } => vec![*parent_uid],
            NodeData::GDriveFile { parent_uids, .. } => parent_uids.clone(),
            NodeData::GDriveFolder { parent_uids, .. } => parent_uids.clone(),
            _ => Vec::new(),
        }
    }

    pub fn name(&self) -> Option<&str> {
        match &self.data {
            NodeData::GDriveFile { name, .. } => Some(name),
            NodeData::GDriveFolder { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Content signature used for "identical file" checks (CP NO_OP,
    /// GDrive dst collision).
    pub fn content_signature(&self) -> Option<(u64, Option<&str>)> {
        match &self.data {
            NodeData::LocalFile { size, md5, .. } => Some((*size, md5.as_deref())),
            NodeData::GDriveFile { size, md5, .. } => Some((*size, md5.as_deref())),
            _ => None,
        }
    }

    pub fn all_children_fetched(&self) -> bool {
        matches!(
            &self.data,
            NodeData::LocalDir {
                all_children_fetched: true,
                ..
            } | NodeData::GDriveFolder {
                all_children_fetched: true,
                ..
            }
        )
    }

    /// A non-live "planning" placeholder for a node this op batch will
    /// create.
    pub fn planning_local_file(node_id: DnUid, parent_uid: Uid, size: u64) -> Self {
        Self {
            node_id,
            trashed: TrashStatus::None,
            is_shared: false,
            icon_override: None,
            data: NodeData::LocalFile {
                parent_uid,
                size,
                sync_ts: 0,
                modify_ts: 0,
                change_ts: 0,
                md5: None,
                sha256: None,
                is_live: false,
            },
        }
    }

    pub fn planning_local_dir(node_id: DnUid, parent_uid: Uid) -> Self {
        Self {
            node_id,
            trashed: TrashStatus::None,
            is_shared: false,
            icon_override: None,
            data: NodeData::LocalDir {
                parent_uid,
                is_live: false,
                all_children_fetched: false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dn(uid: u64) -> DnUid {
        DnUid::new(DeviceUid::new(), Uid(uid))
    }

    #[test]
    fn planning_nodes_are_not_live() {
        let n = Node::planning_local_file(dn(10), Uid(1), 100);
        assert!(!n.is_live());
        assert!(n.is_file());
    }

    #[test]
    fn gdrive_nodes_may_have_multiple_parents() {
        let n = Node {
            node_id: dn(11),
            trashed: TrashStatus::None,
            is_shared: false,
            icon_override: None,
            data: NodeData::GDriveFolder {
                goog_id: Some("g1".into()),
                name: "shared".into(),
                parent_uids: vec![Uid(1), Uid(2)],
                all_children_fetched: false,
            },
        };
        assert_eq!(n.parent_uids().len(), 2);
    }
}
