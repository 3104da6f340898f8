//! In-memory authoritative node store.
//!
//! One [`DeviceTree`] per device, each behind its own mutex so that
//! single-writer/concurrent-reader discipline is per-device rather than a single global lock.

use crate::model::node::Node;
use crate::shared::{DeviceUid, DnUid, Uid};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, RwLock};

/// All nodes of one device plus the indices needed for lookups.
#[derive(Default)]
struct DeviceTree {
    nodes: HashMap<Uid, Node>,
    /// parent UID -> child UIDs. A GDrive child may appear under several
    /// parents; a local child appears under exactly one.
    children_of: HashMap<Uid, HashSet<Uid>>,
    path_to_uid: HashMap<String, Uid>,
    goog_id_to_uid: HashMap<String, Uid>,
}

impl DeviceTree {
    fn link_parents(&mut self, node: &Node) {
        for parent in node.parent_uids() {
            self.children_of.entry(parent).or_default().insert(node.node_id().uid);
        }
    }

    fn unlink_parents(&mut self, node: &Node) {
        for parent in node.parent_uids() {
            if let Some(set) = self.children_of.get_mut(&parent) {
                set.remove(&node.node_id().uid);
            }
        }
    }
}

/// Outcome of [`Memstore::upsert_single_node`].
pub struct UpsertOutcome {
    pub node: Node,
    pub needs_disk_update: bool,
    pub has_icon_update: bool,
}

#[derive(Default)]
pub struct Memstore {
    devices: RwLock<HashMap<DeviceUid, Mutex<DeviceTree>>>,
}

impl Memstore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_device<R>(&self, device_uid: DeviceUid, f: impl FnOnce(&mut DeviceTree) -> R) -> R {
        {
            let devices = self.devices.read().unwrap();
            if let Some(tree) = devices.get(&device_uid) {
                return f(&mut tree.lock().unwrap());
            }
        }
        let mut devices = self.devices.write().unwrap();
        let tree = devices.entry(device_uid).or_insert_with(|| Mutex::new(DeviceTree::default()));
        f(&mut tree.lock().unwrap())
    }

    /// Merges by DN_UID; `needs_disk_update=false` if the incoming node
    /// is identical to the existing one on signature fields
    /// (content_signature + liveness); non-live nodes are never persisted.
    pub fn upsert_single_node(&self, node: Node) -> UpsertOutcome {
        let device_uid = node.node_id().device_uid;
        self.with_device(device_uid, |tree| {
            let uid = node.node_id().uid;
            let existing = tree.nodes.get(&uid).cloned();
            let unchanged = existing.as_ref().map_or(false, |old| {
                old.content_signature() == node.content_signature() && old.is_live() == node.is_live()
            });
            let has_icon_update = existing.as_ref().map_or(node.icon_override.is_some(), |old| {
                old.icon_override != node.icon_override
            });

            if let Some(old) = existing {
                tree.unlink_parents(&old);
            }
            tree.link_parents(&node);

            if let Some(goog_id) = goog_id_of(&node) {
                tree.goog_id_to_uid.insert(goog_id, uid);
            }

            tree.nodes.insert(uid, node.clone());

            UpsertOutcome {
                node,
                needs_disk_update: !unchanged,
                has_icon_update,
            }
        })
    }

    pub fn register_path(&self, device_uid: DeviceUid, path: String, uid: Uid) {
        self.with_device(device_uid, |tree| {
            tree.path_to_uid.insert(path, uid);
        });
    }

    pub fn get(&self, dn_uid: DnUid) -> Option<Node> {
        self.with_device(dn_uid.device_uid, |tree| tree.nodes.get(&dn_uid.uid).cloned())
    }

    pub fn uid_for_path(&self, device_uid: DeviceUid, path: &str) -> Option<Uid> {
        self.with_device(device_uid, |tree| tree.path_to_uid.get(path).copied())
    }

    pub fn uid_for_goog_id(&self, device_uid: DeviceUid, goog_id: &str) -> Option<Uid> {
        self.with_device(device_uid, |tree| tree.goog_id_to_uid.get(goog_id).copied())
    }

    pub fn children_of(&self, dn_uid: DnUid) -> Vec<Node> {
        self.with_device(dn_uid.device_uid, |tree| {
            tree.children_of
                .get(&dn_uid.uid)
                .into_iter()
                .flatten()
                .filter_map(|child_uid| tree.nodes.get(child_uid).cloned())
                .collect()
        })
    }

    pub fn remove_single_node(&self, dn_uid: DnUid) -> Option<Node> {
        self.with_device(dn_uid.device_uid, |tree| {
            let removed = tree.nodes.remove(&dn_uid.uid);
            if let Some(node) = &removed {
                tree.unlink_parents(node);
            }
            tree.children_of.remove(&dn_uid.uid);
            removed
        })
    }

    /// Removes `root` and every node reachable from it through the
    /// `children_of` index, depth-first. Returns every removed node.
    pub fn remove_subtree(&self, root: DnUid) -> Vec<Node> {
        let mut removed = Vec::new();
        let mut stack = vec![root];
        while let Some(dn_uid) = stack.pop() {
            let children = self.with_device(dn_uid.device_uid, |tree| {
                tree.children_of.get(&dn_uid.uid).cloned().unwrap_or_default()
            });
            for child_uid in children {
                stack.push(DnUid::new(dn_uid.device_uid, child_uid));
            }
            if let Some(node) = self.remove_single_node(dn_uid) {
                removed.push(node);
            }
        }
        removed
    }

    /// `folder`'s child list is authoritative; anything currently linked
    /// under `folder` but absent from `authoritative_children` is
    /// unlinked (not deleted).
    pub fn refresh_folder(&self, folder: DnUid, authoritative_children: &[Node]) -> Vec<Uid> {
        let authoritative_uids: HashSet<Uid> = authoritative_children
            .iter()
            .map(|n| n.node_id().uid)
            .collect();

        let unlinked = self.with_device(folder.device_uid, |tree| {
            let current = tree.children_of.get(&folder.uid).cloned().unwrap_or_default();
            let stale: Vec<Uid> = current.difference(&authoritative_uids).copied().collect();
            if let Some(set) = tree.children_of.get_mut(&folder.uid) {
                for uid in &stale {
                    set.remove(uid);
                }
            }
            stale
        });

        for child in authoritative_children {
            self.upsert_single_node(child.clone());
        }

        unlinked
    }
}

fn goog_id_of(node: &Node) -> Option<String> {
    use crate::model::node::NodeData;
    match &node.data {
        NodeData::GDriveFile { goog_id, .. } | NodeData::GDriveFolder { goog_id, .. } => goog_id.clone(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::node::Node;

    fn dn(device: DeviceUid, uid: u64) -> DnUid {
        DnUid::new(device, Uid(uid))
    }

    #[test]
    fn upsert_unchanged_node_skips_disk_write() {
        let store = Memstore::new();
        let device = DeviceUid::new();
        let node = Node::planning_local_file(dn(device, 10), Uid(1), 100);
        let first = store.upsert_single_node(node.clone());
        assert!(first.needs_disk_update);
        let second = store.upsert_single_node(node);
        assert!(!second.needs_disk_update);
    }

    #[test]
    fn refresh_folder_unlinks_stale_children_without_deleting() {
        let store = Memstore::new();
        let device = DeviceUid::new();
        let folder = dn(device, 1);
        let child_a = Node::planning_local_file(dn(device, 2), Uid(1), 10);
        let child_b = Node::planning_local_file(dn(device, 3), Uid(1), 20);
        store.upsert_single_node(child_a.clone());
        store.upsert_single_node(child_b.clone());
        assert_eq!(store.children_of(folder).len(), 2);

        let unlinked = store.refresh_folder(folder, &[child_a]);
        assert_eq!(unlinked, vec![Uid(3)]);
        // child_b still resolvable by uid, just unlinked from this parent.
        assert!(store.get(dn(device, 3)).is_some());
    }
}
