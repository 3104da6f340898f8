//! ChangeTreeBuilder: given a proposed change, builds
//! a per-side tree of `{SPIDNodePair -> category}` plus the flat list of
//! [`UserOp`]s that realize it, synthesizing ancestor MKDIRs along the
//! way.
//!
//! Walking an actual filesystem or GDrive listing is explicitly out of
//! scope, so
//! the builder takes an already-enumerated leaf list rather than doing
//! its own directory walk.

use crate::cache::memstore::Memstore;
use crate::error::{OutletError, OutletResult};
use crate::model::node::{Node, NodeData};
use crate::model::spid::{Category, Spid, SpidNodePair};
use crate::op::{OpType, UserOp};
use crate::shared::{DeviceUid, DnUid, Guid, Uid};
use crate::uid::UidGenerator;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Cp,
    Mv,
}

impl ChangeKind {
    fn file_op_type(&self, overwrite: bool) -> OpType {
        match (self, overwrite) {
            (ChangeKind::Cp, false) => OpType::Cp,
            (ChangeKind::Cp, true) => OpType::CpOnto,
            (ChangeKind::Mv, false) => OpType::Mv,
            (ChangeKind::Mv, true) => OpType::MvOnto,
        }
    }
}

/// One file under the source root, enumerated by the caller.
#[derive(Debug, Clone)]
pub struct SourceLeaf {
    /// Path relative to the request's source root, e.g. `"b/file1"`.
    pub relative_path: String,
    pub size: u64,
    pub md5: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ChangeTreeRequest {
    pub batch_uid: u64,
    pub src_device: DeviceUid,
    pub src_root_path: String,
    pub dst_device: DeviceUid,
    /// Directory under which the source root's basename is (re)created.
    pub dst_root_parent_path: String,
    pub leaves: Vec<SourceLeaf>,
    pub kind: ChangeKind,
}

/// A tree of `{SPIDNodePair -> category}` rooted at one subtree.
#[derive(Debug, Default)]
pub struct ChangeTree {
    pub nodes: HashMap<Guid, SpidNodePair>,
}

impl ChangeTree {
    fn insert(&mut self, pair: SpidNodePair) {
        self.nodes.insert(pair.guid(), pair);
    }
}

#[derive(Debug)]
pub struct ChangeTreeResult {
    pub src_tree: ChangeTree,
    pub dst_tree: ChangeTree,
    pub ops: Vec<UserOp>,
}

pub struct ChangeTreeBuilder<'a> {
    memstore: &'a Memstore,
    dst_uid_gen: &'a UidGenerator,
    op_uid_gen: &'a UidGenerator,
}

impl<'a> ChangeTreeBuilder<'a> {
    pub fn new(memstore: &'a Memstore, dst_uid_gen: &'a UidGenerator, op_uid_gen: &'a UidGenerator) -> Self {
        Self {
            memstore,
            dst_uid_gen,
            op_uid_gen,
        }
    }

    /// Synthesizes one MKDIR op per ancestor directory of `dst_path`
    /// (relative to `dst_root_parent_path`'s
    /// device) that doesn't exist in the cache and hasn't already been
    /// synthesized in this build. Returns the existing-or-synthesized UID
    /// for `dst_path` and any newly emitted MKDIR ops, in root-to-leaf
    /// order.
    fn ensure_dir_chain(
        &self,
        device: DeviceUid,
        dst_path: &str,
        synthesized: &mut HashMap<String, Uid>,
        dst_tree: &mut ChangeTree,
        batch_uid: u64,
        op_uid_seq: &mut Vec<UserOp>,
    ) -> Uid {
        if dst_path == "/" {
            return self.memstore.uid_for_path(device, dst_path).unwrap_or(Uid::SUPER_ROOT);
        }
        if let Some(uid) = self.memstore.uid_for_path(device, dst_path) {
            return uid;
        }
        if let Some(uid) = synthesized.get(dst_path) {
            return *uid;
        }

        let parent_path = parent_of(dst_path);
        let parent_uid = self.ensure_dir_chain(device, &parent_path, synthesized, dst_tree, batch_uid, op_uid_seq);

        let new_uid = self.dst_uid_gen.next_uid();
        synthesized.insert(dst_path.to_string(), new_uid);

        let dn_uid = DnUid::new(device, new_uid);
        let planning_dir = Node::planning_local_dir(dn_uid, parent_uid);

        let op = UserOp::new(
            self.op_uid_gen.next_uid().0,
            batch_uid,
            OpType::Mkdir,
            planning_dir.clone(),
            None,
            now_ts(),
        );
        op_uid_seq.push(op);

        dst_tree.insert(SpidNodePair::new(
            Spid::new(dn_uid, dst_path.to_string()),
            planning_dir,
            Category::Added,
        ));

        new_uid
    }

    /// Finds a node already occupying `parent`'s child slot named `name`,
    /// for the "identical node at dst" adoption rule. Multiple matches log a warning and adopt the first.
    fn find_name_collision(&self, parent: DnUid, name: &str) -> Option<Node> {
        let mut matches: Vec<Node> = self
            .memstore
            .children_of(parent)
            .into_iter()
            .filter(|n| path_basename(name) == path_basename(n.name().unwrap_or_default()) || n.name() == Some(name))
            .collect();

        if matches.len() > 1 {
            tracing::warn!(parent = %parent, name, count = matches.len(), "multiple dst nodes share a name; adopting the first");
        }
        if matches.is_empty() {
            None
        } else {
            Some(matches.remove(0))
        }
    }

    pub fn build(&self, req: ChangeTreeRequest) -> OutletResult<ChangeTreeResult> {
        let mut dst_tree = ChangeTree::default();
        let mut src_tree = ChangeTree::default();
        let mut ops = Vec::new();
        let mut synthesized_dirs: HashMap<String, Uid> = HashMap::new();

        let root_name = path_basename(&req.src_root_path).to_string();
        let dst_root_path = join_path(&req.dst_root_parent_path, &root_name);

        let root_dir_uid = self.ensure_dir_chain(
            req.dst_device,
            &dst_root_path,
            &mut synthesized_dirs,
            &mut dst_tree,
            req.batch_uid,
            &mut ops,
        );
        synthesized_dirs.insert(dst_root_path.clone(), root_dir_uid);

        for leaf in &req.leaves {
            let src_path = join_path(&req.src_root_path, &leaf.relative_path);
            let dst_path = join_path(&dst_root_path, &leaf.relative_path);
            let dst_parent_path = parent_of(&dst_path);

            let parent_uid = self.ensure_dir_chain(
                req.dst_device,
                &dst_parent_path,
                &mut synthesized_dirs,
                &mut dst_tree,
                req.batch_uid,
                &mut ops,
            );

            let src_uid = self
                .memstore
                .uid_for_path(req.src_device, &src_path)
                .unwrap_or(Uid::NULL);
            let src_dn_uid = DnUid::new(req.src_device, src_uid);
            let src_node = self.memstore.get(src_dn_uid).unwrap_or_else(|| {
                Node::planning_local_file(src_dn_uid, Uid::NULL, leaf.size)
            });

            let dst_name = path_basename(&leaf.relative_path).to_string();
            let by_path = self.memstore.uid_for_path(req.dst_device, &dst_path);
            let by_name = self.find_name_collision(DnUid::new(req.dst_device, parent_uid), &dst_name);
            let existing = by_path
                .and_then(|uid| self.memstore.get(DnUid::new(req.dst_device, uid)))
                .or(by_name);

            let (op_type, dst_node, category) = match existing {
                Some(existing_node)
                    if existing_node.content_signature() == Some((leaf.size, leaf.md5.as_deref())) =>
                {
                    (req.kind.file_op_type(true), existing_node, Category::Updated)
                }
                Some(_existing_node) => {
                    // Distinct nodes sharing the same name at dst are a
                    // hard conflict: refuse rather than overwrite an
                    // unrelated node.
                    return Err(OutletError::IdMappingConflict {
                        kind: "dst_name",
                        key: dst_path.clone(),
                        reason: "distinct nodes share this name at the destination".to_string(),
                    });
                }
                None => {
                    let dst_uid = self.dst_uid_gen.next_uid();
                    let planning = Node::planning_local_file(DnUid::new(req.dst_device, dst_uid), parent_uid, leaf.size);
                    (req.kind.file_op_type(false), planning, Category::Added)
                }
            };

            let op = UserOp::new(
                self.op_uid_gen.next_uid().0,
                req.batch_uid,
                op_type,
                src_node.clone(),
                Some(dst_node.clone()),
                now_ts(),
            );

            dst_tree.insert(SpidNodePair::new(
                Spid::new(dst_node.node_id(), dst_path.clone()),
                dst_node,
                category,
            ));

            if req.kind == ChangeKind::Mv {
                src_tree.insert(SpidNodePair::new(
                    Spid::new(src_node.node_id(), src_path),
                    src_node,
                    Category::Deleted,
                ));
            }

            ops.push(op);
        }

        Ok(ChangeTreeResult { src_tree, dst_tree, ops })
    }
}

fn parent_of(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) => "/".to_string(),
        Some(idx) => trimmed[..idx].to_string(),
        None => "/".to_string(),
    }
}

fn path_basename(path: &str) -> &str {
    path.trim_end_matches('/').rsplit('/').next().unwrap_or(path)
}

fn join_path(parent: &str, child: &str) -> String {
    if parent.ends_with('/') {
        format!("{parent}{child}")
    } else {
        format!("{parent}/{child}")
    }
}

fn now_ts() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::DeviceUid;

    #[test]
    fn synthesizes_ancestors_in_order_for_s1() {
        let memstore = Memstore::new();
        let dst_uid_gen = UidGenerator::new(Uid::NULL);
        let op_uid_gen = UidGenerator::new(Uid::NULL);
        let builder = ChangeTreeBuilder::new(&memstore, &dst_uid_gen, &op_uid_gen);

        let src_device = DeviceUid::new();
        let dst_device = DeviceUid::new();
        // S1: dst already exists as an empty directory; only /dst/a and
        // /dst/a/b need synthesizing.
        memstore.register_path(dst_device, "/dst".to_string(), Uid(5));

        let req = ChangeTreeRequest {
            batch_uid: 1,
            src_device,
            src_root_path: "/src/a".to_string(),
            dst_device,
            dst_root_parent_path: "/dst".to_string(),
            leaves: vec![SourceLeaf {
                relative_path: "b/file1".to_string(),
                size: 10,
                md5: Some("abc".to_string()),
            }],
            kind: ChangeKind::Cp,
        };

        let result = builder.build(req).unwrap();

        assert_eq!(result.ops.len(), 3);
        assert_eq!(result.ops[0].op_type, OpType::Mkdir);
        assert_eq!(result.ops[1].op_type, OpType::Mkdir);
        assert_eq!(result.ops[2].op_type, OpType::Cp);
        assert!(result.ops[0].op_uid < result.ops[1].op_uid);
        assert!(result.ops[1].op_uid < result.ops[2].op_uid);
    }

    #[test]
    fn no_mkdir_emitted_for_existing_ancestor() {
        let memstore = Memstore::new();
        let dst_uid_gen = UidGenerator::new(Uid::NULL);
        let op_uid_gen = UidGenerator::new(Uid::NULL);

        let dst_device = DeviceUid::new();
        // Pre-populate /dst in the cache.
        memstore.register_path(dst_device, "/dst".to_string(), Uid(5));

        let builder = ChangeTreeBuilder::new(&memstore, &dst_uid_gen, &op_uid_gen);
        let req = ChangeTreeRequest {
            batch_uid: 1,
            src_device: DeviceUid::new(),
            src_root_path: "/src/a".to_string(),
            dst_device,
            dst_root_parent_path: "/dst".to_string(),
            leaves: vec![SourceLeaf {
                relative_path: "file1".to_string(),
                size: 1,
                md5: None,
            }],
            kind: ChangeKind::Cp,
        };

        let result = builder.build(req).unwrap();
        // /dst exists, but /dst/a does not: exactly one MKDIR then one CP.
        assert_eq!(result.ops.len(), 2);
        assert_eq!(result.ops[0].op_type, OpType::Mkdir);
        assert_eq!(result.ops[1].op_type, OpType::Cp);
    }

    #[test]
    fn dst_name_collision_with_distinct_content_is_refused() {
        let memstore = Memstore::new();
        let dst_uid_gen = UidGenerator::new(Uid::NULL);
        let op_uid_gen = UidGenerator::new(Uid::NULL);

        let dst_device = DeviceUid::new();
        memstore.register_path(dst_device, "/dst".to_string(), Uid(5));
        let unrelated = Node::planning_local_file(DnUid::new(dst_device, Uid(6)), Uid(5), 999);
        memstore.upsert_single_node(unrelated);
        memstore.register_path(dst_device, "/dst/file1".to_string(), Uid(6));

        let builder = ChangeTreeBuilder::new(&memstore, &dst_uid_gen, &op_uid_gen);
        let req = ChangeTreeRequest {
            batch_uid: 1,
            src_device: DeviceUid::new(),
            src_root_path: "/src/a".to_string(),
            dst_device,
            dst_root_parent_path: "/dst".to_string(),
            leaves: vec![SourceLeaf {
                relative_path: "file1".to_string(),
                size: 1,
                md5: Some("distinct-content".to_string()),
            }],
            kind: ChangeKind::Cp,
        };

        let result = builder.build(req);
        assert!(matches!(result, Err(OutletError::IdMappingConflict { .. })));
    }
}
