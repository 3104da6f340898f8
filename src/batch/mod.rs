//! BatchGraphBuilder: `reduce_and_validate` then
//! `build_batch_graph`.

use crate::error::{OutletError, OutletResult};
use crate::op::{Batch, OpType, UserOp};
use crate::op_graph::{OgnId, OgnKind, OpGraph};
use crate::shared::{DnUid, Uid};
use std::collections::{HashMap, HashSet};

/// Sorts by `op_uid`, coalesces exact duplicates, and raises
/// [`OutletError::BatchConflict`] on true conflicts (same key, differing
/// src or type).
pub fn reduce_and_validate(batch: &Batch) -> OutletResult<Batch> {
    if !batch.verify_single_batch_uid() {
        return Err(OutletError::InvalidBatch {
            batch_uid: batch.batch_uid,
            reason: "ops do not share one batch_uid".to_string(),
        });
    }

    let mut sorted: Vec<UserOp> = batch.ops.clone();
    sorted.sort_by_key(|op| op.op_uid);

    // Step 2: dedup per key. Unary ops (MKDIR/RM) key by target uid;
    // binary ops key by {device_uid}:{parent_uid}/{dst.name}.
    let mut seen: HashMap<String, UserOp> = HashMap::new();
    let mut deduped = Vec::new();

    for op in sorted {
        let key = dedup_key(&op);
        match seen.get(&key) {
            None => {
                seen.insert(key, op.clone());
                deduped.push(op);
            }
            Some(prior) => {
                if prior.op_type.conflict_equivalence_class() == op.op_type.conflict_equivalence_class()
                    && prior.src_node.node_id() == op.src_node.node_id()
                {
                    // exact duplicate: discard the later one
                    continue;
                }
                return Err(OutletError::BatchConflict {
                    batch_uid: batch.batch_uid,
                    reason: format!("conflicting ops for key {key}"),
                });
            }
        }
    }

    // Step 3: ancestor validation.
    let mkdir_set: HashSet<Uid> = deduped
        .iter()
        .filter(|op| op.op_type == OpType::Mkdir)
        .map(|op| op.src_node.node_id().uid)
        .collect();
    let rm_ops: HashMap<Uid, u64> = deduped
        .iter()
        .filter(|op| op.op_type == OpType::Rm)
        .map(|op| (op.src_node.node_id().uid, op.op_uid))
        .collect();
    let cp_dst_set: HashSet<Uid> = deduped
        .iter()
        .filter_map(|op| op.dst_node.as_ref())
        .map(|n| n.node_id().uid)
        .collect();
    let src_set: HashSet<Uid> = deduped.iter().map(|op| op.src_node.node_id().uid).collect();

    for op in &deduped {
        match op.op_type {
            OpType::Rm => {
                for ancestor in op.src_node.parent_uids() {
                    if mkdir_set.contains(&ancestor) {
                        return Err(OutletError::InvalidBatch {
                            batch_uid: batch.batch_uid,
                            reason: format!("RM target has an ancestor being created ({ancestor})"),
                        });
                    }
                }
            }
            OpType::Mkdir => {
                for ancestor in op.src_node.parent_uids() {
                    if let Some(&rm_op_uid) = rm_ops.get(&ancestor) {
                        if rm_op_uid < op.op_uid {
                            return Err(OutletError::InvalidBatch {
                                batch_uid: batch.batch_uid,
                                reason: format!("MKDIR target has an ancestor being removed ({ancestor})"),
                            });
                        }
                    }
                }
            }
            _ if op.is_binary() => {
                for ancestor in op.src_node.parent_uids() {
                    if mkdir_set.contains(&ancestor) || cp_dst_set.contains(&ancestor) {
                        return Err(OutletError::InvalidBatch {
                            batch_uid: batch.batch_uid,
                            reason: format!("binary src has an ancestor being created ({ancestor})"),
                        });
                    }
                    if let Some(&rm_op_uid) = rm_ops.get(&ancestor) {
                        if rm_op_uid <= op.op_uid {
                            return Err(OutletError::InvalidBatch {
                                batch_uid: batch.batch_uid,
                                reason: format!("binary src read after its ancestor's removal ({ancestor})"),
                            });
                        }
                    }
                }
                if let Some(dst) = &op.dst_node {
                    for ancestor in dst.parent_uids() {
                        if rm_ops.contains_key(&ancestor) {
                            return Err(OutletError::InvalidBatch {
                                batch_uid: batch.batch_uid,
                                reason: format!("binary dst has an ancestor being removed ({ancestor})"),
                            });
                        }
                        if src_set.contains(&ancestor) {
                            return Err(OutletError::InvalidBatch {
                                batch_uid: batch.batch_uid,
                                reason: format!("binary dst has an ancestor used as a src ({ancestor})"),
                            });
                        }
                    }
                }
            }
            _ => {}
        }
    }

    Ok(Batch::new(batch.batch_uid, deduped))
}

fn dedup_key(op: &UserOp) -> String {
    match op.op_type {
        OpType::Mkdir | OpType::Rm => format!("unary:{}", op.src_node.node_id()),
        _ => {
            let dst = op.dst_node.as_ref();
            let parent = dst.map(|n| n.parent_uids().first().copied().unwrap_or(Uid::NULL));
            let name = dst.and_then(|n| n.name()).unwrap_or("");
            format!(
                "binary:{}:{}/{name}",
                dst.map(|n| n.node_id().device_uid.to_string()).unwrap_or_default(),
                parent.unwrap_or(Uid::NULL)
            )
        }
    }
}

pub struct BatchGraphResult {
    pub inserted: Vec<(UserOp, OgnId)>,
    pub discarded: Vec<UserOp>,
}

/// Produces OGNs for a reduced batch and links them into the main graph,
/// validating against the master cache.
/// `existing_target_resolver` answers "does this UID already exist in the
/// cache (or is it being created earlier in this batch)?" — supplied by
/// the caller (OpManager) since BatchGraphBuilder itself holds no cache
/// reference.
pub fn build_batch_graph(
    graph: &OpGraph,
    reduced: &Batch,
    node_exists: impl Fn(DnUid) -> bool,
    max_admitted_op_uid: u64,
) -> OutletResult<BatchGraphResult> {
    build_batch_graph_with_children(graph, reduced, node_exists, |_| Vec::new(), max_admitted_op_uid)
}

/// Full form of [`build_batch_graph`] taking a `children_of` resolver so RM
/// inversion
/// can find each child's in-flight OGN and wire it as a parent of the
/// directory's RmOGN. `build_batch_graph` itself is kept for callers (and
/// the unit tests below) that don't care about RM inversion.
pub fn build_batch_graph_with_children(
    graph: &OpGraph,
    reduced: &Batch,
    node_exists: impl Fn(DnUid) -> bool,
    children_of: impl Fn(DnUid) -> Vec<DnUid>,
    max_admitted_op_uid: u64,
) -> OutletResult<BatchGraphResult> {
    let min_op_uid = reduced.ops.iter().map(|op| op.op_uid).min().unwrap_or(0);
    if min_op_uid > 0 && min_op_uid <= max_admitted_op_uid {
        return Err(OutletError::InvalidBatch {
            batch_uid: reduced.batch_uid,
            reason: "batch op_uid range overlaps already-admitted ops (replay protection)".to_string(),
        });
    }

    let mut inserted = Vec::new();
    let mut discarded = Vec::new();
    let mut created_this_batch: HashSet<DnUid> = HashSet::new();

    for op in reduced.sorted_by_op_uid() {
        let device = op.src_node.node_id().device_uid;
        let parent_ok = op.src_node.parent_uids().iter().all(|p| {
            let dn = DnUid::new(device, *p);
            // SUPER_ROOT is the OGN graph's sentinel, not a cache-resident
            // node: a top-level node's parent_uid is SUPER_ROOT exactly
            // when it has no real ancestor to check for.
            p.is_null() || *p == Uid::SUPER_ROOT || node_exists(dn) || created_this_batch.contains(&dn)
        });

        if op.op_type.is_create_type() && !parent_ok {
            discarded.push(op.clone());
            continue;
        }
        if !op.op_type.is_create_type() && !node_exists(op.src_node.node_id()) {
            discarded.push(op.clone());
            continue;
        }

        let target = op.src_node.node_id();
        let ancestor_uids = op.src_node.parent_uids();
        let ancestor_targets: Vec<DnUid> = ancestor_uids
            .iter()
            .map(|u| DnUid::new(target.device_uid, *u))
            .collect();

        let kind = if op.op_type.is_remove_type() { OgnKind::Rm } else { OgnKind::Src };
        let descendant_ogns: Vec<OgnId> = if kind == OgnKind::Rm {
            children_of(target)
                .into_iter()
                .filter_map(|child| graph.current_ogn_for_target(child))
                .collect()
        } else {
            Vec::new()
        };
        let src_id = graph.enqueue_single_ogn(
            kind,
            op.op_uid,
            Some(op.op_type),
            Some(target),
            ancestor_uids.clone(),
            &ancestor_targets,
            &descendant_ogns,
            op.op_type == OpType::Cp,
        );

        if op.is_binary() {
            if let Some(dst) = &op.dst_node {
                let dst_target = dst.node_id();
                let dst_ancestors = dst.parent_uids();
                let dst_ancestor_targets: Vec<DnUid> = dst_ancestors
                    .iter()
                    .map(|u| DnUid::new(dst_target.device_uid, *u))
                    .collect();
                let dst_id = graph.enqueue_single_ogn(
                    OgnKind::Dst,
                    op.op_uid,
                    Some(op.op_type),
                    Some(dst_target),
                    dst_ancestors,
                    &dst_ancestor_targets,
                    &[],
                    false,
                );
                graph.pair(src_id, dst_id);
            }
        }

        if op.op_type.is_create_type() {
            created_this_batch.insert(op.src_node.node_id());
        }
        inserted.push((op.clone(), src_id));
    }

    Ok(BatchGraphResult { inserted, discarded })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::node::Node;
    use crate::shared::{DeviceUid, DnUid};

    fn dn(device: DeviceUid, uid: u64) -> DnUid {
        DnUid::new(device, Uid(uid))
    }

    #[test]
    fn reduction_is_idempotent() {
        let device = DeviceUid::new();
        let op = UserOp::new(1, 1, OpType::Mkdir, Node::planning_local_dir(dn(device, 5), Uid(1)), None, 0);
        let batch = Batch::new(1, vec![op]);
        let once = reduce_and_validate(&batch).unwrap();
        let twice = reduce_and_validate(&once).unwrap();
        assert_eq!(once.ops.len(), twice.ops.len());
    }

    #[test]
    fn s2_conflict_rejection_mkdir_then_rm_of_child() {
        let device = DeviceUid::new();
        let x = Node::planning_local_dir(dn(device, 10), Uid(1));
        let y = Node::planning_local_dir(dn(device, 11), Uid(10));
        let mkdir_x = UserOp::new(1, 1, OpType::Mkdir, x, None, 0);
        let rm_y = UserOp::new(2, 1, OpType::Rm, y, None, 0);
        let batch = Batch::new(1, vec![mkdir_x, rm_y]);

        let result = reduce_and_validate(&batch);
        assert!(result.is_err());
    }

    #[test]
    fn binary_dst_rejected_when_ancestor_is_also_a_src() {
        let device = DeviceUid::new();
        // op 1 reads uid 10 as a src; op 2 wants to CP into a dir whose
        // parent is uid 10 — that ancestor is itself being read as a src.
        let src1 = Node::planning_local_file(dn(device, 10), Uid(1), 5);
        let cp1 = UserOp::new(1, 1, OpType::Cp, src1, Some(Node::planning_local_file(dn(device, 20), Uid(1), 5)), 0);

        let src2 = Node::planning_local_file(dn(device, 30), Uid(1), 5);
        let dst2 = Node::planning_local_file(dn(device, 31), Uid(10), 5);
        let cp2 = UserOp::new(2, 1, OpType::Cp, src2, Some(dst2), 0);

        let batch = Batch::new(1, vec![cp1, cp2]);
        let result = reduce_and_validate(&batch);
        assert!(result.is_err());
    }
}
