//! OpGraph: a DAG over [`Ogn`]s with a shared
//! super-root. A node is **root-adjacent** once every one of its parents
//! has been popped and rewired away, leaving `Root` as its sole parent —
//! that's the condition [`OpGraph::get_next_op_nowait`] selects on.

use super::node::{Ogn, OgnId, OgnKind};
use crate::op::UserOpStatus;
use crate::shared::{DnUid, Uid};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::Notify;

pub const ROOT_ID: OgnId = 0;

struct Inner {
    arena: HashMap<OgnId, Ogn>,
    /// Most recent OGN touching each target node, for chain wiring
    ///.
    last_ogn_for_target: HashMap<DnUid, OgnId>,
}

pub struct OpGraph {
    inner: Mutex<Inner>,
    next_id: AtomicU64,
    notify: Notify,
}

impl Default for OpGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl OpGraph {
    pub fn new() -> Self {
        let mut arena = HashMap::new();
        arena.insert(ROOT_ID, Ogn::root(ROOT_ID));
        Self {
            inner: Mutex::new(Inner {
                arena,
                last_ogn_for_target: HashMap::new(),
            }),
            next_id: AtomicU64::new(ROOT_ID + 1),
            notify: Notify::new(),
        }
    }

    fn alloc_id(&self) -> OgnId {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Finds the existing parents
    /// (most recent OGN per target, and per ancestor) and links the new
    /// OGN as their child; falls back to `Root` when the target (and its
    /// ancestors) have no OGN in flight yet. For an `Rm` kind, any
    /// in-flight OGN touching a descendant is also linked as a parent —
    /// the caller supplies that set via `descendant_ogns` since the graph
    /// itself doesn't know the cache's parent/child tree.
    #[allow(clippy::too_many_arguments)]
    pub fn enqueue_single_ogn(
        &self,
        kind: OgnKind,
        op_uid: u64,
        op_type: Option<crate::op::OpType>,
        target: Option<DnUid>,
        ancestor_uids: Vec<Uid>,
        ancestor_targets: &[DnUid],
        descendant_ogns: &[OgnId],
        re_entrant: bool,
    ) -> OgnId {
        let mut inner = self.inner.lock().unwrap();
        let id = self.alloc_id();

        let mut parents = Vec::new();
        if let Some(t) = target {
            if let Some(&prev) = inner.last_ogn_for_target.get(&t) {
                parents.push(prev);
            }
        }
        for ancestor in ancestor_targets {
            if let Some(&prev) = inner.last_ogn_for_target.get(ancestor) {
                if !parents.contains(&prev) {
                    parents.push(prev);
                }
            }
        }
        if kind == OgnKind::Rm {
            for &d in descendant_ogns {
                if !parents.contains(&d) {
                    parents.push(d);
                }
            }
        }
        if parents.is_empty() {
            parents.push(ROOT_ID);
        }

        let mut ogn = Ogn {
            id,
            kind,
            op_uid,
            op_type,
            target,
            ancestor_uids,
            paired_ogn: None,
            parents: parents.clone(),
            children: Vec::new(),
            executing: false,
            re_entrant,
            status: UserOpStatus::NotStarted,
        };
        ogn.parents = parents.clone();

        for &p in &parents {
            if let Some(parent_ogn) = inner.arena.get_mut(&p) {
                parent_ogn.link_child(id);
            }
        }

        if let Some(t) = target {
            inner.last_ogn_for_target.insert(t, id);
        }

        inner.arena.insert(id, ogn);
        drop(inner);
        self.notify.notify_waiters();
        id
    }

    pub fn pair(&self, a: OgnId, b: OgnId) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(ogn) = inner.arena.get_mut(&a) {
            ogn.paired_ogn = Some(b);
        }
        if let Some(ogn) = inner.arena.get_mut(&b) {
            ogn.paired_ogn = Some(a);
        }
    }

    fn is_ready(inner: &Inner, id: OgnId) -> bool {
        let Some(ogn) = inner.arena.get(&id) else {
            return false;
        };
        if ogn.kind == OgnKind::Root {
            return false;
        }
        if ogn.kind == OgnKind::Dst {
            // Dst OGNs are structural only: the executor
            // dispatches once per op_uid, keyed on the Src/Rm half: when
            // that half is ready, `pop_op` pops its paired Dst alongside
            // it. A Dst never surfaces as a dispatch target on its own.
            return false;
        }
        if ogn.executing {
            return false;
        }
        if ogn.parents != [ROOT_ID] {
            return false;
        }
        if !ogn.re_entrant {
            // non-re-entrant: must be the only OGN currently in-flight on
            // its target.
            if let Some(target) = ogn.target {
                let in_flight_on_target = inner
                    .arena
                    .values()
                    .any(|o| o.id != id && o.executing && o.target == Some(target));
                if in_flight_on_target {
                    return false;
                }
            }
        }
        if let Some(paired) = ogn.paired_ogn {
            if !matches!(inner.arena.get(&paired), Some(p) if p.parents == [ROOT_ID] && !p.executing) {
                return false;
            }
        }
        true
    }

    /// BFS from Root, tie-break ascending `op_uid`. Non-blocking variant
    /// of [`Self::get_next_op`].
    pub fn get_next_op_nowait(&self) -> Option<OgnId> {
        let inner = self.inner.lock().unwrap();
        let mut queue = VecDeque::new();
        let mut visited = std::collections::HashSet::new();
        queue.push_back(ROOT_ID);
        visited.insert(ROOT_ID);

        let mut ready = Vec::new();
        while let Some(id) = queue.pop_front() {
            let Some(ogn) = inner.arena.get(&id) else { continue };
            for &child in &ogn.children {
                if visited.insert(child) {
                    queue.push_back(child);
                    if Self::is_ready(&inner, child) {
                        ready.push(child);
                    }
                }
            }
        }

        ready.sort_by_key(|id| inner.arena.get(id).map(|o| o.op_uid).unwrap_or(u64::MAX));
        ready.into_iter().next()
    }

    /// Blocking variant: waits for `notify_waiters` (fired whenever the
    /// graph changes) until an op becomes ready or `shutdown` resolves.
    pub async fn get_next_op(&self, shutdown: &tokio::sync::watch::Receiver<bool>) -> Option<OgnId> {
        loop {
            if let Some(id) = self.get_next_op_nowait() {
                return Some(id);
            }
            if *shutdown.borrow() {
                return None;
            }
            tokio::select! {
                _ = self.notify.notified() => {}
                _ = tokio::time::sleep(std::time::Duration::from_millis(500)) => {}
            }
            if *shutdown.borrow() {
                return None;
            }
        }
    }

    pub fn mark_executing(&self, id: OgnId, executing: bool) {
        let mut inner = self.inner.lock().unwrap();
        let paired = inner.arena.get(&id).and_then(|o| o.paired_ogn);
        if let Some(ogn) = inner.arena.get_mut(&id) {
            ogn.executing = executing;
        }
        if let Some(paired_id) = paired {
            if let Some(ogn) = inner.arena.get_mut(&paired_id) {
                ogn.executing = executing;
            }
        }
    }

    /// Removes the OGN, rewiring its children's
    /// parent lists (promoting them toward Root); on an error status,
    /// children are instead marked `BlockedByError` and **retained** in
    /// the graph. A binary op's Src/Rm half and its paired Dst half are
    /// always popped together, so callers only ever track one `OgnId`
    /// per `op_uid`.
    pub fn pop_op(&self, id: OgnId, status: UserOpStatus) {
        let mut inner = self.inner.lock().unwrap();
        let paired = inner.arena.get(&id).and_then(|o| o.paired_ogn);

        Self::remove_one(&mut inner, id, status);
        if let Some(paired_id) = paired {
            Self::remove_one(&mut inner, paired_id, status);
        }

        drop(inner);
        self.notify.notify_waiters();
    }

    fn remove_one(inner: &mut Inner, id: OgnId, status: UserOpStatus) {
        let Some(children) = inner.arena.get(&id).map(|o| o.children.clone()) else {
            return;
        };
        inner.arena.remove(&id);
        inner.last_ogn_for_target.retain(|_, v| *v != id);

        for child_id in children {
            if status.is_stopped_on_error() {
                if let Some(child) = inner.arena.get_mut(&child_id) {
                    child.status = UserOpStatus::BlockedByError;
                }
                continue;
            }
            let became_root_adjacent = if let Some(child) = inner.arena.get_mut(&child_id) {
                child.unlink_parent(id);
                if child.parents.is_empty() {
                    child.parents.push(ROOT_ID);
                    true
                } else {
                    false
                }
            } else {
                false
            };
            if became_root_adjacent {
                if let Some(root) = inner.arena.get_mut(&ROOT_ID) {
                    root.link_child(child_id);
                }
            }
        }
    }

    pub fn get(&self, id: OgnId) -> Option<Ogn> {
        self.inner.lock().unwrap().arena.get(&id).cloned()
    }

    /// The OGN currently touching `target`, if any — used to find the
    /// in-flight OGN a descendant's removal must wait on.
    pub fn current_ogn_for_target(&self, target: DnUid) -> Option<OgnId> {
        self.inner.lock().unwrap().last_ogn_for_target.get(&target).copied()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() <= 1 // Root always present
    }
}
