//! `OpGraphNode` (OGN) arena entry.

use crate::op::{OpType, UserOpStatus};
use crate::shared::{DnUid, Uid};

pub type OgnId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OgnKind {
    /// SUPER_ROOT — multi-child, unique singleton.
    Root,
    /// Source half of a binary op, or the whole of a unary create op
    /// (MKDIR). Multi-parent, multi-child.
    Src,
    /// Destination half of a binary op. Multi-parent, multi-child.
    Dst,
    /// RM half — multi-parent, single child due to inverted wiring
    ///.
    Rm,
}

/// One vertex of the OpGraph. Stored in
/// [`super::graph::OpGraph`]'s arena and referenced only by [`OgnId`].
#[derive(Debug, Clone)]
pub struct Ogn {
    pub id: OgnId,
    pub kind: OgnKind,
    pub op_uid: u64,
    pub op_type: Option<OpType>,
    /// The node this OGN reads or writes. `None` only for `Root`.
    pub target: Option<DnUid>,
    /// Ancestor UIDs of `target`, for structural lookups.
    pub ancestor_uids: Vec<Uid>,
    /// The other half of a binary op's OGN pair (Src↔Dst), if any.
    pub paired_ogn: Option<OgnId>,
    pub parents: Vec<OgnId>,
    pub children: Vec<OgnId>,
    pub executing: bool,
    /// Only `Src` OGNs of a CP are re-entrant.
    pub re_entrant: bool,
    pub status: UserOpStatus,
}

impl Ogn {
    pub fn root(id: OgnId) -> Self {
        Self {
            id,
            kind: OgnKind::Root,
            op_uid: 0,
            op_type: None,
            target: None,
            ancestor_uids: Vec::new(),
            paired_ogn: None,
            parents: Vec::new(),
            children: Vec::new(),
            executing: false,
            re_entrant: false,
            status: UserOpStatus::NotStarted,
        }
    }

    pub fn link_child(&mut self, child: OgnId) {
        if self.kind == OgnKind::Rm {
            // RmOGN has a single child by construction: the thing it's wired beneath, not a fan-out.
            if !self.children.contains(&child) {
                self.children = vec![child];
            }
            return;
        }
        if !self.children.contains(&child) {
            self.children.push(child);
        }
    }

    pub fn link_parent(&mut self, parent: OgnId) {
        if !self.parents.contains(&parent) {
            self.parents.push(parent);
        }
    }

    pub fn unlink_parent(&mut self, parent: OgnId) {
        self.parents.retain(|p| *p != parent);
    }
}
