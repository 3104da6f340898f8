//! `CacheWriteOp` — the typed mutation vocabulary every cache change goes
//! through.

use crate::model::node::Node;
use crate::shared::DnUid;

/// Every mutation to the node cache is expressed as one of these variants
/// so that the three-phase contract (memstore → diskstore → signals) has
/// a single choke point instead of being reimplemented per call site.
#[derive(Debug, Clone)]
pub enum CacheWriteOp {
    UpsertSingleNode(Box<Node>),
    RemoveSingleNode(DnUid),
    RemoveSubtree(DnUid),
    BatchChanges(Vec<CacheWriteOp>),
    /// `folder` is authoritative for its full child list; anything missing
    /// from `children` gets unlinked from `folder` but not deleted.
    RefreshFolder {
        folder: DnUid,
        children: Vec<Node>,
    },
    CreateUser { display_name: String },
    UpsertMimeType { mime_type: String, uid: u32 },
    DeleteAllData,
}
