//! SPID / SPIDNodePair — the unit the ChangeTreeBuilder works in
//! (glossary "SPID", "SPIDNodePair (SN)").

use crate::model::node::Node;
use crate::shared::{DnUid, Guid};
use serde::{Deserialize, Serialize};

/// Single-path node identifier: a node UID plus one chosen path among
/// the possibly-several paths a multi-parent GDrive node can have.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Spid {
    pub dn_uid: DnUid,
    pub path: String,
}

impl Spid {
    pub fn new(dn_uid: DnUid, path: impl Into<String>) -> Self {
        Self {
            dn_uid,
            path: path.into(),
        }
    }
}

/// The display category a change-tree op is bucketed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Added,
    Deleted,
    Moved,
    Updated,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Added => "added",
            Category::Deleted => "deleted",
            Category::Moved => "moved",
            Category::Updated => "updated",
        }
    }
}

/// `(SPID, Node)` — the unit used in ChangeTrees (glossary "SN").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpidNodePair {
    pub spid: Spid,
    pub node: Node,
    pub category: Category,
}

impl SpidNodePair {
    pub fn new(spid: Spid, node: Node, category: Category) -> Self {
        Self {
            spid,
            node,
            category,
        }
    }

    /// The change-tree-scoped GUID for this pair:
    /// embeds the category so the same underlying node can appear once
    /// per category without key collisions in the ChangeTree map.
    pub fn guid(&self) -> Guid {
        Guid::for_node_in_category(self.spid.dn_uid, self.category.as_str())
    }
}
