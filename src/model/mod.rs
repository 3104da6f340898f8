//! The node model and the change-tree-scoped
//! SPID/SPIDNodePair types (glossary "SPID", "SN").

pub mod node;
pub mod spid;

pub use node::{Node, NodeData, TrashStatus};
pub use spid::{Category, Spid, SpidNodePair};
