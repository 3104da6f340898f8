//! OpGraph: a DAG of [`node::Ogn`]s keyed by [`node::OgnId`]
//! in an arena, never by direct reference.

pub mod graph;
pub mod node;

pub use graph::{OpGraph, ROOT_ID};
pub use node::{Ogn, OgnId, OgnKind};
