//! `UserOp` and `Batch`.
//!
//! Outlet uses a single `OpType` enum everywhere (see DESIGN.md for the
//! reasoning): there is no separate later-stage code. `START_DIR_CP`/
//! `FINISH_DIR_CP` (and the MV variants) are plain `OpType` variants like
//! any other, and their mutual-equivalence rule for conflict purposes is
//! implemented as a method on `OpType`, not a second type.

use crate::model::node::Node;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpType {
    Mkdir,
    Rm,
    Cp,
    CpOnto,
    Mv,
    MvOnto,
    StartDirCp,
    FinishDirCp,
    StartDirMv,
    FinishDirMv,
}

impl OpType {
    /// True for ops whose target is a binary (src, dst) pair rather than
    /// a single node.
    pub fn is_binary(&self) -> bool {
        !matches!(self, OpType::Mkdir | OpType::Rm)
    }

    pub fn is_create_type(&self) -> bool {
        matches!(
            self,
            OpType::Mkdir
                | OpType::Cp
                | OpType::CpOnto
                | OpType::Mv
                | OpType::MvOnto
                | OpType::StartDirCp
                | OpType::StartDirMv
        )
    }

    pub fn is_remove_type(&self) -> bool {
        matches!(self, OpType::Rm)
    }

    /// START_DIR_CP/FINISH_DIR_CP are mutually equivalent for conflict
    /// purposes, and likewise for the MV variants.
    pub fn conflict_equivalence_class(&self) -> OpType {
        match self {
            OpType::StartDirCp | OpType::FinishDirCp => OpType::StartDirCp,
            OpType::StartDirMv | OpType::FinishDirMv => OpType::StartDirMv,
            other => *other,
        }
    }
}

impl fmt::Display for OpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Execution status of a [`UserOp`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserOpStatus {
    NotStarted,
    Executing,
    Completed,
    /// Does not archive the op; it stays in pending for user resolution.
    StoppedOnError,
    /// Children of an op that finishes in an error status are marked
    /// this way rather than made runnable.
    BlockedByError,
}

impl UserOpStatus {
    pub fn is_stopped_on_error(&self) -> bool {
        matches!(self, UserOpStatus::StoppedOnError)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, UserOpStatus::Completed | UserOpStatus::StoppedOnError)
    }
}

fn default_to_trash() -> bool {
    true
}

/// One unit of user-requested work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserOp {
    pub op_uid: u64,
    pub batch_uid: u64,
    pub op_type: OpType,
    pub src_node: Node,
    pub dst_node: Option<Node>,
    pub create_ts: i64,
    pub status: UserOpStatus,
    /// For an RM op against a GDrive node: trash it (recoverable) rather
    /// than delete it outright. Ignored by every other op type/backend.
    #[serde(default = "default_to_trash")]
    pub to_trash: bool,
}

impl UserOp {
    pub fn new(
        op_uid: u64,
        batch_uid: u64,
        op_type: OpType,
        src_node: Node,
        dst_node: Option<Node>,
        create_ts: i64,
    ) -> Self {
        Self {
            op_uid,
            batch_uid,
            op_type,
            src_node,
            dst_node,
            create_ts,
            status: UserOpStatus::NotStarted,
            to_trash: default_to_trash(),
        }
    }

    pub fn is_binary(&self) -> bool {
        self.op_type.is_binary()
    }

    /// Overrides the default trash-vs-permanent-delete preference for an
    /// RM op against a GDrive node.
    pub fn with_to_trash(mut self, to_trash: bool) -> Self {
        self.to_trash = to_trash;
        self
    }
}

/// An ordered list of [`UserOp`]s sharing one `batch_uid`: all-or-nothing for *validation*, but each op executes
/// independently once admitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    pub batch_uid: u64,
    pub ops: Vec<UserOp>,
}

impl Batch {
    pub fn new(batch_uid: u64, ops: Vec<UserOp>) -> Self {
        Self { batch_uid, ops }
    }

    /// Verifies all ops share one batch_uid.
    pub fn verify_single_batch_uid(&self) -> bool {
        self.ops.iter().all(|op| op.batch_uid == self.batch_uid)
    }

    pub fn sorted_by_op_uid(&self) -> Vec<&UserOp> {
        let mut ops: Vec<&UserOp> = self.ops.iter().collect();
        ops.sort_by_key(|op| op.op_uid);
        ops
    }
}
