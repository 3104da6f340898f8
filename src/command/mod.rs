//! Command dispatch: one [`Command`] per (op_type,
//! backend) pair, run by the executor against a [`CommandContext`].

pub mod context;
pub mod executor;
pub mod gdrive;
pub mod local;
pub mod strategy;

pub use context::CommandContext;
pub use executor::Executor;

use crate::error::OutletResult;
use crate::model::node::Node;
use crate::op::{OpType, UserOp, UserOpStatus};
use crate::shared::DnUid;
use async_trait::async_trait;

/// What a command hands back to the OpManager so it can feed the cache
/// and finish the op.
#[derive(Debug, Clone)]
pub struct UserOpResult {
    pub status: UserOpStatus,
    pub to_upsert: Vec<Node>,
    pub to_delete: Vec<DnUid>,
    pub error: Option<String>,
}

impl UserOpResult {
    pub fn completed(to_upsert: Vec<Node>) -> Self {
        Self {
            status: UserOpStatus::Completed,
            to_upsert,
            to_delete: Vec::new(),
            error: None,
        }
    }

    pub fn no_op(node: Node) -> Self {
        Self {
            status: UserOpStatus::Completed,
            to_upsert: vec![node],
            to_delete: Vec::new(),
            error: None,
        }
    }

    pub fn removed(dn_uid: DnUid) -> Self {
        Self {
            status: UserOpStatus::Completed,
            to_upsert: Vec::new(),
            to_delete: vec![dn_uid],
            error: None,
        }
    }

    pub fn stopped_on_error(message: impl Into<String>) -> Self {
        Self {
            status: UserOpStatus::StoppedOnError,
            to_upsert: Vec::new(),
            to_delete: Vec::new(),
            error: Some(message.into()),
        }
    }
}

#[async_trait]
pub trait Command: Send + Sync {
    async fn run(&self, ctx: &CommandContext, op: &UserOp) -> OutletResult<UserOpResult>;
}

/// Picks the `Command` for `op.op_type`, routing local↔local copies
/// through the [`strategy::CopyStrategyRouter`] and
/// everything else to a fixed handler.
pub fn dispatch_for(op: &UserOp) -> Box<dyn Command> {
    let src_is_local = is_local(&op.src_node);
    let dst_is_local = op.dst_node.as_ref().map(is_local).unwrap_or(src_is_local);

    match op.op_type {
        OpType::Mkdir if src_is_local => Box::new(local::CreateLocalDir),
        OpType::Mkdir => Box::new(gdrive::CreateGDriveFolder),
        OpType::Rm if src_is_local => Box::new(local::DeleteLocalFile),
        OpType::Rm => Box::new(gdrive::DeleteGDriveNode),
        OpType::Cp | OpType::CpOnto | OpType::StartDirCp | OpType::FinishDirCp => {
            strategy::route_copy(src_is_local, dst_is_local)
        }
        OpType::Mv | OpType::MvOnto | OpType::StartDirMv | OpType::FinishDirMv => {
            if src_is_local && dst_is_local {
                Box::new(local::MoveFileLocally)
            } else {
                Box::new(gdrive::MoveFileGDrive)
            }
        }
    }
}

fn is_local(node: &Node) -> bool {
    use crate::model::node::NodeData;
    matches!(node.data, NodeData::LocalFile { .. } | NodeData::LocalDir { .. })
}
