//! Signal bus: a single `tokio::sync::broadcast` channel, `emit`/
//! `subscribe`. Fanning this out over a transport (gRPC, IPC, whatever
//! an embedder picks) is out of scope here — a future transport layer
//! subscribes to it the same way a test does.

use crate::model::node::Node;
use crate::op::user_op::OpType;
use crate::shared::DnUid;
use std::fmt;
use tokio::sync::broadcast;

/// One signal the core emits. Display-only signals like
/// `DISPLAY_TREE_CHANGED` are kept because a display layer is a
/// plausible external subscriber, not because the core itself interprets
/// them.
#[derive(Debug, Clone)]
pub enum Signal {
    NodeUpsertedInCache { node: Box<Node> },
    NodeRemovedInCache { dn_uid: DnUid },
    SubtreeNodesChangedInCache { root: DnUid },

    DisplayTreeChanged { root: DnUid },
    LoadSubtreeDone { root: DnUid },

    CommandComplete { op_uid: u64, op_type: OpType },
    BatchFailed { batch_uid: u64, reason: String },
    ErrorOccurred { message: String },

    OpExecutionPlayStateChanged { running: bool },
    PauseOpExecution,
    ResumeOpExecution,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::NodeUpsertedInCache { node } => {
                write!(f, "NODE_UPSERTED_IN_CACHE({})", node.node_id())
            }
            Signal::NodeRemovedInCache { dn_uid } => {
                write!(f, "NODE_REMOVED_IN_CACHE({dn_uid})")
            }
            Signal::SubtreeNodesChangedInCache { root } => {
                write!(f, "SUBTREE_NODES_CHANGED_IN_CACHE({root})")
            }
            Signal::DisplayTreeChanged { root } => write!(f, "DISPLAY_TREE_CHANGED({root})"),
            Signal::LoadSubtreeDone { root } => write!(f, "LOAD_SUBTREE_DONE({root})"),
            Signal::CommandComplete { op_uid, op_type } => {
                write!(f, "COMMAND_COMPLETE(op={op_uid}, {op_type:?})")
            }
            Signal::BatchFailed { batch_uid, reason } => {
                write!(f, "BATCH_FAILED(batch={batch_uid}: {reason})")
            }
            Signal::ErrorOccurred { message } => write!(f, "ERROR_OCCURRED({message})"),
            Signal::OpExecutionPlayStateChanged { running } => {
                write!(f, "OP_EXECUTION_PLAY_STATE_CHANGED(running={running})")
            }
            Signal::PauseOpExecution => write!(f, "PAUSE_OP_EXECUTION"),
            Signal::ResumeOpExecution => write!(f, "RESUME_OP_EXECUTION"),
        }
    }
}

/// Signal bus for broadcasting to all subscribers: `broadcast` gives
/// every receiver its own lagging-tolerant queue, in-process.
pub struct EventBus {
    sender: broadcast::Sender<Signal>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn emit(&self, signal: Signal) {
        tracing::debug!(%signal, "signal emitted");
        let _ = self.sender.send(signal);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Signal> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
