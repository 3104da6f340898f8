//! OpManager: the intake pipeline between a
//! submitted [`Batch`] and the [`OpGraph`] the executor drains.

use crate::batch::{build_batch_graph_with_children, reduce_and_validate};
use crate::cache::CacheManager;
use crate::error::{OutletError, OutletResult};
use crate::infrastructure::events::{EventBus, Signal};
use crate::ledger::OpLedger;
use crate::op::{Batch, UserOp, UserOpStatus};
use crate::op_graph::{OgnId, OpGraph};
use crate::shared::DnUid;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Coordinates batch intake: reduce/validate → build the batch's OGNs →
/// splice them into the main [`OpGraph`] → upsert planning nodes into the
/// cache → persist to the ledger, in that order.
pub struct OpManager {
    cache: Arc<CacheManager>,
    graph: Arc<OpGraph>,
    ledger: Arc<OpLedger>,
    events: Arc<EventBus>,
    max_admitted_op_uid: AtomicU64,
    /// op_uid -> the UserOp, for `finish_command` to look up what it's
    /// archiving without a round trip to the ledger.
    live_ops: std::sync::Mutex<HashMap<u64, (UserOp, OgnId)>>,
}

impl OpManager {
    pub fn new(cache: Arc<CacheManager>, graph: Arc<OpGraph>, ledger: Arc<OpLedger>, events: Arc<EventBus>) -> Self {
        Self {
            cache,
            graph,
            ledger,
            events,
            max_admitted_op_uid: AtomicU64::new(0),
            live_ops: std::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Full intake path: reduce, persist, intake.
    pub async fn append_new_pending_op_batch(&self, ops: Vec<UserOp>) -> OutletResult<()> {
        let batch_uid = ops.first().map(|op| op.batch_uid).unwrap_or(0);
        let batch = Batch::new(batch_uid, ops);

        let reduced = match reduce_and_validate(&batch) {
            Ok(r) => r,
            Err(e) => {
                self.events.emit(Signal::BatchFailed {
                    batch_uid,
                    reason: e.to_string(),
                });
                return Err(e);
            }
        };

        self.ledger.upsert_pending_op_list(&reduced.ops).await?;
        self.intake_batch(reduced).await
    }

    /// Same pipeline minus reduction and the ledger write (ops are
    /// already persisted and were reduced before the crash).
    pub async fn resume_pending_ops_from_disk(&self) -> OutletResult<()> {
        let pending = self.ledger.load_all_pending_ops().await?;
        info!(count = pending.len(), "resuming pending ops from disk");

        let mut by_batch: HashMap<u64, Vec<UserOp>> = HashMap::new();
        for op in pending {
            by_batch.entry(op.batch_uid).or_default().push(op);
        }
        let mut batch_uids: Vec<u64> = by_batch.keys().copied().collect();
        batch_uids.sort_unstable();

        for batch_uid in batch_uids {
            let ops = by_batch.remove(&batch_uid).unwrap_or_default();
            self.intake_batch(Batch::new(batch_uid, ops)).await?;
        }
        Ok(())
    }

    async fn intake_batch(&self, batch: Batch) -> OutletResult<()> {
        // Fetching missing nodes from the live backend on demand isn't
        // done here; nodes are expected to already be resident or to
        // arrive as planning nodes created below.
        debug!(batch_uid = batch.batch_uid, ops = batch.ops.len(), "starting batch intake");

        let cache = self.cache.clone();
        let max_admitted = self.max_admitted_op_uid.load(Ordering::SeqCst);
        let result = {
            let memstore = cache.memstore();
            build_batch_graph_with_children(
                &self.graph,
                &batch,
                |dn: DnUid| memstore.get(dn).is_some(),
                |dn: DnUid| memstore.children_of(dn).into_iter().map(|n| n.node_id()).collect(),
                max_admitted,
            )
        };

        let result = match result {
            Ok(r) => r,
            Err(e) => {
                self.events.emit(Signal::BatchFailed {
                    batch_uid: batch.batch_uid,
                    reason: e.to_string(),
                });
                return Err(e);
            }
        };

        // Step 4: sort by op_uid (inserted already comes out sorted since
        // build_batch_graph walks `sorted_by_op_uid`).
        let discarded_uids: Vec<u64> = result.discarded.iter().map(|op| op.op_uid).collect();
        if !discarded_uids.is_empty() {
            warn!(batch_uid = batch.batch_uid, ?discarded_uids, "discarding superseded ops");
            self.ledger.delete_pending_op_list(&discarded_uids).await?;
        }

        // Step 6: upsert src/dst planning nodes in op_uid order.
        for (op, ogn_id) in &result.inserted {
            self.cache.upsert_single_node(op.src_node.clone()).await?;
            if let Some(dst) = &op.dst_node {
                self.cache.upsert_single_node(dst.clone()).await?;
            }
            self.max_admitted_op_uid.fetch_max(op.op_uid, Ordering::SeqCst);
            self.live_ops
                .lock()
                .unwrap()
                .insert(op.op_uid, (op.clone(), *ogn_id));
        }

        info!(
            batch_uid = batch.batch_uid,
            inserted = result.inserted.len(),
            discarded = result.discarded.len(),
            "batch admitted"
        );
        Ok(())
    }

    /// Archives the op (completed or failed), pops it from the graph, and
    /// notifies the executor via the signal bus (the executor itself
    /// polls `OpGraph::get_next_op`, which the pop's `notify_waiters`
    /// wakes).
    pub async fn finish_command(&self, op_uid: u64, status: UserOpStatus, error: Option<&str>) -> OutletResult<()> {
        let (op, ogn_id) = self
            .live_ops
            .lock()
            .unwrap()
            .remove(&op_uid)
            .ok_or_else(|| OutletError::OpNotReady(format!("no live op {op_uid}")))?;

        let now = now_ts();
        match status {
            UserOpStatus::Completed => {
                self.ledger.archive_completed_op_list(std::slice::from_ref(&op), now).await?;
                self.events.emit(Signal::CommandComplete {
                    op_uid: op.op_uid,
                    op_type: op.op_type,
                });
            }
            UserOpStatus::StoppedOnError => {
                // Does not archive the op; it stays in pending for user
                // resolution, but children are still blocked via pop_op's
                // error-status rewiring.
                self.events.emit(Signal::ErrorOccurred {
                    message: error.unwrap_or("op stopped on error").to_string(),
                });
            }
            _ => {
                let reason = error.unwrap_or("unspecified");
                self.ledger.archive_failed(std::slice::from_ref(&op), reason, now).await?;
                self.events.emit(Signal::ErrorOccurred {
                    message: reason.to_string(),
                });
            }
        }

        self.graph.pop_op(ogn_id, status);
        Ok(())
    }

    pub fn graph(&self) -> &Arc<OpGraph> {
        &self.graph
    }

    /// Gives callers that need to seed or inspect cache state directly
    /// (e.g. registering a live node before submitting an RM batch for it)
    /// access to the same [`CacheManager`] the executor's commands write
    /// through.
    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    /// Looks up the live [`UserOp`] behind a ready `OgnId` (the executor
    /// resolves `Ogn::op_uid` off the graph, then comes here for the full
    /// op to dispatch a [`super::command::Command`] against it).
    pub fn op_for_op_uid(&self, op_uid: u64) -> Option<UserOp> {
        self.live_ops.lock().unwrap().get(&op_uid).map(|(op, _)| op.clone())
    }

    pub async fn cancel_all_pending(&self) -> OutletResult<usize> {
        let now = now_ts();
        let count = self.ledger.cancel_all_pending_ops(now).await?;
        self.live_ops.lock().unwrap().clear();
        Ok(count)
    }
}

fn now_ts() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
