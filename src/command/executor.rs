//! `Executor`: drains the [`crate::op_graph::OpGraph`]
//! one ready op at a time, runs the matching [`super::Command`], feeds the
//! result back into the cache, and reports completion to the
//! [`crate::op_manager::OpManager`]. A worker-loop shape: pop the next
//! runnable unit, execute, report, repeat until shutdown.

use super::{dispatch_for, CommandContext, UserOpResult};
use crate::error::OutletResult;
use crate::op::UserOpStatus;
use crate::op_manager::OpManager;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, instrument, warn};

pub struct Executor {
    op_manager: Arc<OpManager>,
    ctx: Arc<CommandContext>,
    max_concurrent_ops: usize,
}

impl Executor {
    pub fn new(op_manager: Arc<OpManager>, ctx: Arc<CommandContext>, max_concurrent_ops: usize) -> Self {
        Self {
            op_manager,
            ctx,
            max_concurrent_ops: max_concurrent_ops.max(1),
        }
    }

    /// Runs until `shutdown` is signalled true, keeping up to
    /// `max_concurrent_ops` commands in flight at once. Each dispatched op
    /// is marked executing on the graph immediately so a second
    /// `get_next_op` call never double-dispatches it.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) {
        let mut in_flight = tokio::task::JoinSet::new();

        loop {
            while in_flight.len() < self.max_concurrent_ops {
                let Some(ogn_id) = self.op_manager.graph().get_next_op(&shutdown).await else {
                    break;
                };
                self.op_manager.graph().mark_executing(ogn_id, true);

                let op_manager = self.op_manager.clone();
                let ctx = self.ctx.clone();
                in_flight.spawn(async move { run_one(op_manager, ctx, ogn_id).await });
            }

            if *shutdown.borrow() && in_flight.is_empty() {
                break;
            }
            if in_flight.is_empty() {
                // No ready op and not shut down: get_next_op above already
                // blocked until the graph changed or shutdown fired, so
                // looping back re-evaluates readiness immediately.
                continue;
            }

            match in_flight.join_next().await {
                Some(Ok(Ok(()))) => {}
                Some(Ok(Err(e))) => error!(error = %e, "command run failed"),
                Some(Err(join_err)) => error!(error = %join_err, "command task panicked"),
                None => {}
            }
        }

        info!("executor stopped");
    }
}

#[instrument(skip(op_manager, ctx))]
async fn run_one(op_manager: Arc<OpManager>, ctx: Arc<CommandContext>, ogn_id: crate::op_graph::OgnId) -> OutletResult<()> {
    let Some(ogn) = op_manager.graph().get(ogn_id) else {
        // Popped out from under us (shouldn't happen while executing, but
        // don't panic the worker over it).
        return Ok(());
    };
    let op_uid = ogn.op_uid;

    let Some(op) = op_manager.op_for_op_uid(op_uid) else {
        warn!(op_uid, "ready OGN has no live UserOp, dropping");
        op_manager.graph().pop_op(ogn_id, UserOpStatus::Completed);
        return Ok(());
    };

    let command = dispatch_for(&op);
    let outcome = command.run(&ctx, &op).await;

    let result = match outcome {
        Ok(result) => result,
        Err(e) => {
            warn!(op_uid, error = %e, "command failed, stopping op on error");
            UserOpResult::stopped_on_error(e.to_string())
        }
    };

    for node in &result.to_upsert {
        ctx.cache.upsert_single_node(node.clone()).await?;
    }
    for dn_uid in &result.to_delete {
        ctx.cache.remove_single_node(*dn_uid).await?;
    }

    op_manager
        .finish_command(op_uid, result.status, result.error.as_deref())
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheManager;
    use crate::config::RetryConfig;
    use crate::content_hash::Md5Hasher;
    use crate::infrastructure::events::EventBus;
    use crate::ledger::OpLedger;
    use crate::model::node::Node;
    use crate::op::{OpType, UserOp};
    use crate::op_graph::OpGraph;
    use crate::shared::{DeviceUid, DnUid, Uid};
    use crate::uid::UidMapper;
    use crate::volume::VolumeManager;
    use std::collections::HashMap;
    use std::sync::RwLock;
    use tempfile::TempDir;

    async fn setup() -> (Executor, Arc<OpManager>, DeviceUid, TempDir) {
        let dir = TempDir::new().unwrap();
        let events = Arc::new(EventBus::default());
        let cache = Arc::new(CacheManager::new(dir.path().to_path_buf(), events.clone()));
        let graph = Arc::new(OpGraph::new());
        let ledger = Arc::new(OpLedger::open(&dir.path().join("ops.db")).await.unwrap());
        let op_manager = Arc::new(OpManager::new(cache.clone(), graph, ledger, events));

        let device = DeviceUid::new();
        let generator = Arc::new(crate::uid::UidGenerator::new(Uid::NULL));
        let mapper = Arc::new(UidMapper::new(generator));
        let root_dir = dir.path().join("root");
        tokio::fs::create_dir_all(&root_dir).await.unwrap();
        let newdir_path = root_dir.join("newdir").to_str().unwrap().to_string();
        mapper.get_uid_for_local_path(&newdir_path, Some(Uid(5)));

        let mut mappers = HashMap::new();
        mappers.insert(device, mapper);

        let ctx = Arc::new(CommandContext {
            staging_dir: dir.path().join("staging"),
            cache,
            gdrive_client: None,
            hasher: Arc::new(Md5Hasher),
            retry: RetryConfig::default(),
            volumes: Arc::new(VolumeManager::new()),
            uid_mappers: Arc::new(RwLock::new(mappers)),
        });
        tokio::fs::create_dir_all(&ctx.staging_dir).await.unwrap();

        let executor = Executor::new(op_manager.clone(), ctx, 2);
        (executor, op_manager, device, dir)
    }

    #[tokio::test]
    async fn drains_a_single_mkdir_to_completion() {
        let (executor, op_manager, device, _dir) = setup().await;
        let target = DnUid::new(device, Uid(5));
        let op = UserOp::new(1, 1, OpType::Mkdir, Node::planning_local_dir(target, Uid::SUPER_ROOT), None, 0);
        op_manager.append_new_pending_op_batch(vec![op]).await.unwrap();

        let (_tx, rx) = watch::channel(false);
        let graph = op_manager.graph().clone();
        let handle = tokio::spawn(async move { executor.run(rx).await });

        for _ in 0..100 {
            if graph.is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        assert!(graph.is_empty(), "mkdir op should have drained from the graph");

        let _tx_guard = _tx;
        handle.abort();
    }
}
