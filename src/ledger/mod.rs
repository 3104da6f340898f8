//! Persistent op ledger: pending/completed/failed tables surviving
//! process crashes, built on the shared `Database` connection wrapper
//! and its own `sea_orm` entity/migration set.

pub mod entities;
pub mod migration;

use crate::error::{OutletError, OutletResult};
use crate::infrastructure::database::Database;
use crate::model::node::Node;
use crate::op::{OpType, UserOp, UserOpStatus};
use crate::shared::Uid;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set, TransactionTrait};
use sea_orm_migration::MigratorTrait;
use std::path::Path;
use std::str::FromStr;
use tracing::{info, warn};

fn encode_node(node: &Node) -> OutletResult<Vec<u8>> {
    rmp_serde::to_vec(node).map_err(OutletError::from)
}

fn decode_node(bytes: &[u8]) -> OutletResult<Node> {
    rmp_serde::from_slice(bytes).map_err(OutletError::from)
}

impl FromStr for OpType {
    type Err = OutletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_str(&format!("\"{s}\"")).map_err(|e| OutletError::Serialization(e.to_string()))
    }
}

/// Durable record of one [`UserOp`], reconstituted from a ledger row
/// without consulting the live node caches.
pub struct OpLedger {
    db: Database,
}

impl OpLedger {
    pub async fn open(path: &Path) -> OutletResult<Self> {
        let db = if path.exists() {
            Database::open(path).await?
        } else {
            Database::create(path).await?
        };
        migration::Migrator::up(db.conn(), None).await?;
        Ok(Self { db })
    }

    /// Persists every op of a
    /// reduced batch as a pending row.
    pub async fn upsert_pending_op_list(&self, ops: &[UserOp]) -> OutletResult<()> {
        for op in ops {
            let model = entities::pending_op::ActiveModel {
                op_uid: Set(op.op_uid as i64),
                batch_uid: Set(op.batch_uid as i64),
                op_type: Set(op.op_type.to_string()),
                src_node_snapshot: Set(encode_node(&op.src_node)?),
                dst_node_snapshot: Set(match &op.dst_node {
                    Some(n) => Some(encode_node(n)?),
                    None => None,
                }),
                create_ts: Set(op.create_ts),
                status: Set(format!("{:?}", op.status)),
            };
            entities::pending_op::Entity::insert(model)
                .on_conflict(
                    sea_orm::sea_query::OnConflict::column(entities::pending_op::Column::OpUid)
                        .update_columns([
                            entities::pending_op::Column::BatchUid,
                            entities::pending_op::Column::OpType,
                            entities::pending_op::Column::SrcNodeSnapshot,
                            entities::pending_op::Column::DstNodeSnapshot,
                            entities::pending_op::Column::Status,
                        ])
                        .to_owned(),
                )
                .exec(self.db.conn())
                .await?;
        }
        Ok(())
    }

    pub async fn delete_pending_op_list(&self, op_uids: &[u64]) -> OutletResult<()> {
        let ids: Vec<i64> = op_uids.iter().map(|u| *u as i64).collect();
        entities::pending_op::Entity::delete_many()
            .filter(entities::pending_op::Column::OpUid.is_in(ids))
            .exec(self.db.conn())
            .await?;
        Ok(())
    }

    /// Deletes from pending and inserts into completed atomically, in
    /// one SQLite transaction.
    pub async fn archive_completed_op_list(&self, ops: &[UserOp], complete_ts: i64) -> OutletResult<()> {
        let txn = self.db.conn().begin().await?;
        for op in ops {
            entities::pending_op::Entity::delete_by_id(op.op_uid as i64)
                .exec(&txn)
                .await?;
            let model = entities::completed_op::ActiveModel {
                op_uid: Set(op.op_uid as i64),
                batch_uid: Set(op.batch_uid as i64),
                op_type: Set(op.op_type.to_string()),
                src_node_snapshot: Set(encode_node(&op.src_node)?),
                dst_node_snapshot: Set(match &op.dst_node {
                    Some(n) => Some(encode_node(n)?),
                    None => None,
                }),
                create_ts: Set(op.create_ts),
                complete_ts: Set(complete_ts),
            };
            model.insert(&txn).await?;
        }
        txn.commit().await?;
        info!(count = ops.len(), "archived completed ops");
        Ok(())
    }

    pub async fn archive_failed(&self, ops: &[UserOp], err: &str, complete_ts: i64) -> OutletResult<()> {
        let txn = self.db.conn().begin().await?;
        for op in ops {
            entities::pending_op::Entity::delete_by_id(op.op_uid as i64)
                .exec(&txn)
                .await?;
            let model = entities::failed_op::ActiveModel {
                op_uid: Set(op.op_uid as i64),
                batch_uid: Set(op.batch_uid as i64),
                op_type: Set(op.op_type.to_string()),
                src_node_snapshot: Set(encode_node(&op.src_node)?),
                dst_node_snapshot: Set(match &op.dst_node {
                    Some(n) => Some(encode_node(n)?),
                    None => None,
                }),
                create_ts: Set(op.create_ts),
                complete_ts: Set(complete_ts),
                error_msg: Set(err.to_string()),
            };
            model.insert(&txn).await?;
        }
        txn.commit().await?;
        warn!(count = ops.len(), error = err, "archived failed ops");
        Ok(())
    }

    /// Loads every pending op for crash recovery, sorted by `batch_uid`
    /// then `op_uid`.
    pub async fn load_all_pending_ops(&self) -> OutletResult<Vec<UserOp>> {
        let rows = entities::pending_op::Entity::find()
            .order_by_asc(entities::pending_op::Column::BatchUid)
            .order_by_asc(entities::pending_op::Column::OpUid)
            .all(self.db.conn())
            .await?;

        rows.into_iter()
            .map(|row| {
                let op_type = row
                    .op_type
                    .parse()
                    .map_err(|_| OutletError::Serialization(format!("bad op_type {}", row.op_type)))?;
                let src_node = decode_node(&row.src_node_snapshot)?;
                let dst_node = row.dst_node_snapshot.as_deref().map(decode_node).transpose()?;
                Ok(UserOp {
                    op_uid: row.op_uid as u64,
                    batch_uid: row.batch_uid as u64,
                    op_type,
                    src_node,
                    dst_node,
                    create_ts: row.create_ts,
                    status: status_from_str(&row.status),
                    to_trash: true,
                })
            })
            .collect()
    }

    /// Moves every pending row to failed with reason "cancelled".
    pub async fn cancel_all_pending_ops(&self, complete_ts: i64) -> OutletResult<usize> {
        let pending = self.load_all_pending_ops().await?;
        let count = pending.len();
        if count > 0 {
            self.archive_failed(&pending, "cancelled", complete_ts).await?;
        }
        Ok(count)
    }

    pub async fn load_watermark(&self) -> OutletResult<Uid> {
        let row = entities::watermark::Entity::find_by_id(entities::watermark::SINGLETON_ID)
            .one(self.db.conn())
            .await?;
        Ok(row.map(|r| Uid(r.value as u64)).unwrap_or(Uid::NULL))
    }

    pub async fn save_watermark(&self, watermark: Uid) -> OutletResult<()> {
        let model = entities::watermark::ActiveModel {
            id: Set(entities::watermark::SINGLETON_ID),
            value: Set(watermark.0 as i64),
        };
        entities::watermark::Entity::insert(model)
            .on_conflict(
                sea_orm::sea_query::OnConflict::column(entities::watermark::Column::Id)
                    .update_column(entities::watermark::Column::Value)
                    .to_owned(),
            )
            .exec(self.db.conn())
            .await?;
        Ok(())
    }
}

fn status_from_str(s: &str) -> UserOpStatus {
    match s {
        "Executing" => UserOpStatus::Executing,
        "Completed" => UserOpStatus::Completed,
        "StoppedOnError" => UserOpStatus::StoppedOnError,
        "BlockedByError" => UserOpStatus::BlockedByError,
        _ => UserOpStatus::NotStarted,
    }
}
