//! Durable mirror of the memstore: an opaque durable keyed store that
//! mirrors memstore for crash recovery. Stores each node as an opaque
//! msgpack blob keyed by `(device_uid, uid)` rather than a fully
//! relational per-variant schema — that literal schema is reserved for
//! the op ledger, whose rows the executor and CLI query directly.

use crate::error::{OutletError, OutletResult};
use crate::infrastructure::database::Database;
use crate::model::node::Node;
use crate::shared::{DeviceUid, DnUid};
use sea_orm::entity::prelude::*;
use sea_orm::Set;
use sea_orm_migration::prelude::*;
use std::path::Path;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, serde::Serialize, serde::Deserialize)]
#[sea_orm(table_name = "node_snapshot")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub device_uid: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub uid: i64,
    pub snapshot: Vec<u8>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

#[derive(DeriveMigrationName)]
struct CreateNodeSnapshotTable;

#[async_trait::async_trait]
impl MigrationTrait for CreateNodeSnapshotTable {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(NodeSnapshotTable::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(NodeSnapshotTable::DeviceUid).string().not_null())
                    .col(ColumnDef::new(NodeSnapshotTable::Uid).big_integer().not_null())
                    .col(ColumnDef::new(NodeSnapshotTable::Snapshot).binary().not_null())
                    .primary_key(
                        Index::create()
                            .col(NodeSnapshotTable::DeviceUid)
                            .col(NodeSnapshotTable::Uid),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(NodeSnapshotTable::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum NodeSnapshotTable {
    Table,
    DeviceUid,
    Uid,
    Snapshot,
}

struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![Box::new(CreateNodeSnapshotTable)]
    }
}

/// One diskstore per device cache file. Write-through target of the cache's three-phase
/// contract; never consulted for reads at runtime (memstore is
/// authoritative), only replayed at startup.
pub struct Diskstore {
    db: Database,
}

impl Diskstore {
    pub async fn open(path: &Path) -> OutletResult<Self> {
        let db = if path.exists() {
            Database::open(path).await?
        } else {
            Database::create(path).await?
        };
        Migrator::up(db.conn(), None).await?;
        Ok(Self { db })
    }

    /// Non-live nodes are never written to disk.
    pub async fn upsert(&self, node: &Node) -> OutletResult<()> {
        if !node.is_live() {
            return Ok(());
        }
        let dn_uid = node.node_id();
        let model = ActiveModel {
            device_uid: Set(dn_uid.device_uid.to_string()),
            uid: Set(dn_uid.uid.0 as i64),
            snapshot: Set(rmp_serde::to_vec(node).map_err(OutletError::from)?),
        };
        Entity::insert(model)
            .on_conflict(
                sea_orm::sea_query::OnConflict::columns([Column::DeviceUid, Column::Uid])
                    .update_column(Column::Snapshot)
                    .to_owned(),
            )
            .exec(self.db.conn())
            .await?;
        Ok(())
    }

    pub async fn remove(&self, dn_uid: DnUid) -> OutletResult<()> {
        Entity::delete_by_id((dn_uid.device_uid.to_string(), dn_uid.uid.0 as i64))
            .exec(self.db.conn())
            .await?;
        Ok(())
    }

    pub async fn load_all(&self, device_uid: DeviceUid) -> OutletResult<Vec<Node>> {
        let rows = Entity::find()
            .filter(Column::DeviceUid.eq(device_uid.to_string()))
            .all(self.db.conn())
            .await?;
        rows.iter()
            .map(|row| rmp_serde::from_slice(&row.snapshot).map_err(OutletError::from))
            .collect()
    }
}
