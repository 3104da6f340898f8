//! `completed_op` table.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "completed_op")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub op_uid: i64,
    pub batch_uid: i64,
    pub op_type: String,
    pub src_node_snapshot: Vec<u8>,
    pub dst_node_snapshot: Option<Vec<u8>>,
    pub create_ts: i64,
    pub complete_ts: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
