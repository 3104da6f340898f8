//! Creates `pending_op`, `completed_op`, `failed_op`, `uid_watermark`.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(PendingOp::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(PendingOp::OpUid).big_integer().not_null().primary_key())
                    .col(ColumnDef::new(PendingOp::BatchUid).big_integer().not_null())
                    .col(ColumnDef::new(PendingOp::OpType).string().not_null())
                    .col(ColumnDef::new(PendingOp::SrcNodeSnapshot).binary().not_null())
                    .col(ColumnDef::new(PendingOp::DstNodeSnapshot).binary())
                    .col(ColumnDef::new(PendingOp::CreateTs).big_integer().not_null())
                    .col(ColumnDef::new(PendingOp::Status).string().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(CompletedOp::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(CompletedOp::OpUid).big_integer().not_null().primary_key())
                    .col(ColumnDef::new(CompletedOp::BatchUid).big_integer().not_null())
                    .col(ColumnDef::new(CompletedOp::OpType).string().not_null())
                    .col(ColumnDef::new(CompletedOp::SrcNodeSnapshot).binary().not_null())
                    .col(ColumnDef::new(CompletedOp::DstNodeSnapshot).binary())
                    .col(ColumnDef::new(CompletedOp::CreateTs).big_integer().not_null())
                    .col(ColumnDef::new(CompletedOp::CompleteTs).big_integer().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(FailedOp::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(FailedOp::OpUid).big_integer().not_null().primary_key())
                    .col(ColumnDef::new(FailedOp::BatchUid).big_integer().not_null())
                    .col(ColumnDef::new(FailedOp::OpType).string().not_null())
                    .col(ColumnDef::new(FailedOp::SrcNodeSnapshot).binary().not_null())
                    .col(ColumnDef::new(FailedOp::DstNodeSnapshot).binary())
                    .col(ColumnDef::new(FailedOp::CreateTs).big_integer().not_null())
                    .col(ColumnDef::new(FailedOp::CompleteTs).big_integer().not_null())
                    .col(ColumnDef::new(FailedOp::ErrorMsg).text().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(UidWatermark::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(UidWatermark::Id).integer().not_null().primary_key())
                    .col(ColumnDef::new(UidWatermark::Value).big_integer().not_null())
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(PendingOp::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(CompletedOp::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(FailedOp::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(UidWatermark::Table).to_owned()).await?;
        Ok(())
    }
}

#[derive(Iden)]
enum PendingOp {
    Table,
    OpUid,
    BatchUid,
    OpType,
    SrcNodeSnapshot,
    DstNodeSnapshot,
    CreateTs,
    Status,
}

#[derive(Iden)]
enum CompletedOp {
    Table,
    OpUid,
    BatchUid,
    OpType,
    SrcNodeSnapshot,
    DstNodeSnapshot,
    CreateTs,
    CompleteTs,
}

#[derive(Iden)]
enum FailedOp {
    Table,
    OpUid,
    BatchUid,
    OpType,
    SrcNodeSnapshot,
    DstNodeSnapshot,
    CreateTs,
    CompleteTs,
    ErrorMsg,
}

#[derive(Iden)]
enum UidWatermark {
    Table,
    Id,
    Value,
}
