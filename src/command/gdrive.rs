//! GDrive-backend commands.
//!
//! Same stage-then-commit shape as the local commands, adapted to drive
//! through [`crate::gdrive_client::GDriveClient`] instead of local syscalls —
//! the HTTP plumbing itself lives behind that trait.

use super::{Command, CommandContext, UserOpResult};
use crate::error::{OutletError, OutletResult};
use crate::gdrive_client::MetaPatch;
use crate::model::node::{Node, NodeData};
use crate::op::UserOp;
use async_trait::async_trait;
use tracing::{info, instrument};

fn goog_id_of(node: &Node) -> OutletResult<&str> {
    match &node.data {
        NodeData::GDriveFile { goog_id: Some(g), .. } | NodeData::GDriveFolder { goog_id: Some(g), .. } => Ok(g),
        _ => Err(OutletError::cache_inconsistency(format!(
            "node {} has no goog_id yet",
            node.node_id()
        ))),
    }
}

async fn parent_goog_id(ctx: &CommandContext, node: &Node) -> OutletResult<String> {
    let parent_uid = node
        .parent_uids()
        .first()
        .copied()
        .ok_or_else(|| OutletError::cache_inconsistency("dst node has no parent"))?;
    ctx.gdrive()?
        .goog_id_for_uid(parent_uid)
        .await
        .ok_or_else(|| OutletError::IdMappingConflict {
            kind: "goog_id",
            key: parent_uid.to_string(),
            reason: "parent has no known goog_id".to_string(),
        })
}

/// UploadToGDrive: compute/reuse md5+size, query dst
/// parent for an existing name match, NO_OP on identical, update-in-place
/// on a distinct match with overwrite, else create new.
pub struct UploadToGDrive;

#[async_trait]
impl Command for UploadToGDrive {
    #[instrument(skip(self, ctx, op), fields(op_uid = op.op_uid))]
    async fn run(&self, ctx: &CommandContext, op: &UserOp) -> OutletResult<UserOpResult> {
        let src = ctx.local_path(&op.src_node)?;
        let dst_node = op.dst_node.as_ref().ok_or_else(|| OutletError::InvalidBatch {
            batch_uid: op.batch_uid,
            reason: "upload requires a dst node".to_string(),
        })?;
        let name = dst_node.name().ok_or_else(|| OutletError::cache_inconsistency("dst has no name"))?;
        let parent = parent_goog_id(ctx, dst_node).await?;
        let md5 = ctx.hasher.hash_file(std::path::Path::new(&src)).await?;
        let client = ctx.gdrive()?;

        let matches = client.find_by_parent_and_name(&parent, name).await?;
        if let Some(existing) = matches.iter().find(|m| m.md5.as_deref() == Some(md5.as_str())) {
            info!(name, "identical GDrive file already present, NO_OP");
            return Ok(UserOpResult::no_op(with_goog_id(dst_node, &existing.goog_id)));
        }
        if let Some(existing) = matches.first() {
            if op.op_type != crate::op::OpType::CpOnto && op.op_type != crate::op::OpType::FinishDirCp {
                return Err(OutletError::BackendIo {
                    backend: "gdrive",
                    message: format!("{name} already exists under parent and op is not an overwrite"),
                });
            }
            let meta = client.update_content(&existing.goog_id, std::path::Path::new(&src)).await?;
            return Ok(UserOpResult::completed(vec![with_goog_id(dst_node, &meta.goog_id)]));
        }

        let meta = client.upload_new(&parent, name, std::path::Path::new(&src)).await?;
        Ok(UserOpResult::completed(vec![with_goog_id(dst_node, &meta.goog_id)]))
    }
}

/// DownloadFromGDrive: download to staging, md5-verify,
/// atomic move to dst.
pub struct DownloadFromGDrive;

#[async_trait]
impl Command for DownloadFromGDrive {
    #[instrument(skip(self, ctx, op), fields(op_uid = op.op_uid))]
    async fn run(&self, ctx: &CommandContext, op: &UserOp) -> OutletResult<UserOpResult> {
        let goog_id = goog_id_of(&op.src_node)?;
        let dst_node = op.dst_node.as_ref().ok_or_else(|| OutletError::InvalidBatch {
            batch_uid: op.batch_uid,
            reason: "download requires a dst node".to_string(),
        })?;
        let dst = ctx.local_path(dst_node)?;
        let client = ctx.gdrive()?;

        let expected_md5 = match &op.src_node.data {
            NodeData::GDriveFile { md5, .. } => md5.clone(),
            _ => None,
        };

        let staging_path = ctx.staging_path(&format!("dl-{}", op.op_uid));
        client.download(goog_id, &staging_path).await?;

        if let Some(expected) = &expected_md5 {
            let actual = ctx.hasher.hash_file(&staging_path).await?;
            if &actual != expected {
                let _ = tokio::fs::remove_file(&staging_path).await;
                return Err(OutletError::ChecksumMismatch {
                    expected: expected.clone(),
                    actual,
                });
            }
        }

        tokio::fs::rename(&staging_path, &dst).await?;
        info!(dst, "downloaded GDrive file");
        Ok(UserOpResult::completed(vec![dst_node.clone()]))
    }
}

/// MoveFileGDrive: `modify_meta(remove_parents,
/// add_parents, new_name?)`; idempotent if src missing but dst present.
pub struct MoveFileGDrive;

#[async_trait]
impl Command for MoveFileGDrive {
    #[instrument(skip(self, ctx, op), fields(op_uid = op.op_uid))]
    async fn run(&self, ctx: &CommandContext, op: &UserOp) -> OutletResult<UserOpResult> {
        let dst_node = op.dst_node.as_ref().ok_or_else(|| OutletError::InvalidBatch {
            batch_uid: op.batch_uid,
            reason: "MV requires a dst node".to_string(),
        })?;
        let client = ctx.gdrive()?;

        let goog_id = match goog_id_of(&op.src_node) {
            Ok(g) => g.to_string(),
            Err(_) => {
                // Idempotent retry: src already gone, but if dst already
                // reflects the move, treat as completed.
                if let Ok(dst_goog_id) = goog_id_of(dst_node) {
                    if client.get_meta(dst_goog_id).await?.is_some() {
                        return Ok(UserOpResult::completed(vec![dst_node.clone()]));
                    }
                }
                return Err(OutletError::NodeNotFound(op.src_node.node_id().to_string()));
            }
        };

        let mut remove_parents = Vec::new();
        for parent_uid in op.src_node.parent_uids() {
            if let Some(g) = client.goog_id_for_uid(parent_uid).await {
                remove_parents.push(g);
            }
        }
        let add_parent = parent_goog_id(ctx, dst_node).await?;
        let patch = MetaPatch {
            remove_parents,
            add_parents: vec![add_parent],
            new_name: dst_node.name().map(|s| s.to_string()),
        };
        let meta = client.modify_meta(&goog_id, patch).await?;
        Ok(UserOpResult::completed(vec![with_goog_id(dst_node, &meta.goog_id)]))
    }
}

/// CreateGDriveFolder (MKDIR): reuse an existing same-parent+name folder
/// if one exists, else create; always attach `self.uid` to the result so
/// children resolve parents correctly.
pub struct CreateGDriveFolder;

#[async_trait]
impl Command for CreateGDriveFolder {
    #[instrument(skip(self, ctx, op), fields(op_uid = op.op_uid))]
    async fn run(&self, ctx: &CommandContext, op: &UserOp) -> OutletResult<UserOpResult> {
        let name = op
            .src_node
            .name()
            .ok_or_else(|| OutletError::cache_inconsistency("MKDIR target has no name"))?;
        let parent = parent_goog_id(ctx, &op.src_node).await?;
        let client = ctx.gdrive()?;

        let existing = client.find_by_parent_and_name(&parent, name).await?;
        let meta = if let Some(first) = existing.into_iter().next() {
            first
        } else {
            client.create_folder(&parent, name).await?
        };

        Ok(UserOpResult::completed(vec![with_goog_id(&op.src_node, &meta.goog_id)]))
    }
}

/// DeleteGDriveNode: trash or hard delete.
pub struct DeleteGDriveNode;

#[async_trait]
impl Command for DeleteGDriveNode {
    #[instrument(skip(self, ctx, op), fields(op_uid = op.op_uid))]
    async fn run(&self, ctx: &CommandContext, op: &UserOp) -> OutletResult<UserOpResult> {
        let goog_id = goog_id_of(&op.src_node)?;
        ctx.gdrive()?.delete(goog_id, op.to_trash).await?;
        Ok(UserOpResult::removed(op.src_node.node_id()))
    }
}

fn with_goog_id(node: &Node, goog_id: &str) -> Node {
    let mut out = node.clone();
    match &mut out.data {
        NodeData::GDriveFile { goog_id: g, .. } | NodeData::GDriveFolder { goog_id: g, .. } => {
            *g = Some(goog_id.to_string());
        }
        _ => {}
    }
    out
}
