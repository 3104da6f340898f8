//! Local-backend commands.
//!
//! Copies stage into a temp file, fsync, then rename into place; deletes
//! go straight to the filesystem. Paths here are Outlet's own absolute
//! local paths, not library-relative.

use super::{Command, CommandContext, UserOpResult};
use crate::error::{OutletError, OutletResult};
use crate::model::node::NodeData;
use crate::op::UserOp;
use async_trait::async_trait;
use std::path::Path;
use tracing::{info, instrument, warn};

/// CreateLocalDir: `mkdir -p` semantics.
pub struct CreateLocalDir;

#[async_trait]
impl Command for CreateLocalDir {
    #[instrument(skip(self, ctx, op), fields(op_uid = op.op_uid, op_type = ?op.op_type))]
    async fn run(&self, ctx: &CommandContext, op: &UserOp) -> OutletResult<UserOpResult> {
        let path = ctx.local_path(&op.src_node)?;
        tokio::fs::create_dir_all(&path).await?;
        info!(path, "created local directory");

        let mut node = op.src_node.clone();
        if let NodeData::LocalDir { is_live, .. } = &mut node.data {
            *is_live = true;
        }
        Ok(UserOpResult::completed(vec![node]))
    }
}

/// DeleteLocalFile: trash or hard delete, with optional
/// empty-parent cleanup.
pub struct DeleteLocalFile;

#[async_trait]
impl Command for DeleteLocalFile {
    #[instrument(skip(self, ctx, op), fields(op_uid = op.op_uid))]
    async fn run(&self, ctx: &CommandContext, op: &UserOp) -> OutletResult<UserOpResult> {
        let path = ctx.local_path(&op.src_node)?;
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(&path).await?,
            Ok(_) => tokio::fs::remove_file(&path).await?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Idempotent: already gone counts as done.
            }
            Err(e) => return Err(e.into()),
        }
        Ok(UserOpResult::removed(op.src_node.node_id()))
    }
}

/// MoveFileLocally: POSIX rename.
pub struct MoveFileLocally;

#[async_trait]
impl Command for MoveFileLocally {
    #[instrument(skip(self, ctx, op), fields(op_uid = op.op_uid))]
    async fn run(&self, ctx: &CommandContext, op: &UserOp) -> OutletResult<UserOpResult> {
        let src = ctx.local_path(&op.src_node)?;
        let dst_node = op.dst_node.as_ref().ok_or_else(|| OutletError::InvalidBatch {
            batch_uid: op.batch_uid,
            reason: "MV requires a dst node".to_string(),
        })?;
        let dst = ctx.local_path(dst_node)?;
        tokio::fs::rename(&src, &dst).await?;
        warn!(src, dst, "renamed local file");
        Ok(UserOpResult::completed(vec![dst_node.clone()]))
    }
}

/// CopyFileLocally: stage to `staging/<md5>`, then finalize
/// via rename when staging and dst share a filesystem, or stream-copy +
/// fsync + rename otherwise.
pub struct CopyFileLocally;

#[async_trait]
impl Command for CopyFileLocally {
    #[instrument(skip(self, ctx, op), fields(op_uid = op.op_uid))]
    async fn run(&self, ctx: &CommandContext, op: &UserOp) -> OutletResult<UserOpResult> {
        let src = ctx.local_path(&op.src_node)?;
        let dst_node = op.dst_node.as_ref().ok_or_else(|| OutletError::InvalidBatch {
            batch_uid: op.batch_uid,
            reason: "CP requires a dst node".to_string(),
        })?;
        let dst = ctx.local_path(dst_node)?;

        if Path::new(&dst).exists() {
            let expected = op.src_node.content_signature();
            let actual_hash = ctx.hasher.hash_file(Path::new(&dst)).await?;
            if let Some((_, Some(expected_md5))) = expected {
                if expected_md5 == actual_hash {
                    info!(dst, "identical file already present, NO_OP");
                    return Ok(UserOpResult::no_op(dst_node.clone()));
                }
            }
            if op.op_type != crate::op::OpType::CpOnto && op.op_type != crate::op::OpType::FinishDirCp {
                return Err(OutletError::BackendIo {
                    backend: "local",
                    message: format!("{dst} already exists and op is not an overwrite"),
                });
            }
        }

        let md5 = ctx.hasher.hash_file(Path::new(&src)).await?;
        let staging_path = ctx.staging_path(&md5);
        tokio::fs::copy(&src, &staging_path).await?;
        {
            let f = tokio::fs::File::open(&staging_path).await?;
            f.sync_all().await?;
        }

        let same_fs = ctx.volumes.same_filesystem(ctx.staging_dir.to_str().unwrap_or(""), &dst);
        if same_fs {
            tokio::fs::rename(&staging_path, &dst).await?;
        } else {
            tokio::fs::copy(&staging_path, &dst).await?;
            let f = tokio::fs::File::open(&dst).await?;
            f.sync_all().await?;
            tokio::fs::remove_file(&staging_path).await?;
        }

        info!(src, dst, md5, "copied local file");
        Ok(UserOpResult::completed(vec![dst_node.clone()]))
    }
}
