//! End-to-end scenarios driving the full intake -> OpGraph -> executor
//! pipeline against a real filesystem and a real sqlite ledger, the way a
//! caller outside the crate would.

use async_trait::async_trait;
use outlet_core::cache::CacheManager;
use outlet_core::command::{Command, CommandContext, Executor};
use outlet_core::config::RetryConfig;
use outlet_core::content_hash::Md5Hasher;
use outlet_core::error::{OutletError, OutletResult};
use outlet_core::gdrive_client::{GDriveClient, GDriveFileMeta, MetaPatch};
use outlet_core::infrastructure::events::{EventBus, Signal};
use outlet_core::ledger::OpLedger;
use outlet_core::model::node::{Node, NodeData, TrashStatus};
use outlet_core::op::{OpType, UserOp};
use outlet_core::op_graph::OpGraph;
use outlet_core::op_manager::OpManager;
use outlet_core::shared::{DeviceUid, DnUid, Uid};
use outlet_core::uid::{UidGenerator, UidMapper};
use outlet_core::volume::VolumeManager;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tempfile::TempDir;

struct Harness {
    op_manager: Arc<OpManager>,
    executor: Executor,
    device: DeviceUid,
    mapper: Arc<UidMapper>,
    events: Arc<EventBus>,
    _dir: TempDir,
}

async fn harness() -> Harness {
    let dir = TempDir::new().unwrap();
    let events = Arc::new(EventBus::default());
    let cache = Arc::new(CacheManager::new(dir.path().to_path_buf(), events.clone()));
    let graph = Arc::new(OpGraph::new());
    let ledger = Arc::new(OpLedger::open(&dir.path().join("ops.db")).await.unwrap());
    let op_manager = Arc::new(OpManager::new(cache.clone(), graph, ledger, events.clone()));

    let device = DeviceUid::new();
    let generator = Arc::new(UidGenerator::new(Uid::NULL));
    let mapper = Arc::new(UidMapper::new(generator));

    let mut mappers = HashMap::new();
    mappers.insert(device, mapper.clone());

    let staging_dir = dir.path().join("staging");
    tokio::fs::create_dir_all(&staging_dir).await.unwrap();

    let ctx = Arc::new(CommandContext {
        staging_dir,
        cache,
        gdrive_client: None,
        hasher: Arc::new(Md5Hasher),
        retry: RetryConfig::default(),
        volumes: Arc::new(VolumeManager::new()),
        uid_mappers: Arc::new(RwLock::new(mappers)),
    });

    let executor = Executor::new(op_manager.clone(), ctx, 4);
    Harness {
        op_manager,
        executor,
        device,
        mapper,
        events,
        _dir: dir,
    }
}

async fn drain(h: &Harness) {
    let (tx, rx) = tokio::sync::watch::channel(false);
    let graph = h.op_manager.graph().clone();
    let watchdog = tokio::spawn(async move {
        for _ in 0..200 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            if graph.is_empty() {
                let _ = tx.send(true);
                return;
            }
        }
        let _ = tx.send(true);
    });
    h.executor.run(rx).await;
    watchdog.abort();
}

fn dir_node(dn_uid: DnUid, parent: Uid) -> Node {
    Node::planning_local_dir(dn_uid, parent)
}

fn live_dir_node(dn_uid: DnUid, parent: Uid) -> Node {
    let mut n = dir_node(dn_uid, parent);
    if let NodeData::LocalDir { is_live, .. } = &mut n.data {
        *is_live = true;
    }
    n
}

fn live_file_node(dn_uid: DnUid, parent: Uid, size: u64, md5: &str) -> Node {
    Node {
        node_id: dn_uid,
        trashed: TrashStatus::None,
        is_shared: false,
        icon_override: None,
        data: NodeData::LocalFile {
            parent_uid: parent,
            size,
            sync_ts: 0,
            modify_ts: 0,
            change_ts: 0,
            md5: Some(md5.to_string()),
            sha256: None,
            is_live: true,
        },
    }
}

/// S1: copying `/src/a/b/file1` into an empty `/dst` synthesizes the two
/// missing ancestor MKDIRs ahead of the file copy, and all three land in
/// one batch.
#[tokio::test]
async fn s1_local_copy_with_synthesized_ancestors() {
    let h = harness().await;
    let root = h._dir.path();
    let src_dir = root.join("src/a/b");
    let dst_root = root.join("dst");
    tokio::fs::create_dir_all(&src_dir).await.unwrap();
    tokio::fs::create_dir_all(&dst_root).await.unwrap();
    let src_file = src_dir.join("file1");
    tokio::fs::write(&src_file, b"hello world").await.unwrap();

    let src_uid = h.mapper.get_uid_for_local_path(src_file.to_str().unwrap(), Some(Uid(10)));
    let dst_a_uid = h
        .mapper
        .get_uid_for_local_path(dst_root.join("a").to_str().unwrap(), Some(Uid(100)));
    let dst_a_b_uid = h
        .mapper
        .get_uid_for_local_path(dst_root.join("a/b").to_str().unwrap(), Some(Uid(101)));
    let dst_file_uid = h
        .mapper
        .get_uid_for_local_path(dst_root.join("a/b/file1").to_str().unwrap(), Some(Uid(102)));

    let src_dn = DnUid::new(h.device, src_uid);
    let root_dn_parent = Uid::SUPER_ROOT;
    let src_file_node = live_file_node(src_dn, root_dn_parent, 11, "5eb63bbbe01eeed093cb22bb8f5acdc3");

    let mkdir_a = UserOp::new(1, 1, OpType::Mkdir, dir_node(DnUid::new(h.device, dst_a_uid), Uid::SUPER_ROOT), None, 0);
    let mkdir_a_b = UserOp::new(
        2,
        1,
        OpType::Mkdir,
        dir_node(DnUid::new(h.device, dst_a_b_uid), dst_a_uid),
        None,
        0,
    );
    let cp = UserOp::new(
        3,
        1,
        OpType::Cp,
        src_file_node,
        Some(Node::planning_local_file(DnUid::new(h.device, dst_file_uid), dst_a_b_uid, 11)),
        0,
    );

    h.op_manager
        .append_new_pending_op_batch(vec![mkdir_a, mkdir_a_b, cp])
        .await
        .unwrap();

    drain(&h).await;

    let dst_file = dst_root.join("a/b/file1");
    let copied = tokio::fs::read(&dst_file).await.expect("copied file should exist");
    assert_eq!(copied, b"hello world");

    let pending = h.op_manager.graph().is_empty();
    assert!(pending, "op graph should have fully drained");
}

/// S2: a batch where an RM targets a node whose ancestor the same batch is
/// creating is rejected outright — nothing is admitted, and BATCH_FAILED
/// carries the batch_uid.
#[tokio::test]
async fn s2_conflict_rejection_emits_batch_failed() {
    let h = harness().await;
    let mut signals = h.events.subscribe();

    let x = DnUid::new(h.device, Uid(10));
    let y = DnUid::new(h.device, Uid(11));
    let mkdir_x = UserOp::new(1, 7, OpType::Mkdir, dir_node(x, Uid::SUPER_ROOT), None, 0);
    let rm_y = UserOp::new(2, 7, OpType::Rm, dir_node(y, Uid(10)), None, 0);

    let result = h.op_manager.append_new_pending_op_batch(vec![mkdir_x, rm_y]).await;
    assert!(result.is_err());

    let mut saw_batch_failed = false;
    while let Ok(signal) = signals.try_recv() {
        if let Signal::BatchFailed { batch_uid, .. } = signal {
            assert_eq!(batch_uid, 7);
            saw_batch_failed = true;
        }
    }
    assert!(saw_batch_failed, "expected a BATCH_FAILED signal");

    // Nothing should have been admitted: the graph holds only the root.
    assert!(h.op_manager.graph().is_empty());
}

/// S6: RM of a directory with two children yields three RmOGNs; both
/// children become ready concurrently and the directory is only ready
/// once both have completed.
#[tokio::test]
async fn s6_rm_inversion_children_before_parent_dir() {
    let h = harness().await;
    let root = h._dir.path();
    let dir_path = root.join("doomed");
    let child_a_path = dir_path.join("a");
    let child_b_path = dir_path.join("b");
    tokio::fs::create_dir_all(&dir_path).await.unwrap();
    tokio::fs::write(&child_a_path, b"a").await.unwrap();
    tokio::fs::write(&child_b_path, b"b").await.unwrap();

    let dir_uid = h.mapper.get_uid_for_local_path(dir_path.to_str().unwrap(), Some(Uid(50)));
    let a_uid = h.mapper.get_uid_for_local_path(child_a_path.to_str().unwrap(), Some(Uid(51)));
    let b_uid = h.mapper.get_uid_for_local_path(child_b_path.to_str().unwrap(), Some(Uid(52)));

    let dir_dn = DnUid::new(h.device, dir_uid);
    let a_dn = DnUid::new(h.device, a_uid);
    let b_dn = DnUid::new(h.device, b_uid);

    // Seed the cache as if these nodes were already known live nodes, so
    // `children_of` resolves the parent/child relationship RM inversion
    // depends on.
    h.op_manager.cache().upsert_single_node(live_dir_node(dir_dn, Uid::SUPER_ROOT)).await.unwrap();
    h.op_manager.cache().upsert_single_node(live_file_node(a_dn, dir_uid, 1, "0cc175b9c0f1b6a831c399e269772661")).await.unwrap();
    h.op_manager.cache().upsert_single_node(live_file_node(b_dn, dir_uid, 1, "92eb5ffee6ae2fec3ad71c777531578f")).await.unwrap();

    let rm_a = UserOp::new(1, 1, OpType::Rm, live_file_node(a_dn, dir_uid, 1, "0cc175b9c0f1b6a831c399e269772661"), None, 0);
    let rm_b = UserOp::new(2, 1, OpType::Rm, live_file_node(b_dn, dir_uid, 1, "92eb5ffee6ae2fec3ad71c777531578f"), None, 0);
    let rm_dir = UserOp::new(3, 1, OpType::Rm, live_dir_node(dir_dn, Uid::SUPER_ROOT), None, 0);

    h.op_manager
        .append_new_pending_op_batch(vec![rm_a, rm_b, rm_dir])
        .await
        .unwrap();

    assert_eq!(h.op_manager.graph().len(), 4, "root + 3 RmOGNs");

    drain(&h).await;

    assert!(!dir_path.exists(), "directory should have been removed last");
    assert!(h.op_manager.graph().is_empty());
}

struct StubGDrive {
    bytes: Vec<u8>,
}

#[async_trait]
impl GDriveClient for StubGDrive {
    async fn find_by_parent_and_name(&self, _parent_goog_id: &str, _name: &str) -> OutletResult<Vec<GDriveFileMeta>> {
        Ok(Vec::new())
    }

    async fn upload_new(&self, _parent_goog_id: &str, _name: &str, _local_path: &std::path::Path) -> OutletResult<GDriveFileMeta> {
        Err(OutletError::Other("not used in this scenario".into()))
    }

    async fn update_content(&self, _goog_id: &str, _local_path: &std::path::Path) -> OutletResult<GDriveFileMeta> {
        Err(OutletError::Other("not used in this scenario".into()))
    }

    async fn download(&self, _goog_id: &str, dest_path: &std::path::Path) -> OutletResult<()> {
        tokio::fs::write(dest_path, &self.bytes).await?;
        Ok(())
    }

    async fn modify_meta(&self, _goog_id: &str, _patch: MetaPatch) -> OutletResult<GDriveFileMeta> {
        Err(OutletError::Other("not used in this scenario".into()))
    }

    async fn create_folder(&self, _parent_goog_id: &str, _name: &str) -> OutletResult<GDriveFileMeta> {
        Err(OutletError::Other("not used in this scenario".into()))
    }

    async fn delete(&self, _goog_id: &str, _to_trash: bool) -> OutletResult<()> {
        Ok(())
    }

    async fn get_meta(&self, _goog_id: &str) -> OutletResult<Option<GDriveFileMeta>> {
        Ok(None)
    }

    async fn goog_id_for_uid(&self, _uid: Uid) -> Option<String> {
        None
    }
}

fn gdrive_src_node(device: DeviceUid, uid: Uid, goog_id: &str, md5: &str) -> Node {
    Node {
        node_id: DnUid::new(device, uid),
        trashed: TrashStatus::None,
        is_shared: false,
        icon_override: None,
        data: NodeData::GDriveFile {
            goog_id: Some(goog_id.to_string()),
            name: "file1".to_string(),
            mime_type_uid: 0,
            parent_uids: vec![Uid(1)],
            version: 1,
            md5: Some(md5.to_string()),
            size: 11,
            drive_id: None,
            owner_uid: None,
            create_ts: 0,
            modify_ts: 0,
            sync_ts: 0,
        },
    }
}

/// S5, success path: a staged download whose md5 matches the backend's
/// declared md5 is moved into place.
#[tokio::test]
async fn s5_download_md5_verification_succeeds_on_match() {
    let dir = TempDir::new().unwrap();
    let events = Arc::new(EventBus::default());
    let cache = Arc::new(CacheManager::new(dir.path().to_path_buf(), events));
    let device = DeviceUid::new();
    let generator = Arc::new(UidGenerator::new(Uid::NULL));
    let mapper = Arc::new(UidMapper::new(generator));
    let dst_path = dir.path().join("downloaded");
    let dst_uid = mapper.get_uid_for_local_path(dst_path.to_str().unwrap(), Some(Uid(5)));

    let mut mappers = HashMap::new();
    mappers.insert(device, mapper);
    let staging_dir = dir.path().join("staging");
    tokio::fs::create_dir_all(&staging_dir).await.unwrap();

    let ctx = CommandContext {
        staging_dir,
        cache,
        gdrive_client: Some(Arc::new(StubGDrive { bytes: b"hello world".to_vec() })),
        hasher: Arc::new(Md5Hasher),
        retry: RetryConfig::default(),
        volumes: Arc::new(VolumeManager::new()),
        uid_mappers: Arc::new(RwLock::new(mappers)),
    };

    let src = gdrive_src_node(device, Uid(20), "goog-1", "5eb63bbbe01eeed093cb22bb8f5acdc3");
    let dst = Node::planning_local_file(DnUid::new(device, dst_uid), Uid::SUPER_ROOT, 11);
    let op = UserOp::new(1, 1, OpType::Cp, src, Some(dst), 0);

    let result = outlet_core::command::dispatch_for(&op).run(&ctx, &op).await.unwrap();
    assert_eq!(result.to_upsert.len(), 1);
    let downloaded = tokio::fs::read(&dst_path).await.unwrap();
    assert_eq!(downloaded, b"hello world");
}

/// S5, corruption path: a staged download whose md5 does NOT match the
/// declared md5 fails with a checksum error, deletes the staged file, and
/// never touches the destination.
#[tokio::test]
async fn s5_download_md5_verification_fails_on_corruption() {
    let dir = TempDir::new().unwrap();
    let events = Arc::new(EventBus::default());
    let cache = Arc::new(CacheManager::new(dir.path().to_path_buf(), events));
    let device = DeviceUid::new();
    let generator = Arc::new(UidGenerator::new(Uid::NULL));
    let mapper = Arc::new(UidMapper::new(generator));
    let dst_path = dir.path().join("downloaded");
    let dst_uid = mapper.get_uid_for_local_path(dst_path.to_str().unwrap(), Some(Uid(5)));

    let mut mappers = HashMap::new();
    mappers.insert(device, mapper);
    let staging_dir = dir.path().join("staging");
    tokio::fs::create_dir_all(&staging_dir).await.unwrap();

    let ctx = CommandContext {
        staging_dir: staging_dir.clone(),
        cache,
        // Server claims md5 "xyw"; actual bytes hash to something else.
        gdrive_client: Some(Arc::new(StubGDrive { bytes: b"corrupted!!!".to_vec() })),
        hasher: Arc::new(Md5Hasher),
        retry: RetryConfig::default(),
        volumes: Arc::new(VolumeManager::new()),
        uid_mappers: Arc::new(RwLock::new(mappers)),
    };

    let src = gdrive_src_node(device, Uid(20), "goog-1", "5eb63bbbe01eeed093cb22bb8f5acdc3");
    let dst = Node::planning_local_file(DnUid::new(device, dst_uid), Uid::SUPER_ROOT, 11);
    let op = UserOp::new(1, 1, OpType::Cp, src, Some(dst), 0);

    let err = outlet_core::command::dispatch_for(&op).run(&ctx, &op).await.unwrap_err();
    assert!(matches!(err, OutletError::ChecksumMismatch { .. }));
    assert!(!dst_path.exists(), "destination must not be touched on a checksum mismatch");

    let mut staging_entries = tokio::fs::read_dir(&staging_dir).await.unwrap();
    assert!(staging_entries.next_entry().await.unwrap().is_none(), "staged file must be cleaned up");
}

/// S4: submitted ops partially executed before a crash resume from the
/// same ledger file and finish the remaining ops in their original order.
#[tokio::test]
async fn s4_crash_recovery_resumes_remaining_pending_ops_in_order() {
    let dir = TempDir::new().unwrap();
    let ledger_path = dir.path().join("ops.db");
    let device = DeviceUid::new();
    let generator = Arc::new(UidGenerator::new(Uid::NULL));
    let mapper = Arc::new(UidMapper::new(generator));
    let root = dir.path().join("mkdirs");
    tokio::fs::create_dir_all(&root).await.unwrap();

    let mut ops = Vec::new();
    let mut uids = Vec::new();
    for i in 0..5u64 {
        let path = root.join(format!("d{i}"));
        let uid = mapper.get_uid_for_local_path(path.to_str().unwrap(), Some(Uid(10 + i)));
        uids.push(uid);
        ops.push(UserOp::new(
            i + 1,
            1,
            OpType::Mkdir,
            dir_node(DnUid::new(device, uid), Uid::SUPER_ROOT),
            None,
            0,
        ));
    }

    // First process: submit all 5, execute only the first 2, then "crash"
    // (drop the OpManager without finishing the rest).
    {
        let events = Arc::new(EventBus::default());
        let cache = Arc::new(CacheManager::new(dir.path().to_path_buf(), events.clone()));
        let graph = Arc::new(OpGraph::new());
        let ledger = Arc::new(OpLedger::open(&ledger_path).await.unwrap());
        let op_manager = Arc::new(OpManager::new(cache.clone(), graph.clone(), ledger.clone(), events));
        op_manager.append_new_pending_op_batch(ops).await.unwrap();

        for _ in 0..2 {
            let ogn_id = graph.get_next_op_nowait().expect("an op should be ready");
            graph.mark_executing(ogn_id, true);
            let ogn = graph.get(ogn_id).unwrap();
            let op = op_manager.op_for_op_uid(ogn.op_uid).unwrap();
            tokio::fs::create_dir_all(h_local_path(&mapper, &op.src_node)).await.unwrap();
            op_manager
                .finish_command(ogn.op_uid, outlet_core::op::UserOpStatus::Completed, None)
                .await
                .unwrap();
        }

        let remaining = ledger.load_all_pending_ops().await.unwrap();
        assert_eq!(remaining.len(), 3);
    }

    // Second process: fresh in-memory state, same ledger file.
    {
        let events = Arc::new(EventBus::default());
        let cache = Arc::new(CacheManager::new(dir.path().to_path_buf(), events.clone()));
        let graph = Arc::new(OpGraph::new());
        let ledger = Arc::new(OpLedger::open(&ledger_path).await.unwrap());
        let op_manager = Arc::new(OpManager::new(cache, graph.clone(), ledger.clone(), events));
        op_manager.resume_pending_ops_from_disk().await.unwrap();

        assert_eq!(graph.len(), 4, "root + 3 resumed ops"); // 5 submitted, 2 completed before crash

        let mut order = Vec::new();
        while let Some(ogn_id) = graph.get_next_op_nowait() {
            let ogn = graph.get(ogn_id).unwrap();
            graph.mark_executing(ogn_id, true);
            order.push(ogn.op_uid);
            let op = op_manager.op_for_op_uid(ogn.op_uid).unwrap();
            tokio::fs::create_dir_all(h_local_path(&mapper, &op.src_node)).await.unwrap();
            op_manager
                .finish_command(ogn.op_uid, outlet_core::op::UserOpStatus::Completed, None)
                .await
                .unwrap();
        }

        assert_eq!(order, vec![3, 4, 5], "remaining ops finish in their original op_uid order");
        let completed = ledger.load_all_pending_ops().await.unwrap();
        assert!(completed.is_empty());
    }

    for uid in uids {
        let path = mapper.path_for_uid(uid).unwrap();
        assert!(PathBuf::from(path).exists());
    }
}

fn h_local_path(mapper: &UidMapper, node: &Node) -> String {
    mapper.path_for_uid(node.node_id().uid).expect("path registered")
}

struct StubGDriveMoveRetry {
    dst_goog_id: String,
}

#[async_trait]
impl GDriveClient for StubGDriveMoveRetry {
    async fn find_by_parent_and_name(&self, _parent_goog_id: &str, _name: &str) -> OutletResult<Vec<GDriveFileMeta>> {
        Ok(Vec::new())
    }

    async fn upload_new(&self, _parent_goog_id: &str, _name: &str, _local_path: &std::path::Path) -> OutletResult<GDriveFileMeta> {
        Err(OutletError::Other("not used in this scenario".into()))
    }

    async fn update_content(&self, _goog_id: &str, _local_path: &std::path::Path) -> OutletResult<GDriveFileMeta> {
        Err(OutletError::Other("not used in this scenario".into()))
    }

    async fn download(&self, _goog_id: &str, _dest_path: &std::path::Path) -> OutletResult<()> {
        Err(OutletError::Other("not used in this scenario".into()))
    }

    async fn modify_meta(&self, _goog_id: &str, _patch: MetaPatch) -> OutletResult<GDriveFileMeta> {
        // A retry that reached here instead of short-circuiting on the
        // idempotent-completed path would panic the test.
        panic!("modify_meta should not be called on an idempotent retry");
    }

    async fn create_folder(&self, _parent_goog_id: &str, _name: &str) -> OutletResult<GDriveFileMeta> {
        Err(OutletError::Other("not used in this scenario".into()))
    }

    async fn delete(&self, _goog_id: &str, _to_trash: bool) -> OutletResult<()> {
        Err(OutletError::Other("not used in this scenario".into()))
    }

    async fn get_meta(&self, goog_id: &str) -> OutletResult<Option<GDriveFileMeta>> {
        if goog_id == self.dst_goog_id {
            Ok(Some(GDriveFileMeta {
                goog_id: self.dst_goog_id.clone(),
                name: "file1".to_string(),
                parent_goog_ids: vec!["parent-goog".to_string()],
                md5: Some("5eb63bbbe01eeed093cb22bb8f5acdc3".to_string()),
                size: 11,
                version: 1,
            }))
        } else {
            Ok(None)
        }
    }

    async fn goog_id_for_uid(&self, _uid: Uid) -> Option<String> {
        None
    }
}

/// S3: a MV retried after the first attempt already completed the
/// `modify_meta` call finds the src node's goog_id already gone, but the
/// dst node's goog_id still resolves on the backend — treated as already
/// completed rather than re-issuing `modify_meta` or erroring out.
#[tokio::test]
async fn s3_gdrive_move_is_idempotent_on_retry() {
    let device = DeviceUid::new();

    // src's goog_id is already cleared, as it would be after a prior
    // successful move whose result never made it back into the cache.
    let mut src = gdrive_src_node(device, Uid(20), "goog-src", "5eb63bbbe01eeed093cb22bb8f5acdc3");
    if let NodeData::GDriveFile { goog_id, .. } = &mut src.data {
        *goog_id = None;
    }
    let dst = gdrive_src_node(device, Uid(21), "goog-dst", "5eb63bbbe01eeed093cb22bb8f5acdc3");

    let op = UserOp::new(1, 1, OpType::Mv, src, Some(dst.clone()), 0);

    let ctx = CommandContext {
        staging_dir: std::env::temp_dir(),
        cache: Arc::new(CacheManager::new(std::env::temp_dir(), Arc::new(EventBus::default()))),
        gdrive_client: Some(Arc::new(StubGDriveMoveRetry {
            dst_goog_id: "goog-dst".to_string(),
        })),
        hasher: Arc::new(Md5Hasher),
        retry: RetryConfig::default(),
        volumes: Arc::new(VolumeManager::new()),
        uid_mappers: Arc::new(RwLock::new(HashMap::new())),
    };

    let result = outlet_core::command::dispatch_for(&op).run(&ctx, &op).await.unwrap();
    assert_eq!(result.to_upsert.len(), 1);
    assert_eq!(result.to_upsert[0].node_id(), dst.node_id());
}
