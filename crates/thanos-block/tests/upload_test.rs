//! Upload ordering, compensating delete and precondition checks.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{block_id, write_block, Op, TestBucket, BLOCK_ID};
use thanos_block::{BlockError, BlockTransfer, Bucket, CancellationToken, Step};

fn setup() -> (Arc<TestBucket>, BlockTransfer) {
    let bkt = Arc::new(TestBucket::new());
    let transfer = BlockTransfer::new(bkt.clone());
    (bkt, transfer)
}

#[tokio::test]
async fn test_upload_scenario_writes_meta_last() {
    let root = tempfile::tempdir().unwrap();
    let bdir = write_block(root.path(), &[("replica", "0")]);
    let (bkt, transfer) = setup();

    transfer
        .upload(&CancellationToken::new(), &bdir)
        .await
        .expect("upload failed");

    assert_eq!(
        bkt.uploaded_keys(),
        vec![
            format!("debug/metas/{BLOCK_ID}.json"),
            format!("{BLOCK_ID}/chunks/000001"),
            format!("{BLOCK_ID}/index"),
            format!("{BLOCK_ID}/meta.json"),
        ]
    );

    let local_meta = std::fs::read(bdir.join("meta.json")).unwrap();
    assert_eq!(
        bkt.get_bytes(&format!("{BLOCK_ID}/meta.json")).await.unwrap(),
        local_meta
    );
    assert_eq!(
        bkt.get_bytes(&format!("debug/metas/{BLOCK_ID}.json")).await.unwrap(),
        local_meta
    );
    assert_eq!(
        bkt.get_bytes(&format!("{BLOCK_ID}/chunks/000001")).await.unwrap(),
        &b"chunk-data"[..]
    );
}

#[tokio::test]
async fn test_meta_never_visible_before_index_and_chunks() {
    let root = tempfile::tempdir().unwrap();
    let bdir = common::write_block_with_chunks(
        root.path(),
        &[("replica", "0")],
        &[("000001", b"a"), ("000002", b"b"), ("000003", b"c")],
    );
    let (bkt, transfer) = setup();

    transfer
        .upload(&CancellationToken::new(), &bdir)
        .await
        .unwrap();

    let meta = format!("{BLOCK_ID}/meta.json");
    let required = [
        format!("{BLOCK_ID}/index"),
        format!("{BLOCK_ID}/chunks/000001"),
        format!("{BLOCK_ID}/chunks/000002"),
        format!("{BLOCK_ID}/chunks/000003"),
    ];

    let snapshots = bkt.snapshots();
    assert!(!snapshots.is_empty());
    for listing in &snapshots {
        if listing.contains(&meta) {
            for key in &required {
                assert!(listing.contains(key), "{meta} visible before {key}");
            }
        }
    }
    // Only the final listing contains the meta file.
    let with_meta = snapshots.iter().filter(|l| l.contains(&meta)).count();
    assert_eq!(with_meta, 1);
}

#[tokio::test]
async fn test_chunks_failure_deletes_partial_block() {
    let root = tempfile::tempdir().unwrap();
    let bdir = common::write_block_with_chunks(
        root.path(),
        &[("replica", "0")],
        &[("000001", b"a"), ("000002", b"b")],
    );
    let (bkt, transfer) = setup();
    bkt.fail_upload("chunks/000002");

    let err = transfer
        .upload(&CancellationToken::new(), &bdir)
        .await
        .unwrap_err();

    assert!(
        matches!(err, BlockError::Transfer { step: Step::Chunks, .. }),
        "{err}"
    );
    assert!(bkt.list(BLOCK_ID).await.unwrap().is_empty());
    assert!(bkt
        .ops()
        .contains(&Op::Delete(format!("{BLOCK_ID}/chunks/000001"))));
}

#[tokio::test]
async fn test_index_failure_deletes_partial_block() {
    let root = tempfile::tempdir().unwrap();
    let bdir = write_block(root.path(), &[("replica", "0")]);
    let (bkt, transfer) = setup();
    bkt.fail_upload("/index");

    let err = transfer
        .upload(&CancellationToken::new(), &bdir)
        .await
        .unwrap_err();

    assert!(
        matches!(err, BlockError::Transfer { step: Step::Index, .. }),
        "{err}"
    );
    assert!(err.to_string().contains("upload index"));
    assert!(bkt.list(BLOCK_ID).await.unwrap().is_empty());
    // The forensic copy outlives the failed attempt.
    assert!(bkt
        .exists(&format!("debug/metas/{BLOCK_ID}.json"))
        .await
        .unwrap());
}

#[tokio::test]
async fn test_meta_failure_deletes_partial_block() {
    let root = tempfile::tempdir().unwrap();
    let bdir = write_block(root.path(), &[("replica", "0")]);
    let (bkt, transfer) = setup();
    bkt.fail_upload(&format!("{BLOCK_ID}/meta.json"));

    let err = transfer
        .upload(&CancellationToken::new(), &bdir)
        .await
        .unwrap_err();

    assert!(
        matches!(err, BlockError::Transfer { step: Step::Meta, .. }),
        "{err}"
    );
    assert!(bkt.list(BLOCK_ID).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_debug_meta_failure_aborts_without_writes() {
    let root = tempfile::tempdir().unwrap();
    let bdir = write_block(root.path(), &[("replica", "0")]);
    let (bkt, transfer) = setup();
    bkt.fail_upload(&format!("debug/metas/{BLOCK_ID}.json"));

    let err = transfer
        .upload(&CancellationToken::new(), &bdir)
        .await
        .unwrap_err();

    assert!(
        matches!(err, BlockError::Transfer { step: Step::DebugMeta, .. }),
        "{err}"
    );
    assert!(bkt.ops().is_empty());
}

#[tokio::test]
async fn test_failed_cleanup_reports_partial_block() {
    let root = tempfile::tempdir().unwrap();
    let bdir = write_block(root.path(), &[("replica", "0")]);
    let (bkt, transfer) = setup();
    bkt.fail_upload("/index");
    bkt.fail_deletes();

    let err = transfer
        .upload(&CancellationToken::new(), &bdir)
        .await
        .unwrap_err();

    assert!(err.is_partial_upload(), "{err}");
    let msg = err.to_string();
    assert!(msg.contains("partial block may remain"), "{msg}");
    assert!(msg.contains("injected delete failure"), "{msg}");
    assert!(msg.contains("injected upload failure"), "{msg}");

    // Chunks are still there and no meta was written: readers skip it.
    let left = bkt.list(BLOCK_ID).await.unwrap();
    assert_eq!(left, vec![format!("{BLOCK_ID}/chunks/000001")]);
}

#[tokio::test]
async fn test_empty_labels_rejected_without_remote_writes() {
    let root = tempfile::tempdir().unwrap();
    let bdir = write_block(root.path(), &[]);
    let (bkt, transfer) = setup();

    let err = transfer
        .upload(&CancellationToken::new(), &bdir)
        .await
        .unwrap_err();

    assert!(matches!(err, BlockError::EmptyLabels { .. }), "{err}");
    assert!(err.is_validation());
    assert!(bkt.ops().is_empty());
    assert!(bkt.list("").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unsupported_meta_version_rejected() {
    let root = tempfile::tempdir().unwrap();
    let bdir = write_block(root.path(), &[("replica", "0")]);
    std::fs::write(bdir.join("meta.json"), r#"{"version": 2}"#).unwrap();
    let (bkt, transfer) = setup();

    let err = transfer
        .upload(&CancellationToken::new(), &bdir)
        .await
        .unwrap_err();

    assert!(matches!(err, BlockError::ReadMeta(_)), "{err}");
    assert!(err.to_string().contains("unexpected meta file version 2"));
    assert!(bkt.ops().is_empty());
}

fn cancel_after(delay: Duration) -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        trigger.cancel();
    });
    cancel
}

#[tokio::test]
async fn test_cancel_mid_upload_still_cleans_up() {
    let root = tempfile::tempdir().unwrap();
    let bdir = write_block(root.path(), &[("replica", "0")]);
    let (bkt, transfer) = setup();
    bkt.delay_upload("/index", Duration::from_millis(200));

    let cancel = cancel_after(Duration::from_millis(50));
    let err = tokio::time::timeout(Duration::from_secs(10), transfer.upload(&cancel, &bdir))
        .await
        .expect("upload did not observe cancellation")
        .unwrap_err();

    // A put in progress is allowed to finish; the meta file is never started.
    assert!(matches!(err, BlockError::Cancelled { .. }), "{err}");
    assert!(!bkt
        .uploaded_keys()
        .contains(&format!("{BLOCK_ID}/meta.json")));
    assert!(bkt.list(BLOCK_ID).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_cancel_during_slow_chunk_leaves_no_objects_behind() {
    let root = tempfile::tempdir().unwrap();
    let bdir = common::write_block_with_chunks(
        root.path(),
        &[("replica", "0")],
        &[("000001", b"a"), ("000002", b"b")],
    );
    let (bkt, transfer) = setup();
    let chunk = format!("{BLOCK_ID}/chunks/000001");
    bkt.delay_upload("chunks/000001", Duration::from_millis(300));

    let cancel = cancel_after(Duration::from_millis(50));
    let err = transfer.upload(&cancel, &bdir).await.unwrap_err();

    assert!(
        matches!(err, BlockError::Cancelled { step: Step::Chunks }),
        "{err}"
    );
    assert!(!err.is_partial_upload());

    // Anything still in flight would land within this window.
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(bkt.list(BLOCK_ID).await.unwrap().is_empty());

    let ops = bkt.ops();
    let put = ops.iter().position(|op| *op == Op::Upload(chunk.clone()));
    let del = ops.iter().position(|op| *op == Op::Delete(chunk.clone()));
    assert!(put.unwrap() < del.unwrap(), "{ops:?}");
    assert!(!bkt
        .uploaded_keys()
        .contains(&format!("{BLOCK_ID}/chunks/000002")));
}

#[tokio::test]
async fn test_reupload_after_failure_succeeds() {
    let root = tempfile::tempdir().unwrap();
    let bdir = write_block(root.path(), &[("replica", "0")]);
    let (bkt, transfer) = setup();
    bkt.fail_upload("/index");

    assert!(transfer
        .upload(&CancellationToken::new(), &bdir)
        .await
        .is_err());

    bkt.clear_faults();
    assert_eq!(
        transfer
            .upload(&CancellationToken::new(), &bdir)
            .await
            .unwrap(),
        block_id()
    );
    assert_eq!(
        bkt.list(BLOCK_ID).await.unwrap(),
        vec![
            format!("{BLOCK_ID}/chunks/000001"),
            format!("{BLOCK_ID}/index"),
            format!("{BLOCK_ID}/meta.json"),
        ]
    );
}
