//! Runs the storage conformance suite against every bundled backend.

use std::sync::atomic::{AtomicUsize, Ordering};

use pipeline_storage::conformance::{run_conformance_suite, run_shared_store_suite};
use pipeline_storage::{FileStorage, MemoryStorage};

#[tokio::test]
async fn memory_storage_conformance() {
    let report = run_conformance_suite(|| async { MemoryStorage::new() }).await;
    assert_eq!(report.failed, 0, "{report}");
    assert!(report.total > 0);
}

#[tokio::test]
async fn file_storage_conformance() {
    let root = tempfile::tempdir().unwrap();
    let counter = AtomicUsize::new(0);
    let report = run_conformance_suite(|| {
        let dir = root
            .path()
            .join(format!("store-{}", counter.fetch_add(1, Ordering::SeqCst)));
        async move { FileStorage::open(dir) }
    })
    .await;
    assert_eq!(report.failed, 0, "{report}");
}

#[tokio::test]
async fn file_storage_shared_directory_conformance() {
    let dir = tempfile::tempdir().unwrap();
    let report = run_shared_store_suite(|| async { FileStorage::open(dir.path()) }).await;
    assert_eq!(report.failed, 0, "{report}");
    assert!(report.total > 0);
}

#[tokio::test]
async fn memory_storage_shared_clone_conformance() {
    let store = MemoryStorage::new();
    let report = run_shared_store_suite(|| {
        let handle = store.clone();
        async move { handle }
    })
    .await;
    assert_eq!(report.failed, 0, "{report}");
}

#[tokio::test]
async fn memory_storage_clones_share_tables() {
    use pipeline_storage::PipelineStorage;

    let a = MemoryStorage::new();
    let b = a.clone();
    a.put_parameter("/dev/final-bucket", "fsa-dev-final")
        .await
        .unwrap();
    assert_eq!(
        b.get_parameter("/dev/final-bucket").await.unwrap().as_deref(),
        Some("fsa-dev-final")
    );
}
