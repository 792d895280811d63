//! Behaviour every backend must share, exercised against each implementation.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncWriteExt;

use snapkeep_backends::{FileBackend, MemoryBackend, ObjectStoreBackend};
use snapkeep_core::iter::{PageIterator, list};
use snapkeep_core::{Backend, Sink, SnapError, SnapResult, Snapshottee};

/// Writes part of its output, then fails.
struct Interrupted;

#[async_trait]
impl Snapshottee for Interrupted {
    async fn copy(&self, sink: &mut Sink<'_>) -> SnapResult<()> {
        sink.write_all(b"half a snapsh").await?;
        Err(SnapError::Frontend("source went away".into()))
    }
}

async fn read(backend: &dyn Backend, key: &str) -> SnapResult<Vec<u8>> {
    let mut out: Vec<u8> = Vec::new();
    backend.read_from(key, &mut out).await?;
    Ok(out)
}

async fn round_trip(backend: &dyn Backend) {
    backend
        .write_to("app.100.db", &Bytes::from_static(b"payload"))
        .await
        .unwrap();
    assert_eq!(read(backend, "app.100.db").await.unwrap(), b"payload");

    // Overwrite replaces the content.
    backend
        .write_to("app.100.db", &Bytes::from_static(b"second"))
        .await
        .unwrap();
    assert_eq!(read(backend, "app.100.db").await.unwrap(), b"second");
}

async fn failed_write_leaves_nothing(backend: &dyn Backend) {
    let err = backend.write_to("app.200.db", &Interrupted).await.unwrap_err();
    assert!(matches!(err, SnapError::Frontend(_)));
    assert!(backend.enumerate("", "", 100).await.unwrap().is_empty());
    assert!(matches!(
        read(backend, "app.200.db").await,
        Err(SnapError::NotFound(_))
    ));
}

async fn enumerate_pages(backend: &dyn Backend) {
    for key in ["app.3.db", "app.1.db", "other.1.db", "app.2.db", "app.latest.txt"] {
        backend
            .write_to(key, &Bytes::from_static(b"x"))
            .await
            .unwrap();
    }

    assert_eq!(
        backend.enumerate("app.", "", 2).await.unwrap(),
        vec!["app.1.db", "app.2.db"]
    );
    assert_eq!(
        backend.enumerate("app.", "app.2.db", 2).await.unwrap(),
        vec!["app.3.db", "app.latest.txt"]
    );
    assert!(
        backend
            .enumerate("app.", "app.latest.txt", 2)
            .await
            .unwrap()
            .is_empty()
    );

    let all = list(backend, "", "", None).await.unwrap();
    assert_eq!(
        all,
        vec!["app.1.db", "app.2.db", "app.3.db", "app.latest.txt", "other.1.db"]
    );
}

async fn delete_is_idempotent(backend: &dyn Backend) {
    backend
        .write_to("app.1.db", &Bytes::from_static(b"x"))
        .await
        .unwrap();
    backend.delete("app.1.db").await.unwrap();
    backend.delete("app.1.db").await.unwrap();
    assert!(matches!(
        read(backend, "app.1.db").await,
        Err(SnapError::NotFound(_))
    ));
}

async fn run_contract(make: impl Fn() -> Box<dyn Backend>) {
    round_trip(make().as_ref()).await;
    failed_write_leaves_nothing(make().as_ref()).await;
    enumerate_pages(make().as_ref()).await;
    delete_is_idempotent(make().as_ref()).await;
}

#[tokio::test]
async fn memory_backend_contract() {
    run_contract(|| Box::new(MemoryBackend::new())).await;
}

#[tokio::test]
async fn file_backend_contract() {
    let root = tempfile::tempdir().unwrap();
    let counter = std::sync::atomic::AtomicUsize::new(0);
    run_contract(|| {
        let n = counter.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        Box::new(FileBackend::new(root.path().join(n.to_string())))
    })
    .await;
}

#[tokio::test]
async fn in_memory_object_store_contract() {
    run_contract(|| Box::new(ObjectStoreBackend::in_memory())).await;
}

#[tokio::test]
async fn local_object_store_contract() {
    let root = tempfile::tempdir().unwrap();
    let counter = std::sync::atomic::AtomicUsize::new(0);
    run_contract(|| {
        let n = counter.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        Box::new(ObjectStoreBackend::local(&root.path().join(n.to_string())).unwrap())
    })
    .await;
}

#[tokio::test]
async fn iterator_walks_a_capped_backend_without_gaps() {
    let backend = MemoryBackend::new().with_max_page(7);
    for i in 0..1001 {
        backend.insert(format!("k.{i:05}"), "x").await;
    }

    let mut iter = PageIterator::new(&backend, "k.", "", None);
    let mut seen = Vec::new();
    while let Some(key) = iter.next().await.unwrap() {
        seen.push(key);
    }

    let expected: Vec<String> = (0..1001).map(|i| format!("k.{i:05}")).collect();
    assert_eq!(seen, expected);
    // 143 full pages plus the terminating empty page.
    assert_eq!(backend.enumerate_calls(), 144);
}
