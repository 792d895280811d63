//! How much of an ordered object store listing `enumerate` reads.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::{
    GetOptions, GetResult, ListResult, MultipartUpload, ObjectMeta, ObjectStore,
    PutMultipartOptions, PutOptions, PutPayload, PutResult, Result,
};

use snapkeep_backends::ObjectStoreBackend;
use snapkeep_core::Backend;
use snapkeep_core::iter::PageIterator;

/// In-memory store that counts every object its listings yield.
#[derive(Debug)]
struct CountingStore {
    inner: InMemory,
    listed: Arc<AtomicUsize>,
}

impl CountingStore {
    fn new() -> Self {
        Self {
            inner: InMemory::new(),
            listed: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn counted(
        &self,
        stream: BoxStream<'static, Result<ObjectMeta>>,
    ) -> BoxStream<'static, Result<ObjectMeta>> {
        let listed = Arc::clone(&self.listed);
        stream
            .inspect(move |_| {
                listed.fetch_add(1, Ordering::SeqCst);
            })
            .boxed()
    }
}

impl fmt::Display for CountingStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Counting({})", self.inner)
    }
}

#[async_trait]
impl ObjectStore for CountingStore {
    async fn put_opts(
        &self,
        location: &Path,
        payload: PutPayload,
        opts: PutOptions,
    ) -> Result<PutResult> {
        self.inner.put_opts(location, payload, opts).await
    }

    async fn put_multipart_opts(
        &self,
        location: &Path,
        opts: PutMultipartOptions,
    ) -> Result<Box<dyn MultipartUpload>> {
        self.inner.put_multipart_opts(location, opts).await
    }

    async fn get_opts(&self, location: &Path, options: GetOptions) -> Result<GetResult> {
        self.inner.get_opts(location, options).await
    }

    async fn delete(&self, location: &Path) -> Result<()> {
        self.inner.delete(location).await
    }

    fn list(&self, prefix: Option<&Path>) -> BoxStream<'static, Result<ObjectMeta>> {
        self.counted(self.inner.list(prefix))
    }

    fn list_with_offset(
        &self,
        prefix: Option<&Path>,
        offset: &Path,
    ) -> BoxStream<'static, Result<ObjectMeta>> {
        self.counted(self.inner.list_with_offset(prefix, offset))
    }

    async fn list_with_delimiter(&self, prefix: Option<&Path>) -> Result<ListResult> {
        self.inner.list_with_delimiter(prefix).await
    }

    async fn copy(&self, from: &Path, to: &Path) -> Result<()> {
        self.inner.copy(from, to).await
    }

    async fn copy_if_not_exists(&self, from: &Path, to: &Path) -> Result<()> {
        self.inner.copy_if_not_exists(from, to).await
    }
}

const KEYS: usize = 3000;

/// `KEYS` keys under `app.`, with other names sorting before and after.
async fn seeded() -> (ObjectStoreBackend, Arc<AtomicUsize>) {
    let store = CountingStore::new();
    let listed = Arc::clone(&store.listed);
    for i in 0..KEYS {
        let location = Path::from(format!("app.{i:05}.db"));
        store
            .put(&location, PutPayload::from_static(b"x"))
            .await
            .unwrap();
    }
    for name in ["aaa.1.db", "alpha.1.db", "app-other.1.db", "zulu.1.db", "zulu.2.db"] {
        store
            .put(&Path::from(name), PutPayload::from_static(b"x"))
            .await
            .unwrap();
    }
    listed.store(0, Ordering::SeqCst);
    (ObjectStoreBackend::new(Arc::new(store), None), listed)
}

#[tokio::test]
async fn single_key_page_reads_one_object() {
    let (backend, listed) = seeded().await;

    let page = backend.enumerate("app.", "", 1).await.unwrap();
    assert_eq!(page, vec!["app.00000.db"]);
    // Names before the prefix are skipped by the listing offset.
    assert!(listed.load(Ordering::SeqCst) <= 2, "{listed:?}");
}

#[tokio::test]
async fn marker_page_starts_after_the_marker() {
    let (backend, listed) = seeded().await;

    let page = backend.enumerate("app.", "app.01499.db", 3).await.unwrap();
    assert_eq!(page, vec!["app.01500.db", "app.01501.db", "app.01502.db"]);
    assert_eq!(listed.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn listing_stops_past_the_prefix() {
    let (backend, listed) = seeded().await;

    let page = backend.enumerate("app.", "app.02999.db", 10).await.unwrap();
    assert!(page.is_empty());
    // Only the first name past the prefix is read.
    assert_eq!(listed.load(Ordering::SeqCst), 1);

    let zulu = backend.enumerate("zulu.", "", 10).await.unwrap();
    assert_eq!(zulu, vec!["zulu.1.db", "zulu.2.db"]);
}

#[tokio::test]
async fn full_walk_reads_each_object_once() {
    let (backend, listed) = seeded().await;

    let mut pages = PageIterator::new(&backend, "app.", "", None).with_page_size(100);
    let mut keys = Vec::new();
    while let Some(key) = pages.next().await.unwrap() {
        keys.push(key);
    }

    assert_eq!(keys.len(), KEYS);
    assert!(keys.windows(2).all(|w| w[0] < w[1]));
    // Full pages stop at their last key; the empty final page reads one
    // name past the prefix.
    assert_eq!(listed.load(Ordering::SeqCst), KEYS + 1);
}
