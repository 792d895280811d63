//! In-process backend backed by an ordered map.
//!
//! Used by tests and by callers that want snapshots without touching disk.
//! A producer's output is buffered and only inserted once it completes, so
//! a failed capture leaves the map untouched.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::trace;

use snapkeep_core::{Backend, Sink, SnapError, SnapResult, Snapshottee};

#[derive(Debug, Default)]
pub struct MemoryBackend {
    objects: RwLock<BTreeMap<String, Bytes>>,
    /// Upper bound on page length regardless of the caller's hint.
    max_page: Option<usize>,
    enumerate_calls: AtomicUsize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve at most `max_page` keys per enumerate call, like a store with
    /// a server-side listing limit.
    pub fn with_max_page(mut self, max_page: usize) -> Self {
        self.max_page = Some(max_page.max(1));
        self
    }

    /// Store `data` under `key` directly, bypassing any producer.
    pub async fn insert(&self, key: impl Into<String>, data: impl Into<Bytes>) {
        self.objects.write().await.insert(key.into(), data.into());
    }

    pub async fn get(&self, key: &str) -> Option<Bytes> {
        self.objects.read().await.get(key).cloned()
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.objects.read().await.contains_key(key)
    }

    /// All keys in ascending order.
    pub async fn keys(&self) -> Vec<String> {
        self.objects.read().await.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    /// Number of `enumerate` calls served so far.
    pub fn enumerate_calls(&self) -> usize {
        self.enumerate_calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn write_to(&self, key: &str, producer: &dyn Snapshottee) -> SnapResult<()> {
        let mut buf: Vec<u8> = Vec::new();
        producer.copy(&mut buf).await?;
        trace!(%key, bytes = buf.len(), "stored in memory");
        self.objects
            .write()
            .await
            .insert(key.to_string(), Bytes::from(buf));
        Ok(())
    }

    async fn read_from(&self, key: &str, sink: &mut Sink<'_>) -> SnapResult<()> {
        let data = self
            .get(key)
            .await
            .ok_or_else(|| SnapError::NotFound(key.to_string()))?;
        sink.write_all(&data).await?;
        sink.flush().await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> SnapResult<()> {
        self.objects.write().await.remove(key);
        Ok(())
    }

    async fn enumerate(
        &self,
        prefix: &str,
        marker: &str,
        page_size: usize,
    ) -> SnapResult<Vec<String>> {
        self.enumerate_calls.fetch_add(1, Ordering::Relaxed);

        let limit = match self.max_page {
            Some(max) => page_size.min(max),
            None => page_size,
        };

        // Start from whichever of marker/prefix sorts later.
        let lower = if marker >= prefix {
            Bound::Excluded(marker)
        } else {
            Bound::Included(prefix)
        };

        let objects = self.objects.read().await;
        let keys = objects
            .range::<str, _>((lower, Bound::Unbounded))
            .map(|(key, _)| key)
            .take_while(|key| key.starts_with(prefix))
            .take(limit)
            .cloned()
            .collect();
        Ok(keys)
    }
}
