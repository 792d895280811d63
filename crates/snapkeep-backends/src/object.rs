//! Object store backend (S3 and compatible services, local directories,
//! in-memory) built on the `object_store` crate.
//!
//! Writes go through a multipart [`BufWriter`] that is aborted when the
//! producer fails, so no object becomes visible for a failed capture.
//! Keys live directly under an optional root path inside the store.
//!
//! Listing starts at the later of the marker and the key prefix. Stores
//! that list in key order (S3, in-memory) stop reading as soon as a page
//! is full or the listing moves past the prefix; the local filesystem
//! store lists in directory order and is read to the end and sorted.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::buffered::BufWriter;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use snapkeep_core::{Backend, Sink, SnapError, SnapResult, Snapshottee};

/// Connection settings for an S3-compatible bucket.
///
/// Unset credentials fall back to the standard `AWS_*` environment variables.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct S3Options {
    pub bucket: String,
    #[serde(default)]
    pub region: Option<String>,
    /// Custom endpoint for S3-compatible services (MinIO, R2, ...).
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub access_key_id: Option<String>,
    #[serde(default)]
    pub secret_access_key: Option<String>,
    /// Path inside the bucket under which keys are stored.
    #[serde(default)]
    pub root: Option<String>,
}

impl std::fmt::Debug for S3Options {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Options")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &self.secret_access_key.as_ref().map(|_| "***"))
            .field("root", &self.root)
            .finish()
    }
}

pub struct ObjectStoreBackend {
    store: Arc<dyn ObjectStore>,
    root: ObjectPath,
    /// Whether `list_with_offset` yields locations in ascending order.
    ordered_listing: bool,
}

impl std::fmt::Debug for ObjectStoreBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStoreBackend")
            .field("store", &self.store.to_string())
            .field("root", &self.root.as_ref())
            .field("ordered_listing", &self.ordered_listing)
            .finish()
    }
}

impl ObjectStoreBackend {
    /// Wrap an existing store. `root` of `None` stores keys at the top level.
    ///
    /// The store is assumed to list in ascending key order; use
    /// [`with_unordered_listing`](Self::with_unordered_listing) otherwise.
    pub fn new(store: Arc<dyn ObjectStore>, root: Option<&str>) -> Self {
        let root = root.map(ObjectPath::from).unwrap_or_default();
        Self {
            store,
            root,
            ordered_listing: true,
        }
    }

    /// Read every listing to the end and sort it, for stores without an
    /// ordered listing.
    pub fn with_unordered_listing(mut self) -> Self {
        self.ordered_listing = false;
        self
    }

    pub fn s3(options: &S3Options) -> SnapResult<Self> {
        let mut builder = AmazonS3Builder::from_env().with_bucket_name(&options.bucket);
        if let Some(region) = &options.region {
            builder = builder.with_region(region);
        }
        if let Some(endpoint) = &options.endpoint {
            builder = builder
                .with_endpoint(endpoint)
                .with_allow_http(endpoint.starts_with("http://"));
        }
        if let Some(access_key_id) = &options.access_key_id {
            builder = builder.with_access_key_id(access_key_id);
        }
        if let Some(secret_access_key) = &options.secret_access_key {
            builder = builder.with_secret_access_key(secret_access_key);
        }

        let store = builder
            .build()
            .map_err(|e| SnapError::Backend(format!("s3 setup: {e}")))?;
        debug!(bucket = %options.bucket, "s3 backend configured");
        Ok(Self::new(Arc::new(store), options.root.as_deref()))
    }

    /// Store objects under a local directory, creating it if needed.
    pub fn local(dir: &Path) -> SnapResult<Self> {
        std::fs::create_dir_all(dir)?;
        let store = LocalFileSystem::new_with_prefix(dir)
            .map_err(|e| SnapError::Backend(format!("local store setup: {e}")))?;
        Ok(Self::new(Arc::new(store), None).with_unordered_listing())
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemory::new()), None)
    }

    fn location(&self, key: &str) -> SnapResult<ObjectPath> {
        if key.is_empty() || key.contains('/') {
            return Err(SnapError::InvalidKey(key.to_string()));
        }
        Ok(self.root.child(key))
    }

    fn root_prefix(&self) -> Option<&ObjectPath> {
        (!self.root.as_ref().is_empty()).then_some(&self.root)
    }

    /// Exclusive listing start: the marker, or the prefix minus its last
    /// character when the prefix sorts after the marker.
    fn listing_offset(&self, prefix: &str, marker: &str) -> SnapResult<Option<ObjectPath>> {
        let start = if marker >= prefix {
            marker
        } else {
            let mut chars = prefix.chars();
            chars.next_back();
            chars.as_str()
        };
        if start.is_empty() {
            return Ok(None);
        }
        self.location(start).map(Some)
    }
}

fn store_error(key: &str, err: object_store::Error) -> SnapError {
    match err {
        object_store::Error::NotFound { .. } => SnapError::NotFound(key.to_string()),
        other => SnapError::Backend(other.to_string()),
    }
}

#[async_trait]
impl Backend for ObjectStoreBackend {
    async fn write_to(&self, key: &str, producer: &dyn Snapshottee) -> SnapResult<()> {
        let location = self.location(key)?;
        let mut writer = BufWriter::new(Arc::clone(&self.store), location);

        if let Err(e) = producer.copy(&mut writer).await {
            if let Err(abort) = writer.abort().await {
                warn!(%key, error = %abort, "failed to abort partial upload");
            }
            return Err(e);
        }

        writer.shutdown().await?;
        debug!(%key, "object written");
        Ok(())
    }

    async fn read_from(&self, key: &str, sink: &mut Sink<'_>) -> SnapResult<()> {
        let location = self.location(key)?;
        let result = self
            .store
            .get(&location)
            .await
            .map_err(|e| store_error(key, e))?;

        let mut stream = result.into_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| store_error(key, e))?;
            sink.write_all(&chunk).await?;
        }
        sink.flush().await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> SnapResult<()> {
        let location = self.location(key)?;
        match self.store.delete(&location).await {
            Ok(()) => {
                debug!(%key, "object deleted");
                Ok(())
            }
            Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(store_error(key, e)),
        }
    }

    async fn enumerate(
        &self,
        prefix: &str,
        marker: &str,
        page_size: usize,
    ) -> SnapResult<Vec<String>> {
        // No key contains a separator, so such a prefix matches nothing.
        if prefix.contains('/') || page_size == 0 {
            return Ok(Vec::new());
        }

        // Store prefixes match whole path segments, so key prefixes are
        // matched on the file name here.
        let mut listing = match self.listing_offset(prefix, marker)? {
            Some(offset) => self.store.list_with_offset(self.root_prefix(), &offset),
            None => self.store.list(self.root_prefix()),
        };

        let depth = self.root.parts().count() + 1;
        let mut keys = Vec::new();
        while let Some(meta) = listing.next().await {
            let meta = meta.map_err(|e| SnapError::Backend(e.to_string()))?;
            if meta.location.parts().count() != depth {
                continue;
            }
            let Some(name) = meta.location.filename() else {
                continue;
            };

            if name.starts_with(prefix) {
                if name > marker {
                    keys.push(name.to_string());
                }
                if self.ordered_listing && keys.len() >= page_size {
                    break;
                }
            } else if self.ordered_listing && name > prefix {
                // Sorted past every key that can carry the prefix.
                break;
            }
        }

        if !self.ordered_listing {
            keys.sort_unstable();
            keys.truncate(page_size);
        }
        Ok(keys)
    }
}
