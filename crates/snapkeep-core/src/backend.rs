//! Capability contracts between the scheduler and its collaborators.
//!
//! A [`Backend`] stores opaque blobs under string keys. A [`Snapshottee`]
//! (the frontend) produces one point-in-time copy of a data source. The
//! scheduler depends on nothing but these two traits.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::SnapResult;

/// Byte sink handed to a [`Snapshottee`] or filled by [`Backend::read_from`].
pub type Sink<'a> = dyn AsyncWrite + Send + Unpin + 'a;

/// A data source that can copy its current state into a sink.
#[async_trait]
pub trait Snapshottee: Send + Sync {
    /// Write one consistent representation of the source into `sink`.
    async fn copy(&self, sink: &mut Sink<'_>) -> SnapResult<()>;
}

/// Durable key-addressed blob storage.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Open a sink for `key`, let `producer` fill it, and finalize.
    ///
    /// If `producer` fails, nothing must remain readable or listable
    /// under `key` from this write.
    async fn write_to(&self, key: &str, producer: &dyn Snapshottee) -> SnapResult<()>;

    /// Stream the object stored at `key` into `sink`.
    ///
    /// A missing key is reported as [`SnapError::NotFound`](crate::SnapError::NotFound).
    async fn read_from(&self, key: &str, sink: &mut Sink<'_>) -> SnapResult<()>;

    /// Remove `key`.
    async fn delete(&self, key: &str) -> SnapResult<()>;

    /// One page of keys starting with `prefix`, in ascending order,
    /// strictly after `marker`, at most `page_size` long.
    ///
    /// An empty page means no keys remain after `marker`.
    async fn enumerate(&self, prefix: &str, marker: &str, page_size: usize)
    -> SnapResult<Vec<String>>;
}

#[async_trait]
impl Snapshottee for Bytes {
    async fn copy(&self, sink: &mut Sink<'_>) -> SnapResult<()> {
        sink.write_all(self).await?;
        Ok(())
    }
}
