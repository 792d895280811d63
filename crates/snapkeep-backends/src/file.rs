//! Local filesystem backend.
//!
//! Every key is a file directly under the backend directory. Writes are
//! staged in `<dir>/.staging/` and renamed into place only after the
//! producer succeeds and the data is synced, so a failed or cancelled
//! capture never leaves a readable or listable file behind.
//!
//! Listing pages are served from a sorted snapshot of the directory. A walk
//! starting from an empty marker rescans it, as does any page requested
//! after [`LISTING_TTL`]; writes and deletes through the backend keep the
//! snapshot current in between.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, trace};

use snapkeep_core::{Backend, Sink, SnapError, SnapResult, Snapshottee};

/// Subdirectory holding in-progress writes.
const STAGING_DIR: &str = ".staging";

/// Age after which a directory snapshot is rescanned mid-walk.
pub const LISTING_TTL: Duration = Duration::from_secs(5);

/// Sorted file names from one directory scan.
#[derive(Debug)]
struct DirListing {
    names: Vec<String>,
    taken: Instant,
}

impl DirListing {
    fn insert(&mut self, name: &str) {
        if let Err(pos) = self.names.binary_search_by(|n| n.as_str().cmp(name)) {
            self.names.insert(pos, name.to_string());
        }
    }

    fn remove(&mut self, name: &str) {
        if let Ok(pos) = self.names.binary_search_by(|n| n.as_str().cmp(name)) {
            self.names.remove(pos);
        }
    }

    /// Up to `limit` names under `prefix` strictly after `marker`.
    fn page(&self, prefix: &str, marker: &str, limit: usize) -> Vec<String> {
        let start = self
            .names
            .partition_point(|n| n.as_str() <= marker || n.as_str() < prefix);
        self.names[start..]
            .iter()
            .take_while(|n| n.starts_with(prefix))
            .take(limit)
            .cloned()
            .collect()
    }
}

/// Stores snapshots as plain files in one directory.
#[derive(Debug)]
pub struct FileBackend {
    dir: PathBuf,
    listing: Mutex<Option<DirListing>>,
    scans: AtomicUsize,
}

impl FileBackend {
    /// Backend rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            listing: Mutex::new(None),
            scans: AtomicUsize::new(0),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Number of full directory scans performed so far.
    pub fn directory_scans(&self) -> usize {
        self.scans.load(Ordering::Relaxed)
    }

    /// Read every regular file name in the directory, sorted.
    async fn scan(&self) -> SnapResult<DirListing> {
        self.scans.fetch_add(1, Ordering::Relaxed);
        let taken = Instant::now();

        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Ok(DirListing {
                    names: Vec::new(),
                    taken,
                });
            }
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if let Ok(name) = entry.file_name().into_string() {
                names.push(name);
            }
        }
        names.sort_unstable();
        trace!(dir = ?self.dir, files = names.len(), "directory scanned");
        Ok(DirListing { names, taken })
    }

    /// Resolve `key` to a file path, rejecting anything that would escape
    /// the directory or collide with the staging area.
    fn path_for(&self, key: &str) -> SnapResult<PathBuf> {
        if key.is_empty()
            || key.starts_with('.')
            || key.contains('/')
            || key.contains('\\')
        {
            return Err(SnapError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(key))
    }
}

#[async_trait]
impl Backend for FileBackend {
    async fn write_to(&self, key: &str, producer: &dyn Snapshottee) -> SnapResult<()> {
        let target = self.path_for(key)?;

        // Recreated on every write in case the directory was removed underneath us.
        let staging = self.dir.join(STAGING_DIR);
        tokio::fs::create_dir_all(&staging).await?;

        // Dropping `staged` on any early return removes the partial file.
        let staged = tempfile::Builder::new()
            .prefix(key)
            .suffix(".partial")
            .tempfile_in(&staging)?;
        let mut file = tokio::fs::File::from_std(staged.as_file().try_clone()?);

        producer.copy(&mut file).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        staged.persist(&target).map_err(|e| SnapError::Io(e.error))?;
        if let Some(listing) = self.listing.lock().await.as_mut() {
            listing.insert(key);
        }
        debug!(%key, path = ?target, "file written");
        Ok(())
    }

    async fn read_from(&self, key: &str, sink: &mut Sink<'_>) -> SnapResult<()> {
        let path = self.path_for(key)?;
        let mut file = match tokio::fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(SnapError::NotFound(key.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        tokio::io::copy(&mut file, &mut *sink).await?;
        sink.flush().await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> SnapResult<()> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => debug!(%key, "file deleted"),
            // Already gone; deletion is idempotent.
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        if let Some(listing) = self.listing.lock().await.as_mut() {
            listing.remove(key);
        }
        Ok(())
    }

    async fn enumerate(
        &self,
        prefix: &str,
        marker: &str,
        page_size: usize,
    ) -> SnapResult<Vec<String>> {
        let mut listing = self.listing.lock().await;
        let stale = match listing.as_ref() {
            Some(cached) => marker.is_empty() || cached.taken.elapsed() >= LISTING_TTL,
            None => true,
        };
        if stale {
            *listing = Some(self.scan().await?);
        }

        Ok(listing
            .as_ref()
            .map(|cached| cached.page(prefix, marker, page_size))
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use snapkeep_core::iter::PageIterator;

    #[test]
    fn rejects_path_like_keys() {
        let backend = FileBackend::new("/tmp/unused");
        for key in ["", "../etc/passwd", "a/b", "a\\b", ".staging", ".hidden"] {
            assert!(
                matches!(backend.path_for(key), Err(SnapError::InvalidKey(_))),
                "{key:?}"
            );
        }
        assert!(backend.path_for("test.1700000000.db").is_ok());
    }

    #[tokio::test]
    async fn staging_area_is_not_listed() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path());

        backend
            .write_to("test.1.db", &Bytes::from_static(b"x"))
            .await
            .unwrap();

        assert!(dir.path().join(STAGING_DIR).is_dir());
        let keys = backend.enumerate("", "", 100).await.unwrap();
        assert_eq!(keys, vec!["test.1.db"]);
    }

    #[tokio::test]
    async fn missing_directory_lists_empty() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path().join("not-yet"));
        assert!(backend.enumerate("", "", 10).await.unwrap().is_empty());
    }

    async fn seeded(dir: &Path, files: usize) -> FileBackend {
        let backend = FileBackend::new(dir);
        for i in 0..files {
            backend
                .write_to(&format!("app.{i:03}.db"), &Bytes::from_static(b"x"))
                .await
                .unwrap();
        }
        std::fs::write(dir.join("other.1.db"), b"x").unwrap();
        backend
    }

    #[tokio::test]
    async fn paged_walk_scans_the_directory_once() {
        let dir = tempfile::tempdir().unwrap();
        let backend = seeded(dir.path(), 50).await;

        let mut pages = PageIterator::new(&backend, "app.", "", None).with_page_size(7);
        let mut keys = Vec::new();
        while let Some(key) = pages.next().await.unwrap() {
            keys.push(key);
        }

        assert_eq!(keys.len(), 50);
        assert_eq!(keys.first().map(String::as_str), Some("app.000.db"));
        assert_eq!(keys.last().map(String::as_str), Some("app.049.db"));
        assert_eq!(backend.directory_scans(), 1);
    }

    #[tokio::test]
    async fn own_writes_and_deletes_show_up_mid_walk() {
        let dir = tempfile::tempdir().unwrap();
        let backend = seeded(dir.path(), 10).await;

        let first = backend.enumerate("app.", "", 5).await.unwrap();
        assert_eq!(first.last().map(String::as_str), Some("app.004.db"));

        backend.delete("app.005.db").await.unwrap();
        backend
            .write_to("app.0055.db", &Bytes::from_static(b"x"))
            .await
            .unwrap();

        let second = backend.enumerate("app.", "app.004.db", 2).await.unwrap();
        assert_eq!(second, vec!["app.0055.db", "app.006.db"]);
        assert_eq!(backend.directory_scans(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn outside_changes_are_picked_up_by_the_next_walk() {
        let dir = tempfile::tempdir().unwrap();
        let backend = seeded(dir.path(), 3).await;

        assert_eq!(backend.enumerate("app.", "", 10).await.unwrap().len(), 3);
        std::fs::write(dir.path().join("app.100.db"), b"x").unwrap();

        // Mid-walk pages keep serving the snapshot until it ages out.
        let resumed = backend.enumerate("app.", "app.002.db", 10).await.unwrap();
        assert!(resumed.is_empty());

        tokio::time::advance(LISTING_TTL).await;
        let resumed = backend.enumerate("app.", "app.002.db", 10).await.unwrap();
        assert_eq!(resumed, vec!["app.100.db"]);
        assert_eq!(backend.directory_scans(), 2);

        std::fs::remove_file(dir.path().join("app.000.db")).unwrap();
        let fresh = backend.enumerate("app.", "", 10).await.unwrap();
        assert_eq!(fresh, vec!["app.001.db", "app.002.db", "app.100.db"]);
        assert_eq!(backend.directory_scans(), 3);
    }
}
