//! Copies a file into the sink.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use snapkeep_core::{Sink, SnapError, SnapResult, Snapshottee};

/// Snapshots a single file, typically an embedded store's data file.
///
/// The file is read as-is; callers are responsible for it being in a
/// consistent state while the copy runs.
#[derive(Debug, Clone)]
pub struct FileSnapshottee {
    path: PathBuf,
}

impl FileSnapshottee {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Snapshottee for FileSnapshottee {
    async fn copy(&self, sink: &mut Sink<'_>) -> SnapResult<()> {
        let mut file = match tokio::fs::File::open(&self.path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(SnapError::Frontend(format!(
                    "source file {} does not exist",
                    self.path.display()
                )));
            }
            Err(e) => return Err(e.into()),
        };
        tokio::io::copy(&mut file, &mut *sink).await?;
        sink.flush().await?;
        Ok(())
    }
}
