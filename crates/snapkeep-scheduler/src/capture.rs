//! A single capture and the latest-pointer record.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use tracing::debug;

use snapkeep_core::key;
use snapkeep_core::{Backend, SnapError, SnapResult, SnapshotConfig, Snapshottee};

/// Write one snapshot of `frontend` for the instant `now`, then point the
/// latest record at it. Returns the snapshot key.
///
/// Two captures within the same truncation bucket share a key; the later
/// one overwrites the earlier.
pub async fn capture(
    frontend: &dyn Snapshottee,
    backend: &dyn Backend,
    config: &SnapshotConfig,
    now: DateTime<Utc>,
) -> SnapResult<String> {
    let key = config.key_at(now)?;
    backend.write_to(&key, frontend).await?;

    let pointer = Bytes::from(key.clone().into_bytes());
    backend.write_to(&config.latest_key(), &pointer).await?;

    debug!(%key, "snapshot captured");
    Ok(key)
}

/// Key of the most recent snapshot for `name`, read from the pointer record.
pub async fn read_latest(backend: &dyn Backend, name: &str) -> SnapResult<String> {
    let mut buf: Vec<u8> = Vec::new();
    backend.read_from(&key::latest_key(name), &mut buf).await?;
    String::from_utf8(buf)
        .map_err(|e| SnapError::Backend(format!("latest pointer for {name} is not utf-8: {e}")))
}
