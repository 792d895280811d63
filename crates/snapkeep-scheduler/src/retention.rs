//! Retention purge: delete snapshots that fell out of the window.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, trace};

use snapkeep_core::key;
use snapkeep_core::{Backend, PageIterator, SnapError, SnapResult};

/// Page size used when walking a name's keys.
pub const PURGE_PAGE_SIZE: usize = 1000;

/// Outcome of one purge pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PurgeReport {
    /// Keys visited under the name prefix, pointer included.
    pub scanned: usize,
    pub deleted: usize,
    /// Keys left in place: the pointer and everything inside the window.
    pub kept: usize,
}

/// Delete every snapshot of `name` whose timestamp is strictly older than
/// `now - retention`.
///
/// The latest pointer is never deleted. A key under the prefix that does not
/// decode aborts the pass, as does any delete failure; keys already deleted
/// stay deleted and the next pass picks up where this one stopped.
pub async fn purge_expired(
    backend: &dyn Backend,
    name: &str,
    retention: Duration,
    now: DateTime<Utc>,
) -> SnapResult<PurgeReport> {
    let retention_secs = i64::try_from(retention.as_secs()).unwrap_or(i64::MAX);
    let cutoff = now.timestamp().saturating_sub(retention_secs);

    let mut iter = PageIterator::new(backend, key::name_prefix(name), "", None)
        .with_page_size(PURGE_PAGE_SIZE);
    let mut report = PurgeReport::default();

    while let Some(candidate) = iter.next().await? {
        report.scanned += 1;

        let decoded = match key::decode(&candidate) {
            Ok(decoded) => decoded,
            Err(SnapError::IsLatestKey(_)) => {
                report.kept += 1;
                continue;
            }
            Err(e) => return Err(e),
        };

        if decoded.timestamp < cutoff {
            backend.delete(&candidate).await?;
            trace!(key = %candidate, "expired snapshot deleted");
            report.deleted += 1;
        } else {
            report.kept += 1;
        }
    }

    debug!(
        %name,
        scanned = report.scanned,
        deleted = report.deleted,
        kept = report.kept,
        "purge pass complete"
    );
    Ok(report)
}
