//! Runtime counters for a snapshotter.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use snapkeep_core::SnapResult;

use crate::retention::PurgeReport;

/// Point-in-time copy of a snapshotter's counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SnapshotterStats {
    pub captures_ok: u64,
    pub captures_failed: u64,
    pub purge_passes: u64,
    pub purge_failures: u64,
    pub keys_purged: u64,
    /// Key written by the most recent successful capture.
    pub last_key: Option<String>,
}

#[derive(Debug, Default)]
pub(crate) struct StatsRecorder {
    captures_ok: AtomicU64,
    captures_failed: AtomicU64,
    purge_passes: AtomicU64,
    purge_failures: AtomicU64,
    keys_purged: AtomicU64,
    last_key: Mutex<Option<String>>,
}

impl StatsRecorder {
    pub(crate) fn record_capture(&self, result: &SnapResult<String>) {
        match result {
            Ok(key) => {
                self.captures_ok.fetch_add(1, Ordering::Relaxed);
                let mut last = self.last_key.lock().unwrap_or_else(|e| e.into_inner());
                *last = Some(key.clone());
            }
            Err(_) => {
                self.captures_failed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub(crate) fn record_purge(&self, result: &SnapResult<PurgeReport>) {
        match result {
            Ok(report) => {
                self.purge_passes.fetch_add(1, Ordering::Relaxed);
                self.keys_purged
                    .fetch_add(report.deleted as u64, Ordering::Relaxed);
            }
            Err(_) => {
                self.purge_failures.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub(crate) fn snapshot(&self) -> SnapshotterStats {
        SnapshotterStats {
            captures_ok: self.captures_ok.load(Ordering::Relaxed),
            captures_failed: self.captures_failed.load(Ordering::Relaxed),
            purge_passes: self.purge_passes.load(Ordering::Relaxed),
            purge_failures: self.purge_failures.load(Ordering::Relaxed),
            keys_purged: self.keys_purged.load(Ordering::Relaxed),
            last_key: self
                .last_key
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clone(),
        }
    }
}
