//! snapkeep-scheduler: periodic snapshots with a retention window.
//!
//! A [`Snapshotter`] owns one logical name. It runs two background tasks
//! until closed: a capture loop that writes a new snapshot every interval
//! and a purge loop that deletes snapshots older than the retention window.
//!
//! # Architecture
//!
//! ```text
//! Snapshotter::new ──┬── capture loop: sleep(interval) → lock → capture
//!                    └── purge loop:   purge_expired → sleep(60s)
//!
//! capture:  frontend.copy ──► backend "{name}.{ts}.{ext}"
//!                             backend "{name}.latest.txt" ← key
//! purge:    PageIterator("{name}.") → decode → delete if ts < now - retention
//! ```

pub mod capture;
pub mod retention;
pub mod snapshotter;
pub mod stats;

pub use capture::{capture, read_latest};
pub use retention::{PurgeReport, purge_expired};
pub use snapshotter::{PURGE_INTERVAL, Snapshotter};
pub use stats::SnapshotterStats;
