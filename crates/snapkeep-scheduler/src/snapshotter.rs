//! The snapshot engine: background capture and purge loops plus the
//! foreground operations callers use while it runs.
//!
//! Lifecycle is `Running → Closed`. Every scheduled capture, manual
//! [`Snapshotter::snapshot`] and the final capture in
//! [`Snapshotter::close`] runs under one async mutex, so at most one capture
//! is in flight at any time. Purge runs concurrently with captures; the
//! retention floor enforced by config validation keeps it away from the key
//! being written.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use snapkeep_core::{Backend, Sink, SnapError, SnapResult, SnapshotConfig, Snapshottee};

use crate::capture::{capture, read_latest};
use crate::retention::{PurgeReport, purge_expired};
use crate::stats::{SnapshotterStats, StatsRecorder};

/// Pause between purge passes, independent of the capture interval.
pub const PURGE_INTERVAL: Duration = Duration::from_secs(60);

/// State shared between the handle and its background tasks.
struct Shared {
    frontend: Arc<dyn Snapshottee>,
    backend: Arc<dyn Backend>,
    config: SnapshotConfig,
    /// Serializes captures.
    capture_lock: Mutex<()>,
    closed: AtomicBool,
    stats: StatsRecorder,
}

impl Shared {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Capture under the lock unless closed by the time the lock is held.
    async fn capture_exclusive(&self) -> SnapResult<String> {
        let _guard = self.capture_lock.lock().await;
        if self.is_closed() {
            return Err(SnapError::Closed);
        }
        self.capture_now().await
    }

    /// Capture without checking lifecycle. Callers hold `capture_lock`.
    async fn capture_now(&self) -> SnapResult<String> {
        let result = with_timeout(
            self.config.timeout,
            capture(
                self.frontend.as_ref(),
                self.backend.as_ref(),
                &self.config,
                Utc::now(),
            ),
        )
        .await;
        self.stats.record_capture(&result);
        result
    }

    async fn purge_now(&self) -> SnapResult<PurgeReport> {
        let result = with_timeout(
            self.config.timeout,
            purge_expired(
                self.backend.as_ref(),
                &self.config.name,
                self.config.retention,
                Utc::now(),
            ),
        )
        .await;
        self.stats.record_purge(&result);
        result
    }
}

async fn with_timeout<T>(
    limit: Option<Duration>,
    fut: impl Future<Output = SnapResult<T>>,
) -> SnapResult<T> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| SnapError::Timeout(limit))?,
        None => fut.await,
    }
}

/// Periodically snapshots one data source into one backend and purges
/// snapshots that fall out of the retention window.
///
/// Call [`close`](Self::close) to stop it; that takes one last snapshot.
/// Dropping the handle without closing stops the background tasks without
/// a final snapshot.
pub struct Snapshotter {
    shared: Arc<Shared>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Snapshotter {
    /// Validate `config` and start the capture and purge loops.
    ///
    /// Must be called from within a Tokio runtime. The first scheduled
    /// capture happens one full interval after this returns; the first
    /// purge pass starts immediately.
    pub fn new(
        frontend: Arc<dyn Snapshottee>,
        backend: Arc<dyn Backend>,
        config: SnapshotConfig,
    ) -> SnapResult<Self> {
        config.validate()?;

        let shared = Arc::new(Shared {
            frontend,
            backend,
            config,
            capture_lock: Mutex::new(()),
            closed: AtomicBool::new(false),
            stats: StatsRecorder::default(),
        });

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let capture_task = tokio::spawn(run_capture_loop(Arc::clone(&shared), shutdown_rx.clone()));
        let purge_task = tokio::spawn(run_purge_loop(Arc::clone(&shared), shutdown_rx));

        let config = &shared.config;
        info!(
            name = %config.name,
            interval = ?config.interval,
            truncate = %config.truncate,
            retention = ?config.retention,
            "snapshotter started"
        );

        Ok(Self {
            shared,
            shutdown_tx,
            tasks: Mutex::new(vec![capture_task, purge_task]),
        })
    }

    pub fn config(&self) -> &SnapshotConfig {
        &self.shared.config
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Counters for captures and purge passes so far. Available after close.
    pub fn stats(&self) -> SnapshotterStats {
        self.shared.stats.snapshot()
    }

    fn ensure_open(&self) -> SnapResult<()> {
        if self.shared.is_closed() {
            return Err(SnapError::Closed);
        }
        Ok(())
    }

    /// Take a snapshot now, outside the schedule. Returns the written key.
    pub async fn snapshot(&self) -> SnapResult<String> {
        self.ensure_open()?;
        self.shared.capture_exclusive().await
    }

    /// Stream the snapshot stored at `key` into `sink`.
    pub async fn load(&self, key: &str, sink: &mut Sink<'_>) -> SnapResult<()> {
        self.ensure_open()?;
        self.shared.backend.read_from(key, sink).await
    }

    /// Key of the most recent snapshot.
    pub async fn latest_key(&self) -> SnapResult<String> {
        self.ensure_open()?;
        read_latest(self.shared.backend.as_ref(), &self.shared.config.name).await
    }

    /// Stop the background loops and take one final snapshot.
    ///
    /// Only the first call does anything; later and concurrent calls return
    /// [`SnapError::Closed`]. Waits for both loops to exit before returning.
    pub async fn close(&self) -> SnapResult<String> {
        if self
            .shared
            .closed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SnapError::Closed);
        }
        let _ = self.shutdown_tx.send(true);

        let result = {
            let _guard = self.shared.capture_lock.lock().await;
            self.shared.capture_now().await
        };

        let tasks = std::mem::take(&mut *self.tasks.lock().await);
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "snapshotter task ended abnormally");
            }
        }

        match &result {
            Ok(key) => info!(name = %self.shared.config.name, %key, "snapshotter closed"),
            Err(e) => error!(
                name = %self.shared.config.name,
                error = %e,
                "final snapshot failed while closing"
            ),
        }
        result
    }
}

impl Drop for Snapshotter {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

/// Sleep one interval, then capture. Repeats until shutdown.
async fn run_capture_loop(shared: Arc<Shared>, mut shutdown: watch::Receiver<bool>) {
    let interval = shared.config.interval;
    debug!(name = %shared.config.name, "capture loop starting");

    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.changed() => break,
        }

        match shared.capture_exclusive().await {
            Ok(key) => debug!(%key, "scheduled snapshot written"),
            Err(SnapError::Closed) => break,
            Err(e) => error!(name = %shared.config.name, error = %e, "scheduled snapshot failed"),
        }
    }

    debug!(name = %shared.config.name, "capture loop stopped");
}

/// Purge, then sleep [`PURGE_INTERVAL`]. An in-flight pass is abandoned on
/// shutdown; the next run of any snapshotter redoes it.
async fn run_purge_loop(shared: Arc<Shared>, mut shutdown: watch::Receiver<bool>) {
    debug!(name = %shared.config.name, "purge loop starting");

    loop {
        if shared.is_closed() {
            break;
        }

        tokio::select! {
            result = shared.purge_now() => match result {
                Ok(report) if report.deleted > 0 => info!(
                    name = %shared.config.name,
                    deleted = report.deleted,
                    kept = report.kept,
                    "expired snapshots purged"
                ),
                Ok(_) => {}
                Err(e) => warn!(name = %shared.config.name, error = %e, "purge pass failed"),
            },
            _ = shutdown.changed() => break,
        }

        tokio::select! {
            _ = tokio::time::sleep(PURGE_INTERVAL) => {}
            _ = shutdown.changed() => break,
        }
    }

    debug!(name = %shared.config.name, "purge loop stopped");
}
