//! `snapkeepd run`: the long-running scheduler.

use tracing::{error, info};

use snapkeep_scheduler::Snapshotter;

use crate::config::DaemonConfig;

/// Start the snapshotter and keep it running until Ctrl-C, then close it
/// with one final snapshot.
pub async fn run(config: DaemonConfig) -> anyhow::Result<()> {
    let backend = config.backend.build()?;
    let frontend = config.frontend.build();
    let snapshotter = Snapshotter::new(frontend, backend, config.snapshot)?;

    info!(name = %snapshotter.config().name, "snapkeepd running, press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    match snapshotter.close().await {
        Ok(key) => info!(%key, "final snapshot written"),
        Err(e) => error!(error = %e, "final snapshot failed"),
    }

    let stats = snapshotter.stats();
    info!(
        captures_ok = stats.captures_ok,
        captures_failed = stats.captures_failed,
        purge_passes = stats.purge_passes,
        purge_failures = stats.purge_failures,
        keys_purged = stats.keys_purged,
        "snapkeepd stopped"
    );
    Ok(())
}
