//! One-shot commands against the configured backend.

use std::path::Path;

use chrono::Utc;
use tokio::io::AsyncWriteExt;
use tracing::info;

use snapkeep_core::{iter, key};
use snapkeep_scheduler::{capture, purge_expired, read_latest};

use crate::config::DaemonConfig;

/// Take one snapshot now and print its key.
pub async fn snapshot(config: &DaemonConfig) -> anyhow::Result<()> {
    let backend = config.backend.build()?;
    let frontend = config.frontend.build();
    let key = capture(
        frontend.as_ref(),
        backend.as_ref(),
        &config.snapshot,
        Utc::now(),
    )
    .await?;
    println!("{key}");
    Ok(())
}

/// Run one retention pass and print the report as JSON.
pub async fn purge(config: &DaemonConfig) -> anyhow::Result<()> {
    let backend = config.backend.build()?;
    let report = purge_expired(
        backend.as_ref(),
        &config.snapshot.name,
        config.snapshot.retention,
        Utc::now(),
    )
    .await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Print stored keys for the configured name, oldest first.
pub async fn list(config: &DaemonConfig, max: Option<usize>) -> anyhow::Result<()> {
    let backend = config.backend.build()?;
    let prefix = key::name_prefix(&config.snapshot.name);
    for k in iter::list(backend.as_ref(), &prefix, "", max).await? {
        println!("{k}");
    }
    Ok(())
}

pub async fn latest(config: &DaemonConfig) -> anyhow::Result<()> {
    let backend = config.backend.build()?;
    println!("{}", read_latest(backend.as_ref(), &config.snapshot.name).await?);
    Ok(())
}

/// Copy a stored snapshot to `out`, or stdout when no path is given.
pub async fn restore(config: &DaemonConfig, key: &str, out: Option<&Path>) -> anyhow::Result<()> {
    let backend = config.backend.build()?;
    match out {
        Some(path) => {
            let mut file = tokio::fs::File::create(path).await?;
            if let Err(e) = backend.read_from(key, &mut file).await {
                drop(file);
                let _ = tokio::fs::remove_file(path).await;
                return Err(e.into());
            }
            file.sync_all().await?;
            info!(%key, path = %path.display(), "snapshot restored");
        }
        None => {
            let mut stdout = tokio::io::stdout();
            backend.read_from(key, &mut stdout).await?;
            stdout.flush().await?;
        }
    }
    Ok(())
}
