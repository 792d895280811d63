//! Daemon configuration file.
//!
//! ```toml
//! [snapshot]
//! name = "orders"
//! extension = "sql"
//! interval = "15m"
//! truncate = "hour"
//! retention = "7days"
//!
//! [backend]
//! kind = "s3"
//! bucket = "backups"
//! region = "eu-west-1"
//!
//! [frontend]
//! kind = "postgres"
//! user = "app"
//! database = "orders"
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use serde::Deserialize;

use snapkeep_backends::{FileBackend, ObjectStoreBackend, S3Options};
use snapkeep_core::{Backend, SnapshotConfig, Snapshottee};
use snapkeep_frontends::{CommandSnapshottee, FileSnapshottee, PostgresOptions};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DaemonConfig {
    pub snapshot: SnapshotConfig,
    pub backend: BackendConfig,
    pub frontend: FrontendConfig,
}

/// Where snapshots are stored.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendConfig {
    /// Plain files in a directory.
    File { dir: PathBuf },
    /// An S3 or S3-compatible bucket.
    S3(S3Options),
    /// A local directory accessed through the object store layer.
    ObjectLocal { dir: PathBuf },
}

/// What is being snapshotted.
#[derive(Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FrontendConfig {
    File {
        path: PathBuf,
    },
    Command {
        program: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: BTreeMap<String, String>,
        #[serde(default)]
        dir: Option<PathBuf>,
    },
    Postgres(PostgresOptions),
}

/// Command environment values are shown by name only.
impl fmt::Debug for FrontendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrontendConfig::File { path } => f.debug_struct("File").field("path", path).finish(),
            FrontendConfig::Command {
                program,
                args,
                env,
                dir,
            } => f
                .debug_struct("Command")
                .field("program", program)
                .field("args", args)
                .field("env", &env.keys().collect::<Vec<_>>())
                .field("dir", dir)
                .finish(),
            FrontendConfig::Postgres(options) => f.debug_tuple("Postgres").field(options).finish(),
        }
    }
}

impl DaemonConfig {
    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        let config: DaemonConfig = toml::from_str(s)?;
        config
            .snapshot
            .validate()
            .context("invalid [snapshot] section")?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("failed to load {}", path.display()))
    }
}

impl BackendConfig {
    pub fn build(&self) -> anyhow::Result<Arc<dyn Backend>> {
        let backend: Arc<dyn Backend> = match self {
            BackendConfig::File { dir } => Arc::new(FileBackend::new(dir)),
            BackendConfig::S3(options) => Arc::new(ObjectStoreBackend::s3(options)?),
            BackendConfig::ObjectLocal { dir } => Arc::new(ObjectStoreBackend::local(dir)?),
        };
        Ok(backend)
    }
}

impl FrontendConfig {
    pub fn build(&self) -> Arc<dyn Snapshottee> {
        match self {
            FrontendConfig::File { path } => Arc::new(FileSnapshottee::new(path)),
            FrontendConfig::Command {
                program,
                args,
                env,
                dir,
            } => {
                let mut cmd = CommandSnapshottee::new(program).args(args.iter().cloned());
                for (key, value) in env {
                    cmd = cmd.env(key, value);
                }
                if let Some(dir) = dir {
                    cmd = cmd.current_dir(dir);
                }
                Arc::new(cmd)
            }
            FrontendConfig::Postgres(options) => Arc::new(CommandSnapshottee::pg_dump(options)),
        }
    }
}
