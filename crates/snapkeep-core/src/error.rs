//! Error types shared by every snapkeep crate.

use std::time::Duration;

use thiserror::Error;

use crate::key::Granularity;

/// Result type alias for snapkeep operations.
pub type SnapResult<T> = Result<T, SnapError>;

/// Errors that can occur while capturing, listing, or purging snapshots.
#[derive(Debug, Error)]
pub enum SnapError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("key is the latest pointer: {0}")]
    IsLatestKey(String),

    #[error("snapshotter is closed")]
    Closed,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("frontend error: {0}")]
    Frontend(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("time truncation failed: {0}")]
    Truncation(String),
}

impl SnapError {
    /// True for the lifecycle error returned once a snapshotter has closed.
    pub fn is_closed(&self) -> bool {
        matches!(self, SnapError::Closed)
    }
}

/// Reasons a [`SnapshotConfig`](crate::SnapshotConfig) is rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("name cannot be empty")]
    EmptyName,

    #[error("extension cannot be empty")]
    EmptyExtension,

    #[error("name {0:?} contains the key delimiter '.'")]
    DelimiterInName(String),

    #[error("extension {0:?} contains the key delimiter '.'")]
    DelimiterInExtension(String),

    #[error("invalid interval {0:?}, must be greater than or equal to one second")]
    InvalidInterval(Duration),

    #[error("invalid truncate granularity {0}, must be second, minute, or hour")]
    InvalidTruncate(Granularity),

    #[error("retention {retention:?} is shorter than {floor:?}")]
    RetentionTooShort { retention: Duration, floor: Duration },

    #[error("parse error: {0}")]
    Parse(String),
}
