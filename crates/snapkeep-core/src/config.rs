//! Snapshot schedule configuration.
//!
//! A `SnapshotConfig` names the logical resource being backed up and sets
//! the capture cadence, key truncation, and retention window. It is built
//! once, validated, and never mutated afterwards.
//!
//! In TOML, durations are human-readable strings:
//!
//! ```toml
//! name = "orders"
//! extension = "sql"
//! interval = "15m"
//! truncate = "hour"
//! retention = "7days"
//! timeout = "10m"
//! ```

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{ConfigError, SnapResult};
use crate::key::{self, DELIMITER, Granularity};

/// Smallest accepted capture interval.
pub const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Default capture interval.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

/// Default retention window (7 days).
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(7 * 24 * 3600);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotConfig {
    /// Logical name; first component of every key.
    pub name: String,
    /// File extension; last component of every key.
    pub extension: String,
    /// Time between scheduled captures.
    #[serde(with = "human_duration")]
    pub interval: Duration,
    /// Granularity capture timestamps are truncated to.
    pub truncate: Granularity,
    /// Snapshots older than this are purged.
    #[serde(with = "human_duration")]
    pub retention: Duration,
    /// Optional deadline for a single capture or purge pass.
    #[serde(default, with = "human_duration_opt", skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
}

impl SnapshotConfig {
    /// Default configuration for `name` and `extension`: one capture per
    /// minute, hourly keys, seven days of retention.
    pub fn new(name: impl Into<String>, extension: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            extension: extension.into(),
            interval: DEFAULT_INTERVAL,
            truncate: Granularity::Hour,
            retention: DEFAULT_RETENTION,
            timeout: None,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_truncate(mut self, truncate: Granularity) -> Self {
        self.truncate = truncate;
        self
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Parse a configuration from a TOML document. The result is validated.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: SnapshotConfig =
            toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML configuration file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Parse(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    /// Check every invariant, returning the first violation.
    ///
    /// Retention must cover at least one interval and one truncation bucket,
    /// otherwise purge could remove a key that capture is still writing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::EmptyName);
        }
        if self.name.contains(DELIMITER) {
            return Err(ConfigError::DelimiterInName(self.name.clone()));
        }
        if self.extension.is_empty() {
            return Err(ConfigError::EmptyExtension);
        }
        if self.extension.contains(DELIMITER) {
            return Err(ConfigError::DelimiterInExtension(self.extension.clone()));
        }
        if self.interval < MIN_INTERVAL {
            return Err(ConfigError::InvalidInterval(self.interval));
        }
        if !self.truncate.is_schedulable() {
            return Err(ConfigError::InvalidTruncate(self.truncate));
        }

        let bucket = self.truncate.bucket().unwrap_or_default();
        let floor = self.interval.max(bucket);
        if self.retention < floor {
            return Err(ConfigError::RetentionTooShort {
                retention: self.retention,
                floor,
            });
        }

        Ok(())
    }

    /// Key for a capture taken at `now`.
    pub fn key_at(&self, now: DateTime<Utc>) -> SnapResult<String> {
        let truncated = self.truncate.truncate(now)?;
        Ok(key::encode(&self.name, &self.extension, truncated.timestamp()))
    }

    /// Pointer key for this configuration's name.
    pub fn latest_key(&self) -> String {
        key::latest_key(&self.name)
    }
}

/// `Duration` as a humantime string (`"90s"`, `"1h 30m"`).
pub mod human_duration {
    use super::*;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&humantime::format_duration(*d).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(d)?;
        humantime::parse_duration(raw.trim()).map_err(serde::de::Error::custom)
    }
}

/// `Option<Duration>` as an optional humantime string.
pub mod human_duration_opt {
    use super::*;

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => human_duration::serialize(d, s),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let raw = Option::<String>::deserialize(d)?;
        raw.map(|r| humantime::parse_duration(r.trim()).map_err(serde::de::Error::custom))
            .transpose()
    }
}
