//! Snapshot key codec.
//!
//! Keys embed the logical name, a truncated unix timestamp, and a file
//! extension: `{name}.{unix_seconds}.{extension}`. Each name also owns one
//! reserved pointer key, `{name}.latest.txt`, whose payload is the literal
//! text of the most recently written snapshot key.
//!
//! No escaping is performed. Callers must keep the delimiter out of `name`
//! and `extension`; [`SnapshotConfig::validate`](crate::SnapshotConfig::validate)
//! enforces this for configured names.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{SnapError, SnapResult};

/// Separator between the three key components.
pub const DELIMITER: char = '.';

/// Middle component of the pointer key.
pub const LATEST_STAMP: &str = "latest";

/// Extension of the pointer key.
pub const LATEST_EXTENSION: &str = "txt";

/// Time unit a capture timestamp is rounded down to.
///
/// Only `Second`, `Minute`, and `Hour` pass configuration validation. The
/// calendar units are supported by [`Granularity::truncate`] but cannot be
/// scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Second,
    Minute,
    Hour,
    Day,
    Month,
    Year,
}

impl Granularity {
    /// Whether a scheduler may be configured with this granularity.
    pub fn is_schedulable(self) -> bool {
        matches!(self, Granularity::Second | Granularity::Minute | Granularity::Hour)
    }

    /// Fixed length of one bucket, for the units that have one.
    pub fn bucket(self) -> Option<Duration> {
        match self {
            Granularity::Second => Some(Duration::from_secs(1)),
            Granularity::Minute => Some(Duration::from_secs(60)),
            Granularity::Hour => Some(Duration::from_secs(3600)),
            Granularity::Day => Some(Duration::from_secs(86_400)),
            Granularity::Month | Granularity::Year => None,
        }
    }

    /// Zero every time component finer than `self`.
    ///
    /// All instants are handled in UTC. Failing to rebuild the truncated
    /// calendar value is reported as [`SnapError::Truncation`].
    pub fn truncate(self, t: DateTime<Utc>) -> SnapResult<DateTime<Utc>> {
        let date = t.date_naive();
        let truncated = match self {
            Granularity::Second => date.and_hms_opt(t.hour(), t.minute(), t.second()),
            Granularity::Minute => date.and_hms_opt(t.hour(), t.minute(), 0),
            Granularity::Hour => date.and_hms_opt(t.hour(), 0, 0),
            Granularity::Day => date.and_hms_opt(0, 0, 0),
            Granularity::Month => NaiveDate::from_ymd_opt(t.year(), t.month(), 1)
                .and_then(|d| d.and_hms_opt(0, 0, 0)),
            Granularity::Year => {
                NaiveDate::from_ymd_opt(t.year(), 1, 1).and_then(|d| d.and_hms_opt(0, 0, 0))
            }
        };

        truncated
            .map(|naive| naive.and_utc())
            .ok_or_else(|| SnapError::Truncation(format!("cannot truncate {t} to {self}")))
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Granularity::Second => "second",
            Granularity::Minute => "minute",
            Granularity::Hour => "hour",
            Granularity::Day => "day",
            Granularity::Month => "month",
            Granularity::Year => "year",
        };
        f.write_str(s)
    }
}

/// A decoded snapshot key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotKey {
    pub name: String,
    pub timestamp: i64,
    pub extension: String,
}

impl SnapshotKey {
    /// The embedded timestamp as a UTC instant.
    pub fn time(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.timestamp, 0)
    }
}

impl fmt::Display for SnapshotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&encode(&self.name, &self.extension, self.timestamp))
    }
}

/// Build the key for `(name, extension, timestamp)`.
///
/// Neither `name` nor `extension` may contain [`DELIMITER`].
pub fn encode(name: &str, extension: &str, timestamp: i64) -> String {
    debug_assert!(!name.contains(DELIMITER) && !extension.contains(DELIMITER));
    format!("{name}{DELIMITER}{timestamp}{DELIMITER}{extension}")
}

/// Parse a key produced by [`encode`].
///
/// The pointer key yields [`SnapError::IsLatestKey`]; anything that is not
/// three delimiter-separated parts with an integer timestamp yields
/// [`SnapError::InvalidKey`].
pub fn decode(key: &str) -> SnapResult<SnapshotKey> {
    let parts: Vec<&str> = key.split(DELIMITER).collect();
    let [name, stamp, extension] = parts[..] else {
        return Err(SnapError::InvalidKey(key.to_string()));
    };

    if stamp == LATEST_STAMP && extension == LATEST_EXTENSION {
        return Err(SnapError::IsLatestKey(key.to_string()));
    }

    if name.is_empty() || extension.is_empty() {
        return Err(SnapError::InvalidKey(key.to_string()));
    }

    let timestamp = stamp
        .parse::<i64>()
        .map_err(|_| SnapError::InvalidKey(key.to_string()))?;

    Ok(SnapshotKey {
        name: name.to_string(),
        timestamp,
        extension: extension.to_string(),
    })
}

/// The reserved pointer key for `name`.
pub fn latest_key(name: &str) -> String {
    format!("{name}{DELIMITER}{LATEST_STAMP}{DELIMITER}{LATEST_EXTENSION}")
}

/// Prefix shared by every key that belongs to `name`.
pub fn name_prefix(name: &str) -> String {
    format!("{name}{DELIMITER}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn encode_joins_with_delimiter() {
        assert_eq!(encode("orders", "sql", 1_700_000_000), "orders.1700000000.sql");
    }

    #[test]
    fn round_trip() {
        let cases = [
            ("test", "db", 0),
            ("test", "db", 1_700_000_000),
            ("orders_prod", "sql", 1_234_567_890),
            ("a", "b", -86_400),
        ];

        for (name, ext, ts) in cases {
            let key = encode(name, ext, ts);
            let decoded = decode(&key).unwrap();
            assert_eq!(decoded.name, name);
            assert_eq!(decoded.timestamp, ts);
            assert_eq!(decoded.extension, ext);
            assert_eq!(decoded.to_string(), key);
        }
    }

    #[test]
    fn pointer_key_is_distinguished() {
        for name in ["test", "orders", "x"] {
            let err = decode(&latest_key(name)).unwrap_err();
            assert!(matches!(err, SnapError::IsLatestKey(_)), "{name}: {err}");
        }
    }

    #[test]
    fn malformed_keys_are_invalid() {
        for key in ["", "test", "test.123", "test.123.db.gz", "test.abc.db", ".123.db", "test.123."] {
            let err = decode(key).unwrap_err();
            assert!(matches!(err, SnapError::InvalidKey(_)), "{key:?}: {err}");
        }
    }

    #[test]
    fn decoded_time_matches_timestamp() {
        let key = decode("test.1700000000.db").unwrap();
        assert_eq!(key.time().unwrap().timestamp(), 1_700_000_000);
    }

    #[test]
    fn truncate_zeroes_finer_components() {
        let t = at(2024, 7, 19, 13, 45, 27) + chrono::Duration::milliseconds(731);

        assert_eq!(Granularity::Second.truncate(t).unwrap(), at(2024, 7, 19, 13, 45, 27));
        assert_eq!(Granularity::Minute.truncate(t).unwrap(), at(2024, 7, 19, 13, 45, 0));
        assert_eq!(Granularity::Hour.truncate(t).unwrap(), at(2024, 7, 19, 13, 0, 0));
        assert_eq!(Granularity::Day.truncate(t).unwrap(), at(2024, 7, 19, 0, 0, 0));
        assert_eq!(Granularity::Month.truncate(t).unwrap(), at(2024, 7, 1, 0, 0, 0));
        assert_eq!(Granularity::Year.truncate(t).unwrap(), at(2024, 1, 1, 0, 0, 0));
    }

    #[test]
    fn truncate_same_bucket_collapses() {
        let g = Granularity::Minute;
        let t1 = at(2024, 7, 19, 13, 45, 0);
        let t2 = at(2024, 7, 19, 13, 45, 59);
        assert_eq!(g.truncate(t1).unwrap(), g.truncate(t2).unwrap());

        let g = Granularity::Hour;
        let t1 = at(2024, 7, 19, 13, 0, 0);
        let t2 = at(2024, 7, 19, 13, 59, 59);
        assert_eq!(g.truncate(t1).unwrap(), g.truncate(t2).unwrap());
    }

    #[test]
    fn truncate_different_buckets_differ() {
        let base = at(2024, 12, 31, 23, 59, 58);
        for g in [Granularity::Second, Granularity::Minute, Granularity::Hour] {
            let step = chrono::Duration::from_std(g.bucket().unwrap()).unwrap();
            let t1 = base;
            let t2 = base + step;
            assert_ne!(g.truncate(t1).unwrap(), g.truncate(t2).unwrap(), "{g}");
        }
    }

    #[test]
    fn only_sub_day_units_are_schedulable() {
        assert!(Granularity::Second.is_schedulable());
        assert!(Granularity::Minute.is_schedulable());
        assert!(Granularity::Hour.is_schedulable());
        assert!(!Granularity::Day.is_schedulable());
        assert!(!Granularity::Month.is_schedulable());
        assert!(!Granularity::Year.is_schedulable());
    }
}
