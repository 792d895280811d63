//! snapkeep-core: shared building blocks for scheduled snapshots.
//!
//! Defines the configuration, the key codec that embeds a name, a
//! truncated timestamp, and an extension into every stored object, the
//! capability traits implemented by storage backends and snapshot sources,
//! and the paginated iterator used to walk a backend's keys.
//!
//! # Architecture
//!
//! ```text
//! SnapshotConfig ──► key::encode / Granularity::truncate
//!
//! Snapshottee::copy(sink)          (frontends: files, pg_dump, redb)
//! Backend::{write_to, read_from,   (backends: filesystem, memory, object store)
//!           delete, enumerate}
//!        ▲
//!        └── PageIterator ── for_each / list / next_key
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod iter;
pub mod key;

pub use backend::{Backend, Sink, Snapshottee};
pub use config::SnapshotConfig;
pub use error::{ConfigError, SnapError, SnapResult};
pub use iter::PageIterator;
pub use key::{Granularity, SnapshotKey};
