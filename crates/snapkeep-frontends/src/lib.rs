//! Snapshot sources for snapkeep.
//!
//! Each type here implements [`snapkeep_core::Snapshottee`] and writes one
//! consistent copy of its data source into the sink it is handed:
//!
//! - [`FileSnapshottee`] streams a file as-is.
//! - [`CommandSnapshottee`] streams the stdout of a program, e.g. `pg_dump`.
//! - [`RedbSnapshottee`] exports a redb database from a single read
//!   transaction as JSON lines.

pub mod command;
pub mod file;
pub mod redb_store;

pub use command::{CommandSnapshottee, PostgresOptions};
pub use file::FileSnapshottee;
pub use redb_store::{ExportRecord, RedbSnapshottee};
