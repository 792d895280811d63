//! Storage backends for snapkeep.
//!
//! | Backend                | Storage                                  |
//! |------------------------|------------------------------------------|
//! | [`FileBackend`]        | files in a local directory               |
//! | [`MemoryBackend`]      | in-process ordered map                   |
//! | [`ObjectStoreBackend`] | S3, local object store, or in-memory     |
//!
//! All of them implement [`snapkeep_core::Backend`]; none of them leave a
//! listable object behind when the producer fails mid-write.

pub mod file;
pub mod memory;
pub mod object;

pub use file::FileBackend;
pub use memory::MemoryBackend;
pub use object::{ObjectStoreBackend, S3Options};
