//! tablesweep core library
//!
//! Removes orphan files from the storage location of a table: files that
//! exist under the location but are referenced by no live metadata.

pub mod orphan;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use orphan::{OrphanError, RemoveOrphanFiles, RemoveOrphanFilesResult};
