//! Orphan file cleanup for table storage locations.
//!
//! Finds files under a location that no live path references and removes the
//! ones older than a cutoff. Files are never deleted unless the listing of the
//! location completed.
//!
//! ## Safety Principles
//!
//! 1. **Complete listings only**: any listing error, or a worker reaching the
//!    depth cap, aborts the run before deleting anything
//! 2. **Grace Period**: files modified at or after the cutoff are always kept
//! 3. **Failure isolation**: a failed deletion is reported, never retried, and
//!    never stops the others
//!
//! ## Architecture
//!
//! - `io`: listing and deletion primitives, object store backend
//! - `traversal`: bounded coordinator walk and fanned-out worker walks
//! - `matcher`: live path matching and reconciliation
//! - `detector`: listing plus reconciliation into orphan candidates
//! - `cleaner`: deletion with per-file outcomes
//! - `action`: the chaining API tying it together
//!
//! ## Usage
//!
//! ```no_run
//! use std::collections::HashMap;
//! use sweeper::orphan::{ObjectStoreIo, RemoveOrphanFiles};
//!
//! # async fn run(io: ObjectStoreIo, live_paths: Vec<String>) -> anyhow::Result<()> {
//! let result = RemoveOrphanFiles::for_object_store("s3://bucket/t", &HashMap::new(), io)?
//!     .location("s3://bucket/t/data")
//!     .execute(live_paths)
//!     .await?;
//!
//! for (path, error) in result.report.failures() {
//!     eprintln!("{path}: {error}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod action;
pub mod cleaner;
pub mod detector;
pub mod error;
pub mod io;
pub mod matcher;
pub mod traversal;

pub use action::{GC_ENABLED, RemoveOrphanFiles, RemoveOrphanFilesResult, ensure_gc_enabled};
pub use cleaner::{DeletionOutcome, DeletionReport, DeletionStatus, OrphanCleaner};
pub use common::config::OrphanCleanupConfig;
pub use detector::{OrphanCandidate, OrphanDetector};
pub use error::{OrphanError, OrphanResult};
pub use io::{DirEntry, DirectoryLister, FileDeleter, FnDeleter, ObjectStoreIo};
pub use matcher::LiveFileSet;
pub use traversal::{ActualFile, TraversalBudget};
