//! Fatal errors of the orphan cleanup pipeline.
//!
//! Per-file deletion failures are not errors at this level; they are recorded
//! in the [`DeletionReport`](crate::orphan::DeletionReport).

use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum OrphanError {
    /// A directory could not be listed. The file set would be incomplete, so
    /// nothing may be deleted.
    #[error("Failed to list directory {path}: {source}")]
    Listing {
        path: String,
        #[source]
        source: BoxError,
    },

    /// A worker walk still had directories left at the safety depth cap,
    /// which points at an extremely deep tree or a listing cycle.
    #[error("Could not list subdirectories, reached maximum subdirectory depth: {max_depth}")]
    TraversalDepthExceeded { max_depth: usize },

    /// A location names a different store than the one being cleaned.
    #[error("Location {path} is outside the storage root {root}")]
    OutsideStorageRoot { path: String, root: String },

    /// A location is not a valid object store path.
    #[error("Invalid storage path {path}: {source}")]
    InvalidPath {
        path: String,
        #[source]
        source: BoxError,
    },

    /// Cleanup is not allowed for this location.
    #[error("Cannot remove orphan files: {0}")]
    Precondition(String),

    /// A traversal worker panicked or was cancelled.
    #[error("Listing worker failed: {0}")]
    Worker(String),

    #[error("Invalid orphan cleanup configuration: {0}")]
    InvalidConfig(String),
}

impl OrphanError {
    pub fn listing(path: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Listing {
            path: path.into(),
            source: source.into(),
        }
    }
}

pub type OrphanResult<T> = Result<T, OrphanError>;
