//! Orphan file detection logic.
//!
//! ## Detection Algorithm
//!
//! 1. **Bounded listing**: list the top of the location on the caller's task
//! 2. **Distributed listing**: resolve deferred subtrees on worker tasks
//! 3. **Reconcile**: files not matched by any live path AND older than the cutoff

use common::config::OrphanCleanupConfig;
use crate::orphan::error::OrphanResult;
use crate::orphan::io::DirectoryLister;
use crate::orphan::matcher::{LiveFileSet, reconcile};
use crate::orphan::traversal::{ActualFile, TraversalBudget, older_than, walk, walk_distributed};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

/// Orphan candidate with metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrphanCandidate {
    /// Full path to the orphan file.
    pub path: String,
    /// File size in bytes.
    pub size_bytes: u64,
    /// Last modification timestamp.
    pub last_modified: DateTime<Utc>,
}

/// Orphan file detector.
pub struct OrphanDetector {
    config: OrphanCleanupConfig,
    lister: Arc<dyn DirectoryLister>,
}

impl OrphanDetector {
    pub fn new(config: OrphanCleanupConfig, lister: Arc<dyn DirectoryLister>) -> Self {
        Self { config, lister }
    }

    /// List every non-hidden file under `location` strictly older than `cutoff`.
    ///
    /// # Errors
    ///
    /// Fails without a partial result if any directory cannot be listed or a
    /// worker hits the listing depth cap.
    pub async fn list_actual_files(
        &self,
        location: &str,
        cutoff: DateTime<Utc>,
    ) -> OrphanResult<Vec<ActualFile>> {
        let budget = TraversalBudget::from(&self.config);
        let bounded = walk(
            self.lister.as_ref(),
            [location.to_string()],
            budget,
            older_than(cutoff),
        )
        .await?;

        tracing::info!(
            location = %location,
            directories_listed = bounded.directories_listed,
            matching_files = bounded.matching_files.len(),
            pending_subtrees = bounded.pending_subtrees.len(),
            max_depth = budget.max_depth,
            max_direct_subdirs = budget.max_direct_subdirs,
            "Finished bounded listing"
        );

        let mut files = bounded.matching_files;
        if !bounded.pending_subtrees.is_empty() {
            let leaf_files = walk_distributed(
                self.lister.clone(),
                bounded.pending_subtrees,
                cutoff,
                self.config.parallelism,
            )
            .await?;

            tracing::info!(
                location = %location,
                matching_files = leaf_files.len(),
                "Finished distributed listing"
            );
            files.extend(leaf_files);
        }

        Ok(files)
    }

    /// Identify orphan candidates under `location`.
    pub async fn identify_orphan_candidates(
        &self,
        location: &str,
        cutoff: DateTime<Utc>,
        live_files: &LiveFileSet,
    ) -> OrphanResult<Vec<OrphanCandidate>> {
        tracing::info!(
            location = %location,
            cutoff = %cutoff,
            live_files = live_files.len(),
            "Starting orphan detection"
        );

        let actual_files = self.list_actual_files(location, cutoff).await?;
        let total_files = actual_files.len();
        let candidates = reconcile(actual_files, live_files, cutoff);

        tracing::info!(
            location = %location,
            total_files,
            orphan_candidates = candidates.len(),
            "Identified orphan candidates"
        );

        Ok(candidates)
    }
}
