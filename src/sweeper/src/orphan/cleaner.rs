//! Orphan file deletion with per-file failure isolation.
//!
//! Every candidate is handed to the deleter exactly once. A failed deletion is
//! logged and recorded in the report; it never stops the remaining deletions.

use common::config::OrphanCleanupConfig;
use crate::orphan::detector::OrphanCandidate;
use crate::orphan::io::FileDeleter;
use futures::StreamExt;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum DeletionStatus {
    Deleted,
    /// Dry-run mode; the deleter was not called.
    DryRun,
    Failed(String),
}

/// What happened to one candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeletionOutcome {
    pub path: String,
    pub size_bytes: u64,
    #[serde(flatten)]
    pub status: DeletionStatus,
}

impl DeletionOutcome {
    pub fn succeeded(&self) -> bool {
        !matches!(self.status, DeletionStatus::Failed(_))
    }

    pub fn error(&self) -> Option<&str> {
        match &self.status {
            DeletionStatus::Failed(error) => Some(error),
            _ => None,
        }
    }
}

/// Result of a deletion pass. Outcomes are in completion order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeletionReport {
    pub dry_run: bool,
    pub outcomes: Vec<DeletionOutcome>,
}

impl DeletionReport {
    /// Every path that was processed, whatever the outcome.
    pub fn attempted_paths(&self) -> Vec<String> {
        self.outcomes.iter().map(|o| o.path.clone()).collect()
    }

    /// `(path, error)` for each failed deletion.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &str)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.error().map(|error| (o.path.as_str(), error)))
    }

    pub fn attempted_count(&self) -> usize {
        self.outcomes.len()
    }

    pub fn deleted_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.status == DeletionStatus::Deleted)
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.failures().count()
    }

    /// Bytes freed, or that would be freed in dry-run mode.
    pub fn bytes_freed(&self) -> u64 {
        self.outcomes
            .iter()
            .filter(|o| o.succeeded())
            .map(|o| o.size_bytes)
            .sum()
    }
}

/// Orphan file cleaner.
pub struct OrphanCleaner {
    config: OrphanCleanupConfig,
    deleter: Arc<dyn FileDeleter>,
}

impl OrphanCleaner {
    pub fn new(config: OrphanCleanupConfig, deleter: Arc<dyn FileDeleter>) -> Self {
        Self { config, deleter }
    }

    /// Delete all candidates, `delete_concurrency` at a time.
    ///
    /// Never fails as a whole: individual failures end up in the report.
    pub async fn delete_orphans(&self, candidates: Vec<OrphanCandidate>) -> DeletionReport {
        let dry_run = self.config.dry_run;

        if candidates.is_empty() {
            tracing::info!("No orphan candidates to delete");
            return DeletionReport {
                dry_run,
                outcomes: Vec::new(),
            };
        }

        tracing::info!(
            candidates = candidates.len(),
            dry_run,
            delete_concurrency = self.config.delete_concurrency,
            "Starting deletion of orphan files"
        );

        let outcomes: Vec<DeletionOutcome> = futures::stream::iter(candidates)
            .map(|candidate| self.delete_one(candidate, dry_run))
            .buffer_unordered(self.config.delete_concurrency.max(1))
            .collect()
            .await;

        let report = DeletionReport { dry_run, outcomes };

        tracing::info!(
            attempted = report.attempted_count(),
            deleted = report.deleted_count(),
            failed = report.failed_count(),
            bytes_freed = report.bytes_freed(),
            dry_run,
            "Orphan deletion complete"
        );

        report
    }

    async fn delete_one(&self, candidate: OrphanCandidate, dry_run: bool) -> DeletionOutcome {
        let status = if dry_run {
            tracing::info!(
                path = %candidate.path,
                size_bytes = candidate.size_bytes,
                last_modified = %candidate.last_modified,
                "[DRY-RUN] Would delete orphan file"
            );
            DeletionStatus::DryRun
        } else {
            match self.deleter.delete_file(&candidate.path).await {
                Ok(()) => {
                    tracing::debug!(
                        path = %candidate.path,
                        size_bytes = candidate.size_bytes,
                        "Deleted orphan file"
                    );
                    DeletionStatus::Deleted
                }
                Err(e) => {
                    tracing::warn!(
                        path = %candidate.path,
                        error = %e,
                        "Failed to delete file"
                    );
                    DeletionStatus::Failed(format!("{e:#}"))
                }
            }
        };

        DeletionOutcome {
            path: candidate.path,
            size_bytes: candidate.size_bytes,
            status,
        }
    }
}
