//! The `remove orphan files` action.
//!
//! Lists a location, compares what is there with the paths the table still
//! references, and deletes unreferenced files older than a cutoff. By default
//! the table location is cleaned and files younger than three days are kept.
//!
//! Running this with a short grace period while another writer commits to the
//! same table can delete files the writer has not referenced yet.

use crate::orphan::cleaner::{DeletionReport, OrphanCleaner};
use common::config::OrphanCleanupConfig;
use crate::orphan::detector::OrphanDetector;
use crate::orphan::error::{OrphanError, OrphanResult};
use crate::orphan::io::{DirectoryLister, FileDeleter, FnDeleter, ObjectStoreIo};
use crate::orphan::matcher::LiveFileSet;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Table property that must not be `false` for cleanup to run.
pub const GC_ENABLED: &str = "gc.enabled";
pub const GC_ENABLED_DEFAULT: bool = true;

/// Refuse to clean locations whose table disabled garbage collection; their
/// files may be shared with other tables.
pub fn ensure_gc_enabled(properties: &HashMap<String, String>) -> OrphanResult<()> {
    let enabled = properties
        .get(GC_ENABLED)
        .map(|value| value.trim().eq_ignore_ascii_case("true"))
        .unwrap_or(GC_ENABLED_DEFAULT);

    if !enabled {
        return Err(OrphanError::Precondition(
            "GC is disabled (deleting files may corrupt other tables)".to_string(),
        ));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
pub struct RemoveOrphanFilesResult {
    pub location: String,
    pub older_than: DateTime<Utc>,
    /// Orphan files that were deleted or attempted.
    pub orphan_files: Vec<String>,
    pub report: DeletionReport,
}

pub struct RemoveOrphanFiles {
    lister: Arc<dyn DirectoryLister>,
    deleter: Arc<dyn FileDeleter>,
    config: OrphanCleanupConfig,
    location: String,
    older_than: DateTime<Utc>,
}

impl RemoveOrphanFiles {
    /// # Errors
    ///
    /// [`OrphanError::Precondition`] when the table disabled `gc.enabled`.
    pub fn new(
        table_location: impl Into<String>,
        table_properties: &HashMap<String, String>,
        lister: Arc<dyn DirectoryLister>,
        deleter: Arc<dyn FileDeleter>,
    ) -> OrphanResult<Self> {
        ensure_gc_enabled(table_properties)?;

        let config = OrphanCleanupConfig {
            dry_run: false,
            ..Default::default()
        };
        let older_than = cutoff_for(&config)?;

        Ok(Self {
            lister,
            deleter,
            config,
            location: table_location.into(),
            older_than,
        })
    }

    /// List and delete through the same object store.
    pub fn for_object_store(
        table_location: impl Into<String>,
        table_properties: &HashMap<String, String>,
        io: ObjectStoreIo,
    ) -> OrphanResult<Self> {
        let io = Arc::new(io);
        Self::new(table_location, table_properties, io.clone(), io)
    }

    /// Take listing budget, parallelism, dry-run and grace period from `config`.
    /// The cutoff is recomputed as now minus the grace period.
    pub fn with_config(mut self, config: &OrphanCleanupConfig) -> OrphanResult<Self> {
        config
            .validate()
            .map_err(|e| OrphanError::InvalidConfig(e.to_string()))?;
        self.older_than = cutoff_for(config)?;
        self.config = config.clone();
        Ok(self)
    }

    /// Clean `location` instead of the table location, e.g. only its data folder.
    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    /// Only files modified strictly before `timestamp` are removed.
    pub fn older_than(mut self, timestamp: DateTime<Utc>) -> Self {
        self.older_than = timestamp;
        self
    }

    /// Delete through `func` instead of the configured deleter.
    pub fn delete_with<F>(mut self, func: F) -> Self
    where
        F: Fn(&str) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.deleter = Arc::new(FnDeleter::new(func));
        self
    }

    pub fn parallelism(mut self, parallelism: usize) -> Self {
        self.config.parallelism = parallelism.max(1);
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.config.dry_run = dry_run;
        self
    }

    /// Run the action against the given live paths.
    ///
    /// # Errors
    ///
    /// Listing failures and the worker depth cap abort the run before anything
    /// is deleted. Individual deletion failures are reported in the result.
    pub async fn execute<I, S>(&self, live_files: I) -> OrphanResult<RemoveOrphanFilesResult>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let live_files: LiveFileSet = live_files.into_iter().collect();

        tracing::info!(
            location = %self.location,
            older_than = %self.older_than,
            live_files = live_files.len(),
            dry_run = self.config.dry_run,
            "Removing orphan files"
        );

        let detector = OrphanDetector::new(self.config.clone(), self.lister.clone());
        let candidates = detector
            .identify_orphan_candidates(&self.location, self.older_than, &live_files)
            .await?;

        let cleaner = OrphanCleaner::new(self.config.clone(), self.deleter.clone());
        let report = cleaner.delete_orphans(candidates).await;

        for (path, error) in report.failures() {
            tracing::warn!(path = %path, error = %error, "Orphan file was not deleted");
        }

        Ok(RemoveOrphanFilesResult {
            location: self.location.clone(),
            older_than: self.older_than,
            orphan_files: report.attempted_paths(),
            report,
        })
    }
}

fn cutoff_for(config: &OrphanCleanupConfig) -> OrphanResult<DateTime<Utc>> {
    let out_of_range = || {
        OrphanError::InvalidConfig(format!(
            "grace period of {} hours is out of range",
            config.grace_period_hours
        ))
    };
    let grace_period =
        chrono::Duration::from_std(config.grace_period()).map_err(|_| out_of_range())?;
    Utc::now()
        .checked_sub_signed(grace_period)
        .ok_or_else(out_of_range)
}
