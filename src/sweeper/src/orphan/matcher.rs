//! Reconciliation of listed files against live paths.
//!
//! Live paths may be recorded without the scheme or authority that listed
//! paths carry (`t/data/a.parquet` vs `s3://bucket/t/data/a.parquet`), so a
//! listed path matches a live path when the file names are equal and the
//! listed path contains the live path.

use crate::orphan::detector::OrphanCandidate;
use crate::orphan::io::file_name;
use crate::orphan::traversal::ActualFile;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Whether the listed path `actual` corresponds to the live path `live`.
pub fn matches(actual: &str, live: &str) -> bool {
    file_name(actual) == file_name(live) && actual.contains(live)
}

/// Live paths indexed by file name.
#[derive(Debug, Clone, Default)]
pub struct LiveFileSet {
    by_name: HashMap<String, Vec<String>>,
    len: usize,
}

impl LiveFileSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>) {
        let path = path.into();
        let paths = self.by_name.entry(file_name(&path).to_string()).or_default();
        if !paths.contains(&path) {
            paths.push(path);
            self.len += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether any live path matches the listed path.
    pub fn contains_match(&self, actual: &str) -> bool {
        self.by_name
            .get(file_name(actual))
            .is_some_and(|candidates| candidates.iter().any(|live| matches(actual, live)))
    }
}

impl<S: Into<String>> FromIterator<S> for LiveFileSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

impl<S: Into<String>> Extend<S> for LiveFileSet {
    fn extend<I: IntoIterator<Item = S>>(&mut self, iter: I) {
        for path in iter {
            self.insert(path);
        }
    }
}

/// Listed files that no live path matches and that are strictly older than
/// `cutoff`. Both conditions are required; the age check here is final even
/// when the traversal already filtered by age.
pub fn reconcile(
    actual_files: Vec<ActualFile>,
    live_files: &LiveFileSet,
    cutoff: DateTime<Utc>,
) -> Vec<OrphanCandidate> {
    actual_files
        .into_iter()
        .filter_map(|file| {
            let last_modified = file.last_modified.filter(|ts| *ts < cutoff)?;
            if live_files.contains_match(&file.path) {
                tracing::trace!(path = %file.path, "File is referenced by a live path");
                return None;
            }
            Some(OrphanCandidate {
                path: file.path,
                size_bytes: file.size_bytes,
                last_modified,
            })
        })
        .collect()
}
