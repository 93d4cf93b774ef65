//! Test doubles for the orphan cleanup pipeline.
//!
//! Available in unit tests and, for other crates, with the `testing` feature:
//!
//! ```toml
//! [dev-dependencies]
//! sweeper = { path = "../src/sweeper", features = ["testing"] }
//! ```

use crate::orphan::error::{OrphanError, OrphanResult};
use crate::orphan::io::{DirEntry, DirectoryLister, FileDeleter};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

/// A directory tree held in memory with controllable modification times.
///
/// Parent directories are created implicitly up to the root. Every listing is
/// recorded so tests can assert which directories were visited.
#[derive(Debug)]
pub struct InMemoryTree {
    root: String,
    children: BTreeMap<String, Vec<DirEntry>>,
    failing: HashSet<String>,
    listed: Mutex<Vec<String>>,
}

impl InMemoryTree {
    pub fn new(root: impl Into<String>) -> Self {
        let root = root.into().trim_end_matches('/').to_string();
        let mut children = BTreeMap::new();
        children.insert(root.clone(), Vec::new());
        Self {
            root,
            children,
            failing: HashSet::new(),
            listed: Mutex::new(Vec::new()),
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn add_file(&mut self, path: &str, last_modified: DateTime<Utc>) -> &mut Self {
        self.add_file_with_size(path, last_modified, 0)
    }

    pub fn add_file_with_size(
        &mut self,
        path: &str,
        last_modified: DateTime<Utc>,
        size_bytes: u64,
    ) -> &mut Self {
        self.insert(DirEntry::file(path, last_modified, size_bytes));
        self
    }

    /// A file whose modification time the store cannot report.
    pub fn add_file_without_mtime(&mut self, path: &str) -> &mut Self {
        self.insert(DirEntry {
            path: path.to_string(),
            is_directory: false,
            last_modified: None,
            size_bytes: 0,
        });
        self
    }

    pub fn add_dir(&mut self, path: &str) -> &mut Self {
        let path = path.trim_end_matches('/');
        if !self.children.contains_key(path) {
            self.children.insert(path.to_string(), Vec::new());
            self.insert(DirEntry::directory(path));
        }
        self
    }

    /// Listing this directory returns an I/O error.
    pub fn fail_listing(&mut self, path: &str) -> &mut Self {
        self.failing.insert(path.to_string());
        self
    }

    /// Every directory listed so far, in call order.
    pub fn listed(&self) -> Vec<String> {
        self.listed
            .lock()
            .map(|listed| listed.clone())
            .unwrap_or_default()
    }

    fn insert(&mut self, entry: DirEntry) {
        let parent = match entry.path.rsplit_once('/') {
            Some((parent, _)) if parent.len() >= self.root.len() => parent.to_string(),
            _ => panic!("{} is not below {}", entry.path, self.root),
        };
        self.add_dir(&parent);
        if let Some(siblings) = self.children.get_mut(&parent) {
            if !siblings.iter().any(|e| e.path == entry.path) {
                siblings.push(entry);
            }
        }
    }
}

#[async_trait]
impl DirectoryLister for InMemoryTree {
    async fn list_directory(&self, path: &str) -> OrphanResult<Vec<DirEntry>> {
        if let Ok(mut listed) = self.listed.lock() {
            listed.push(path.to_string());
        }

        if self.failing.contains(path) {
            return Err(OrphanError::listing(
                path,
                std::io::Error::other("simulated listing failure"),
            ));
        }

        Ok(self.children.get(path).cloned().unwrap_or_default())
    }
}

/// Records every deletion request; configured paths fail.
#[derive(Debug, Default)]
pub struct RecordingDeleter {
    failing: HashSet<String>,
    calls: Mutex<Vec<String>>,
}

impl RecordingDeleter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            failing: paths.into_iter().map(Into::into).collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Paths passed to `delete_file`, in call order, including failed ones.
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl FileDeleter for RecordingDeleter {
    async fn delete_file(&self, path: &str) -> anyhow::Result<()> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(path.to_string());
        }

        if self.failing.contains(path) {
            anyhow::bail!("permission denied: {path}");
        }
        Ok(())
    }
}
