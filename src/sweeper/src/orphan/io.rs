//! Storage primitives consumed by the orphan cleanup pipeline.
//!
//! The pipeline only needs to list one directory level at a time and to delete
//! a single file by path. [`ObjectStoreIo`] provides both on top of any
//! `object_store` backend; tests and embedders can plug in their own.

use crate::orphan::error::{OrphanError, OrphanResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::storage::StorageRoot;
use object_store::ObjectStore;
use object_store::path::Path as ObjectPath;
use std::fmt;
use std::sync::Arc;

/// One child of a listed directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Fully qualified path of the child.
    pub path: String,
    pub is_directory: bool,
    /// Object stores report no modification time for directory prefixes.
    pub last_modified: Option<DateTime<Utc>>,
    pub size_bytes: u64,
}

impl DirEntry {
    pub fn file(path: impl Into<String>, last_modified: DateTime<Utc>, size_bytes: u64) -> Self {
        Self {
            path: path.into(),
            is_directory: false,
            last_modified: Some(last_modified),
            size_bytes,
        }
    }

    pub fn directory(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            is_directory: true,
            last_modified: None,
            size_bytes: 0,
        }
    }

    /// Final path component.
    pub fn name(&self) -> &str {
        file_name(&self.path)
    }
}

/// Text after the last `/`, or the whole path when there is none.
pub fn file_name(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(idx) => &trimmed[idx + 1..],
        None => trimmed,
    }
}

/// Hidden entries (`.staging`, `_temporary`, ...) are never listed or deleted.
pub fn is_hidden(name: &str) -> bool {
    name.starts_with('.') || name.starts_with('_')
}

/// Lists the immediate children of a directory.
#[async_trait]
pub trait DirectoryLister: fmt::Debug + Send + Sync + 'static {
    async fn list_directory(&self, path: &str) -> OrphanResult<Vec<DirEntry>>;
}

/// Deletes a single file.
#[async_trait]
pub trait FileDeleter: fmt::Debug + Send + Sync + 'static {
    async fn delete_file(&self, path: &str) -> anyhow::Result<()>;
}

/// Listing and deletion backed by an object store.
///
/// Listed paths are qualified with the store's root URL so they can be
/// compared against live paths recorded with a scheme. Paths handed back for
/// listing or deletion may be qualified or store-relative.
#[derive(Debug, Clone)]
pub struct ObjectStoreIo {
    store: Arc<dyn ObjectStore>,
    root_url: String,
}

impl ObjectStoreIo {
    pub fn new(store: Arc<dyn ObjectStore>, root_url: impl Into<String>) -> Self {
        Self {
            store,
            root_url: root_url.into(),
        }
    }

    pub fn root_url(&self) -> &str {
        &self.root_url
    }

    /// Turn a store-relative object path into a qualified location.
    pub fn qualify(&self, path: &ObjectPath) -> String {
        if self.root_url.is_empty() {
            path.to_string()
        } else if self.root_url.ends_with('/') {
            format!("{}{}", self.root_url, path)
        } else {
            format!("{}/{}", self.root_url, path)
        }
    }

    /// Inverse of [`ObjectStoreIo::qualify`]; unqualified input is taken as store-relative.
    ///
    /// Listed paths are already percent-encoded and are parsed as-is. A
    /// qualified location must sit under the root URL at a `/` boundary.
    pub fn resolve(&self, location: &str) -> OrphanResult<ObjectPath> {
        let relative = self.strip_root(location)?;
        ObjectPath::parse(relative).map_err(|e| OrphanError::InvalidPath {
            path: location.to_string(),
            source: e.into(),
        })
    }

    fn strip_root<'a>(&self, location: &'a str) -> OrphanResult<&'a str> {
        let root = self.root_url.as_str();
        if root.is_empty() {
            return Ok(location);
        }

        match location.strip_prefix(root) {
            Some(rest) if root.ends_with('/') || rest.is_empty() || rest.starts_with('/') => Ok(rest),
            None if !location.contains("://") => Ok(location),
            _ => Err(OrphanError::OutsideStorageRoot {
                path: location.to_string(),
                root: self.root_url.clone(),
            }),
        }
    }
}

impl From<StorageRoot> for ObjectStoreIo {
    fn from(root: StorageRoot) -> Self {
        Self::new(root.store, root.root_url)
    }
}

#[async_trait]
impl DirectoryLister for ObjectStoreIo {
    async fn list_directory(&self, path: &str) -> OrphanResult<Vec<DirEntry>> {
        let prefix = self.resolve(path)?;
        let prefix = (!prefix.as_ref().is_empty()).then_some(prefix);

        let listing = self
            .store
            .list_with_delimiter(prefix.as_ref())
            .await
            .map_err(|e| OrphanError::listing(path, e))?;

        let directories = listing
            .common_prefixes
            .iter()
            .map(|dir| DirEntry::directory(self.qualify(dir)));

        let files = listing.objects.iter().map(|meta| {
            DirEntry::file(self.qualify(&meta.location), meta.last_modified, meta.size)
        });

        Ok(directories.chain(files).collect())
    }
}

#[async_trait]
impl FileDeleter for ObjectStoreIo {
    async fn delete_file(&self, path: &str) -> anyhow::Result<()> {
        self.store.delete(&self.resolve(path)?).await?;
        Ok(())
    }
}

/// Adapts a plain closure into a [`FileDeleter`].
pub struct FnDeleter<F> {
    func: F,
}

impl<F> FnDeleter<F>
where
    F: Fn(&str) -> anyhow::Result<()> + Send + Sync + 'static,
{
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F> fmt::Debug for FnDeleter<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnDeleter").finish_non_exhaustive()
    }
}

#[async_trait]
impl<F> FileDeleter for FnDeleter<F>
where
    F: Fn(&str) -> anyhow::Result<()> + Send + Sync + 'static,
{
    async fn delete_file(&self, path: &str) -> anyhow::Result<()> {
        (self.func)(path)
    }
}
