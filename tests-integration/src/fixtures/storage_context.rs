//! Storage test context for integration testing
//!
//! Provides a local filesystem context, where file modification times can be
//! moved into the past, and an in-memory context for fast tests.

use anyhow::{Context, Result};
use futures::StreamExt;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use sweeper::orphan::ObjectStoreIo;
use tempfile::TempDir;

/// Test context for object storage operations
pub struct StorageTestContext {
    pub object_store: Arc<dyn ObjectStore>,
    pub root_url: String,
    mode: StorageMode,
}

enum StorageMode {
    InMemory,
    LocalFs(TempDir),
}

impl StorageTestContext {
    /// In-memory storage; every object is as new as its `put`.
    pub fn new_in_memory() -> Self {
        Self {
            object_store: Arc::new(InMemory::new()),
            root_url: "memory://".to_string(),
            mode: StorageMode::InMemory,
        }
    }

    /// Local filesystem storage rooted in a fresh temporary directory.
    pub fn new_local() -> Result<Self> {
        let dir = TempDir::new().context("Failed to create temp dir")?;
        let storage =
            common::storage::open_storage_from_dsn(&format!("file://{}", dir.path().display()))?;

        Ok(Self {
            object_store: storage.store,
            root_url: storage.root_url,
            mode: StorageMode::LocalFs(dir),
        })
    }

    pub fn io(&self) -> ObjectStoreIo {
        ObjectStoreIo::new(self.object_store.clone(), self.root_url.clone())
    }

    /// Qualified location of a store-relative path.
    pub fn location(&self, relative: &str) -> String {
        self.io().qualify(&ObjectPath::from(relative))
    }

    /// Write a small file that was last modified `age` ago.
    ///
    /// Only the local filesystem can backdate files; in memory the age must be zero.
    pub async fn put_with_age(&self, relative: &str, age: Duration) -> Result<()> {
        match &self.mode {
            StorageMode::InMemory => {
                anyhow::ensure!(age.is_zero(), "in-memory storage cannot backdate {relative}");
                self.object_store
                    .put(&ObjectPath::from(relative), PutPayload::from_static(b"orphan"))
                    .await
                    .with_context(|| format!("Failed to put {relative}"))?;
            }
            StorageMode::LocalFs(dir) => {
                let path = dir.path().join(relative);
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(&path, b"orphan")?;
                let file = std::fs::File::options().write(true).open(&path)?;
                file.set_modified(SystemTime::now() - age)
                    .with_context(|| format!("Failed to backdate {relative}"))?;
            }
        }
        Ok(())
    }

    pub async fn put(&self, relative: &str) -> Result<()> {
        self.put_with_age(relative, Duration::ZERO).await
    }

    pub async fn exists(&self, relative: &str) -> bool {
        match &self.mode {
            StorageMode::InMemory => self
                .object_store
                .head(&ObjectPath::from(relative))
                .await
                .is_ok(),
            StorageMode::LocalFs(dir) => dir.path().join(relative).exists(),
        }
    }

    /// Lists all objects in storage (for verification)
    pub async fn list_all_objects(&self) -> Result<Vec<String>> {
        let mut paths = Vec::new();
        let mut stream = self.object_store.list(None);
        while let Some(meta_result) = stream.next().await {
            paths.push(meta_result?.location.to_string());
        }
        paths.sort();
        Ok(paths)
    }
}
