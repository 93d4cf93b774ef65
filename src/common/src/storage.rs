use anyhow::{Context, Result};
use object_store::{ObjectStore, aws::AmazonS3Builder, local::LocalFileSystem, memory::InMemory};
use std::sync::Arc;
use url::Url;

use crate::config::StorageConfig;

/// An object store together with the URL its root corresponds to.
///
/// Paths inside the store are relative (`t/data/a.parquet`); `root_url` is what
/// turns them back into fully qualified locations (`s3://bucket/t/data/a.parquet`).
#[derive(Clone, Debug)]
pub struct StorageRoot {
    pub store: Arc<dyn ObjectStore>,
    pub root_url: String,
}

/// Open the object store described by the storage configuration
pub fn open_storage(storage_config: &StorageConfig) -> Result<StorageRoot> {
    open_storage_from_dsn(&storage_config.dsn)
}

/// Open the object store described by a DSN and work out its root URL
pub fn open_storage_from_dsn(dsn: &str) -> Result<StorageRoot> {
    let store = create_object_store_from_dsn(dsn)?;
    let root_url = storage_root_url(dsn)?;
    Ok(StorageRoot { store, root_url })
}

/// Extract the filesystem path from a storage DSN
/// Returns the path component without the URL scheme for file:// URLs,
/// or the original DSN for other schemes
///
/// # Examples
/// ```
/// use common::storage::storage_dsn_to_path;
///
/// assert_eq!(storage_dsn_to_path("file:///.data/warehouse").unwrap(), ".data/warehouse");
/// assert_eq!(storage_dsn_to_path("file:///tmp/data").unwrap(), "/tmp/data");
/// assert_eq!(storage_dsn_to_path("memory://").unwrap(), "memory://");
/// ```
pub fn storage_dsn_to_path(dsn: &str) -> Result<String> {
    let url = parse_dsn(dsn)?;

    match url.scheme() {
        "file" => {
            let path = file_path(&url)?;
            // /.data/warehouse -> .data/warehouse, /tmp/data stays absolute
            let path = path.strip_prefix('/').filter(|p| p.starts_with('.')).unwrap_or(path);
            Ok(path.to_string())
        }
        "memory" => Ok("memory://".to_string()),
        "s3" => Ok(dsn.to_string()),
        scheme => Err(unsupported_scheme(scheme)),
    }
}

/// Qualified URL of the store root, used to prefix listed object paths
///
/// For S3 the bucket is the store root, so a DSN pointing at an S3-compatible
/// host (`s3://host:9000/bucket`) still yields `s3://bucket`.
pub fn storage_root_url(dsn: &str) -> Result<String> {
    let url = parse_dsn(dsn)?;

    match url.scheme() {
        "file" => {
            file_path(&url)?;
            Ok(dsn.trim_end_matches('/').to_string())
        }
        "memory" => Ok("memory://".to_string()),
        "s3" => Ok(format!("s3://{}", s3_bucket(&url)?)),
        scheme => Err(unsupported_scheme(scheme)),
    }
}

/// Create an object store from a DSN string
pub fn create_object_store_from_dsn(dsn: &str) -> Result<Arc<dyn ObjectStore>> {
    let url = parse_dsn(dsn)?;

    match url.scheme() {
        "file" => {
            let path = storage_dsn_to_path(dsn)?;
            std::fs::create_dir_all(&path)
                .with_context(|| format!("Failed to create local storage directory {path}"))?;
            let store = LocalFileSystem::new_with_prefix(&path)
                .with_context(|| format!("Failed to open local storage at {path}"))?;
            Ok(Arc::new(store))
        }
        "memory" => Ok(Arc::new(InMemory::new())),
        "s3" => {
            let builder = create_s3_builder_from_dsn(&url)?;
            Ok(Arc::new(builder.build()?))
        }
        scheme => Err(unsupported_scheme(scheme)),
    }
}

/// Create an S3 builder from a DSN
/// DSN format: s3://[access_key:secret_key@]host[:port]/bucket, or
/// s3://bucket.s3[.region].amazonaws.com for virtual-hosted AWS buckets
pub fn create_s3_builder_from_dsn(dsn: &Url) -> Result<AmazonS3Builder> {
    let host = dsn
        .host_str()
        .ok_or_else(|| anyhow::anyhow!("Missing S3 host in DSN"))?;
    let port = dsn.port();
    let bucket = s3_bucket(dsn)?;

    let mut builder = AmazonS3Builder::new()
        .with_bucket_name(bucket)
        .with_region("us-east-1");

    let access_key = dsn.username();
    let secret_key = dsn.password().unwrap_or("");

    if !access_key.is_empty() {
        builder = builder
            .with_access_key_id(access_key)
            .with_secret_access_key(secret_key);
    }

    // anything that is not amazonaws.com is treated as an S3-compatible endpoint
    if !host.contains("amazonaws.com") {
        let scheme = if port == Some(443) { "https" } else { "http" };
        let endpoint = match port {
            Some(p) => format!("{scheme}://{host}:{p}"),
            None => format!("{scheme}://{host}"),
        };
        builder = builder
            .with_endpoint(endpoint)
            .with_allow_http(true)
            .with_virtual_hosted_style_request(false);
    }

    if access_key.is_empty() {
        if let Ok(env_key) = std::env::var("AWS_ACCESS_KEY_ID") {
            builder = builder.with_access_key_id(env_key);
        }
        if let Ok(env_secret) = std::env::var("AWS_SECRET_ACCESS_KEY") {
            builder = builder.with_secret_access_key(env_secret);
        }
        if let Ok(env_region) = std::env::var("AWS_DEFAULT_REGION") {
            builder = builder.with_region(env_region);
        }
    }

    Ok(builder)
}

fn parse_dsn(dsn: &str) -> Result<Url> {
    Url::parse(dsn).map_err(|e| anyhow::anyhow!("Invalid storage DSN '{}': {}", dsn, e))
}

fn file_path(url: &Url) -> Result<&str> {
    let path = url.path();
    if path.is_empty() || path == "/" {
        anyhow::bail!("File DSN must specify a path: file:///path/to/storage");
    }
    Ok(path)
}

/// Bucket of an S3 DSN: the host label of a virtual-hosted AWS endpoint
/// (`s3://bucket.s3.amazonaws.com/prefix`), otherwise the first path segment
/// (`s3://host:9000/bucket/prefix`).
fn s3_bucket(url: &Url) -> Result<&str> {
    if let Some(bucket) = url.host_str().and_then(virtual_hosted_bucket) {
        return Ok(bucket);
    }

    let bucket = url.path().trim_start_matches('/').split('/').next().unwrap_or("");
    if bucket.is_empty() {
        anyhow::bail!("S3 DSN must specify a bucket: s3://host/bucket");
    }
    Ok(bucket)
}

fn virtual_hosted_bucket(host: &str) -> Option<&str> {
    if !host.ends_with(".amazonaws.com") {
        return None;
    }
    host.split_once(".s3")
        .map(|(bucket, _)| bucket)
        .filter(|bucket| !bucket.is_empty())
}

fn unsupported_scheme(scheme: &str) -> anyhow::Error {
    anyhow::anyhow!(
        "Unsupported storage scheme: {}. Supported: file, memory, s3",
        scheme
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_memory_storage() {
        let storage = open_storage(&StorageConfig {
            dsn: "memory://".to_string(),
        })
        .unwrap();
        assert_eq!(storage.root_url, "memory://");
    }

    #[test]
    fn test_open_filesystem_storage() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let dsn = format!("file://{}/", temp_dir.path().display());

        let storage = open_storage_from_dsn(&dsn).unwrap();
        assert_eq!(
            storage.root_url,
            format!("file://{}", temp_dir.path().display())
        );
    }

    #[test]
    fn test_invalid_dsn() {
        let result = create_object_store_from_dsn("not-a-url");
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Invalid storage DSN")
        );
    }

    #[test]
    fn test_unsupported_scheme() {
        let result = open_storage_from_dsn("gcs://bucket/prefix");
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Unsupported storage scheme")
        );
    }

    #[test]
    fn test_s3_dsn_parsing() {
        let result = create_s3_builder_from_dsn(
            &Url::parse("s3://mybucket.s3.amazonaws.com/prefix").unwrap(),
        );
        assert!(result.is_ok());

        let result = create_s3_builder_from_dsn(
            &Url::parse("s3://access:secret@localhost:9000/bucket").unwrap(),
        );
        assert!(result.is_ok());

        let result = create_s3_builder_from_dsn(&Url::parse("s3://localhost:9000/").unwrap());
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("must specify a bucket")
        );
    }

    #[test]
    fn test_s3_root_url_uses_bucket() {
        let root = storage_root_url("s3://access:secret@localhost:9000/warehouse").unwrap();
        assert_eq!(root, "s3://warehouse");

        let root = storage_root_url("s3://localhost:9000/warehouse/tables").unwrap();
        assert_eq!(root, "s3://warehouse");
    }

    #[test]
    fn test_s3_root_url_virtual_hosted() {
        let root = storage_root_url("s3://mybucket.s3.amazonaws.com/prefix").unwrap();
        assert_eq!(root, "s3://mybucket");

        let root = storage_root_url("s3://mybucket.s3.eu-west-1.amazonaws.com").unwrap();
        assert_eq!(root, "s3://mybucket");

        // path-style AWS endpoint
        let root = storage_root_url("s3://s3.amazonaws.com/mybucket/prefix").unwrap();
        assert_eq!(root, "s3://mybucket");
    }

    #[test]
    fn test_file_dsn_without_path() {
        let result = create_object_store_from_dsn("file://");
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("File DSN must specify a path")
        );
    }

    #[test]
    fn test_storage_dsn_to_path() {
        assert_eq!(
            storage_dsn_to_path("file:///.data/warehouse").unwrap(),
            ".data/warehouse"
        );
        assert_eq!(storage_dsn_to_path("file:///tmp/data").unwrap(), "/tmp/data");
        assert_eq!(storage_dsn_to_path("memory://").unwrap(), "memory://");
        assert_eq!(
            storage_dsn_to_path("s3://bucket/prefix").unwrap(),
            "s3://bucket/prefix"
        );
    }
}
