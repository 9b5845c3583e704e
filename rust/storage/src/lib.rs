pub mod config;
pub mod local;
pub mod object_store;

use async_trait::async_trait;
use catalog_config::{registry::Registry, Configurable};
use catalog_error::{CatalogError, ErrorCodes};
use config::{InjectedLatencyConfig, ObjectStoreConfig, StorageConfig};
use local::LocalStorage;
use object_store::ObjectStore;
use std::{path::Path, sync::Arc};
use tempfile::TempDir;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageConfigError {
    #[error("Invalid storage config")]
    InvalidStorageConfig,
}

impl CatalogError for StorageConfigError {
    fn code(&self) -> ErrorCodes {
        ErrorCodes::InvalidArgument
    }
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("No such key: {path}")]
    NotFound { path: String },
    #[error("Key already exists: {path}")]
    AlreadyExists { path: String },
    #[error("Precondition failed for key: {path}")]
    Precondition { path: String },
    #[error("Storage error: {source}")]
    Generic {
        source: Arc<dyn std::error::Error + Send + Sync>,
    },
}

impl CatalogError for StorageError {
    fn code(&self) -> ErrorCodes {
        match self {
            StorageError::NotFound { .. } => ErrorCodes::NotFound,
            StorageError::AlreadyExists { .. } => ErrorCodes::AlreadyExists,
            StorageError::Precondition { .. } => ErrorCodes::FailedPrecondition,
            StorageError::Generic { .. } => ErrorCodes::Internal,
        }
    }
}

/// Controls conditional-put semantics. `if_not_exists` maps onto
/// `object_store::PutMode::Create` for the S3-compatible backend and a
/// plain existence check for the local backend, giving both backends the
/// same create-or-fail behavior the version file engine relies on for CAS.
#[derive(Debug, Clone, Default)]
pub struct PutOptions {
    pub if_not_exists: bool,
}

#[derive(Clone)]
enum StorageKind {
    Local(LocalStorage),
    ObjectStore(ObjectStore),
}

/// Blob store used for version files and lineage files. Backed either by
/// the local filesystem (tests, the example binary) or an S3-compatible
/// object store (production). Cheaply `Clone`, same as both backends.
#[derive(Clone)]
pub struct BlobStore {
    kind: StorageKind,
    injected_latency: Option<InjectedLatencyConfig>,
}

impl BlobStore {
    pub fn new_test_storage() -> Self {
        let dir = TempDir::new().expect("should be able to create a temporary directory");
        Self::new_test_storage_at(dir.keep())
    }

    pub fn new_test_storage_at<P: AsRef<Path>>(path: P) -> Self {
        BlobStore {
            kind: StorageKind::Local(LocalStorage::new(
                path.as_ref()
                    .to_str()
                    .expect("path should be valid UTF-8"),
            )),
            injected_latency: None,
        }
    }

    pub async fn get(&self, key: &str) -> Result<Arc<Vec<u8>>, StorageError> {
        self.maybe_sleep(self.injected_latency.as_ref().map(|l| l.min_get_latency))
            .await;
        match &self.kind {
            StorageKind::Local(local) => local
                .get(key)
                .await
                .map_err(|_| StorageError::NotFound { path: key.to_string() }),
            StorageKind::ObjectStore(os) => os.get(key).await,
        }
    }

    pub async fn put_bytes(
        &self,
        key: &str,
        bytes: Vec<u8>,
        options: PutOptions,
    ) -> Result<(), StorageError> {
        self.maybe_sleep(self.injected_latency.as_ref().map(|l| l.min_put_latency))
            .await;
        match &self.kind {
            StorageKind::Local(local) => local
                .put_bytes(key, &bytes, options.if_not_exists)
                .await
                .map_err(|_| StorageError::AlreadyExists { path: key.to_string() }),
            StorageKind::ObjectStore(os) => os.put_bytes(key, bytes, options).await,
        }
    }

    pub async fn put_file(&self, key: &str, path: &str, options: PutOptions) -> Result<(), StorageError> {
        self.maybe_sleep(self.injected_latency.as_ref().map(|l| l.min_put_latency))
            .await;
        match &self.kind {
            StorageKind::Local(local) => local
                .put_file(key, path, options.if_not_exists)
                .await
                .map_err(|_| StorageError::AlreadyExists { path: key.to_string() }),
            StorageKind::ObjectStore(os) => os.put_file(key, path, options).await,
        }
    }

    pub async fn delete(&self, key: &str) -> Result<(), StorageError> {
        match &self.kind {
            StorageKind::Local(local) => local
                .delete(key)
                .await
                .map_err(|_| StorageError::NotFound { path: key.to_string() }),
            StorageKind::ObjectStore(os) => os.delete(key).await,
        }
    }

    /// Lists keys under `prefix`. Used by the garbage collector to find
    /// orphaned files and by the reaper to enumerate a deleted collection's
    /// remaining blobs.
    pub async fn has_prefix(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        match &self.kind {
            StorageKind::Local(local) => local
                .list_prefix(prefix)
                .await
                .map_err(|e| StorageError::Generic {
                    source: Arc::new(std::io::Error::other(e)),
                }),
            StorageKind::ObjectStore(os) => os.list_prefix(prefix).await,
        }
    }

    async fn maybe_sleep(&self, latency: Option<Option<std::time::Duration>>) {
        if let Some(Some(d)) = latency {
            tokio::time::sleep(d).await;
        }
    }
}

pub async fn from_config(config: &StorageConfig) -> Result<BlobStore, Box<dyn CatalogError>> {
    let registry = Registry::new();
    let kind = match config {
        StorageConfig::Local(_) => {
            StorageKind::Local(LocalStorage::try_from_config(config, &registry).await?)
        }
        StorageConfig::ObjectStore(oc) => {
            StorageKind::ObjectStore(object_store_from_config(oc).await?)
        }
    };
    Ok(BlobStore {
        kind,
        injected_latency: None,
    })
}

async fn object_store_from_config(
    config: &ObjectStoreConfig,
) -> Result<ObjectStore, Box<dyn CatalogError>> {
    ObjectStore::try_from_config(config).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::LocalStorageConfig;

    #[tokio::test]
    async fn local_backend_round_trips_bytes() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let config = StorageConfig::Local(LocalStorageConfig {
            root: temp_dir.path().to_str().unwrap().to_string(),
        });
        let storage = from_config(&config).await.unwrap();

        storage
            .put_bytes("versions/1", b"hello".to_vec(), PutOptions::default())
            .await
            .unwrap();
        let got = storage.get("versions/1").await.unwrap();
        assert_eq!(*got, b"hello".to_vec());
    }

    #[tokio::test]
    async fn local_backend_conditional_put_rejects_overwrite() {
        let storage = BlobStore::new_test_storage();
        let opts = PutOptions { if_not_exists: true };
        storage
            .put_bytes("k", b"a".to_vec(), opts.clone())
            .await
            .unwrap();
        let err = storage.put_bytes("k", b"b".to_vec(), opts).await.unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn has_prefix_lists_matching_keys() {
        let storage = BlobStore::new_test_storage();
        storage
            .put_bytes("coll-1/versions/1", b"x".to_vec(), PutOptions::default())
            .await
            .unwrap();
        storage
            .put_bytes("coll-1/versions/2", b"y".to_vec(), PutOptions::default())
            .await
            .unwrap();
        storage
            .put_bytes("coll-2/versions/1", b"z".to_vec(), PutOptions::default())
            .await
            .unwrap();
        let keys = storage.has_prefix("coll-1/").await.unwrap();
        assert_eq!(keys.len(), 2);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let storage = BlobStore::new_test_storage();
        storage.delete("missing").await.unwrap();
    }
}
