use std::sync::Arc;

use futures::StreamExt;
use object_store::path::Path;
use object_store::{ObjectStore as ObjectStoreTrait, PutMode, PutOptions as ObjectStorePutOptions};

use super::config::{ObjectStoreConfig, ObjectStoreType};
use super::{PutOptions, StorageConfigError, StorageError};

impl From<object_store::Error> for StorageError {
    fn from(err: object_store::Error) -> Self {
        match err {
            object_store::Error::NotFound { path, .. } => StorageError::NotFound { path },
            object_store::Error::AlreadyExists { path, .. } => StorageError::AlreadyExists { path },
            object_store::Error::Precondition { path, .. } => StorageError::Precondition { path },
            err => StorageError::Generic {
                source: Arc::new(err),
            },
        }
    }
}

/// S3-compatible blob store backed by the `object_store` crate. Covers both
/// real S3 and S3-compatible test doubles (Minio) since both speak the same
/// wire protocol; only the builder options differ.
#[derive(Clone)]
pub struct ObjectStore {
    object_store: Arc<dyn ObjectStoreTrait>,
}

impl ObjectStore {
    pub async fn try_from_config(
        config: &ObjectStoreConfig,
    ) -> Result<Self, Box<dyn catalog_error::CatalogError>> {
        let builder = match config.r#type {
            ObjectStoreType::Minio => object_store::aws::AmazonS3Builder::new()
                .with_region("us-east-1")
                .with_endpoint("http://localhost:9000")
                .with_bucket_name(&config.bucket_name)
                .with_access_key_id("minio")
                .with_secret_access_key("minio123")
                .with_allow_http(true),
            ObjectStoreType::S3 => {
                object_store::aws::AmazonS3Builder::from_env().with_bucket_name(&config.bucket_name)
            }
        };
        let built = builder.build().map_err(|err| {
            tracing::error!(error = %err, "Failed to build object store client");
            StorageConfigError::InvalidStorageConfig.boxed()
        })?;
        let limited = object_store::limit::LimitStore::new(built, config.max_concurrent_requests);
        Ok(ObjectStore {
            object_store: Arc::new(limited),
        })
    }

    pub async fn get(&self, key: &str) -> Result<Arc<Vec<u8>>, StorageError> {
        Ok(self
            .object_store
            .get(&Path::from(key))
            .await?
            .bytes()
            .await?
            .to_vec()
            .into())
    }

    pub async fn put_bytes(
        &self,
        key: &str,
        bytes: Vec<u8>,
        options: PutOptions,
    ) -> Result<(), StorageError> {
        let mut object_store_put_options = ObjectStorePutOptions::default();
        if options.if_not_exists {
            object_store_put_options.mode = PutMode::Create;
        }
        self.object_store
            .put_opts(&Path::from(key), bytes.into(), object_store_put_options)
            .await?;
        Ok(())
    }

    pub async fn put_file(
        &self,
        key: &str,
        path: &str,
        options: PutOptions,
    ) -> Result<(), StorageError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| StorageError::Generic { source: Arc::new(e) })?;
        self.put_bytes(key, bytes, options).await
    }

    pub async fn delete(&self, key: &str) -> Result<(), StorageError> {
        match self.object_store.delete(&Path::from(key)).await {
            Ok(()) => Ok(()),
            Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn list_prefix(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let mut files = Vec::new();
        let mut stream = self.object_store.list(Some(&Path::from(prefix)));
        while let Some(obj) = stream.next().await {
            files.push(obj?.location.to_string());
        }
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get_object_store() -> ObjectStore {
        ObjectStore {
            object_store: Arc::new(object_store::memory::InMemory::new()),
        }
    }

    #[tokio::test]
    async fn put_get_roundtrip() {
        let store = get_object_store();
        let bytes = b"version file bytes".to_vec();
        store
            .put_bytes("tenant/db/coll/version/1", bytes.clone(), PutOptions::default())
            .await
            .unwrap();
        let result = store.get("tenant/db/coll/version/1").await.unwrap();
        assert_eq!(*result, bytes);
    }

    #[tokio::test]
    async fn put_if_not_exists_rejects_overwrite() {
        let store = get_object_store();
        let opts = PutOptions { if_not_exists: true };
        store
            .put_bytes("k", b"a".to_vec(), opts.clone())
            .await
            .unwrap();
        let err = store.put_bytes("k", b"b".to_vec(), opts).await.unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn list_prefix_returns_matching_keys() {
        let store = get_object_store();
        store
            .put_bytes("a/1", b"x".to_vec(), PutOptions::default())
            .await
            .unwrap();
        store
            .put_bytes("a/2", b"y".to_vec(), PutOptions::default())
            .await
            .unwrap();
        store
            .put_bytes("b/1", b"z".to_vec(), PutOptions::default())
            .await
            .unwrap();
        let mut keys = store.list_prefix("a/").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["a/1".to_string(), "a/2".to_string()]);
    }
}
