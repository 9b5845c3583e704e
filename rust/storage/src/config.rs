use serde::Deserialize;
use std::time::Duration;

/// The configuration for the chosen blob store backend.
#[derive(Deserialize, Debug, Clone)]
pub enum StorageConfig {
    #[serde(alias = "local")]
    Local(LocalStorageConfig),
    #[serde(alias = "object_store", alias = "s3")]
    ObjectStore(ObjectStoreConfig),
}

/// The configuration for the local filesystem backend.
/// Intended for tests and the example binary, not production deployments.
#[derive(Deserialize, Debug, Clone)]
pub struct LocalStorageConfig {
    pub root: String,
}

#[derive(Deserialize, Debug, Clone)]
pub enum ObjectStoreType {
    #[serde(alias = "minio")]
    Minio,
    #[serde(alias = "s3")]
    S3,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ObjectStoreConfig {
    pub bucket_name: String,
    pub r#type: ObjectStoreType,
    pub upload_part_size_bytes: u64,
    pub download_part_size_bytes: u64,
    pub max_concurrent_requests: usize,
}

#[derive(Deserialize, Debug, Clone)]
pub struct InjectedLatencyConfig {
    #[serde(
        deserialize_with = "catalog_config::helpers::deserialize_duration_from_seconds"
    )]
    pub min_put_latency: Duration,
    #[serde(
        deserialize_with = "catalog_config::helpers::deserialize_duration_from_seconds"
    )]
    pub min_get_latency: Duration,
}
