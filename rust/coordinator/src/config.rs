//! Config schema for the coordinator and its binary, modeled on
//! `rust-sysdb/src/config.rs`'s `SysDbServiceConfig`/`RootConfig` pair:
//! serde-deserializable structs with `#[serde(default = "...")]` constants,
//! loaded by `RootConfig::load`/`load_from_path` through the same
//! `figment::Env::prefixed(...)` + optional-YAML-overlay chain.

use catalog_storage::config::StorageConfig;
use figment::providers::{Env, Format, Yaml};
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_CONFIG_PATH: &str = "./catalog_config.yaml";
const ENV_PREFIX: &str = "CATALOG_";

/// Whether `DeleteCollection` soft-deletes (leaving cleanup to the reaper)
/// or hard-deletes immediately.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteMode {
    Soft,
    Hard,
}

/// The sqlite connection is intentionally not `catalog_sqlite::SqliteDBConfig`
/// itself: that type carries `MigrationHash`/`MigrationMode` enums with no
/// `serde` impls (they are constructed in code, not config, everywhere else
/// in this workspace). This is the minimal deserializable shape the binary
/// converts into a real `SqliteDBConfig` with the conventional production
/// defaults (`MigrationHash::SHA256`, `MigrationMode::Apply`).
#[derive(Clone, Debug, Deserialize)]
pub struct SqliteConfig {
    /// `None` opens an in-memory, non-persisted database.
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ReaperConfig {
    #[serde(
        default = "ReaperConfig::default_cleanup_interval_secs",
        deserialize_with = "catalog_config::helpers::deserialize_duration_from_seconds"
    )]
    pub cleanup_interval: Duration,
    #[serde(
        default = "ReaperConfig::default_max_age_secs",
        deserialize_with = "catalog_config::helpers::deserialize_duration_from_seconds"
    )]
    pub max_age: Duration,
    #[serde(default = "ReaperConfig::default_limit_per_check")]
    pub limit_per_check: u32,
    #[serde(
        default = "ReaperConfig::default_max_initial_jitter_secs",
        deserialize_with = "catalog_config::helpers::deserialize_duration_from_seconds"
    )]
    pub max_initial_jitter: Duration,
}

impl ReaperConfig {
    fn default_cleanup_interval_secs() -> Duration {
        Duration::from_secs(30)
    }

    fn default_max_age_secs() -> Duration {
        Duration::from_secs(3600)
    }

    fn default_limit_per_check() -> u32 {
        100
    }

    fn default_max_initial_jitter_secs() -> Duration {
        Duration::from_secs(30)
    }
}

impl Default for ReaperConfig {
    fn default() -> Self {
        ReaperConfig {
            cleanup_interval: Self::default_cleanup_interval_secs(),
            max_age: Self::default_max_age_secs(),
            limit_per_check: Self::default_limit_per_check(),
            max_initial_jitter: Self::default_max_initial_jitter_secs(),
        }
    }
}

/// Hasher choice for the heap shard assignment policy; mirrors
/// `catalog_config::assignment::config::HasherType`, which is
/// `pub(crate)` and so cannot be named directly from here.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeapHasher {
    Murmur3,
}

/// Optional external heap scheduler wiring. `enabled = false` (the default)
/// runs the coordinator with no `HeapClient`: `AttachFunction` then
/// completes Phase 1 only and surfaces `not_ready` forever, which is an
/// accepted degraded mode for deployments that never attach functions.
#[derive(Clone, Debug, Deserialize)]
pub struct HeapServiceConfig {
    #[serde(default = "HeapServiceConfig::default_enabled")]
    pub enabled: bool,
    #[serde(default = "HeapServiceConfig::default_port")]
    pub port: u16,
    #[serde(default = "HeapServiceConfig::default_hasher")]
    pub hasher: HeapHasher,
    #[serde(default = "HeapServiceConfig::default_namespace")]
    pub namespace: String,
    #[serde(default = "HeapServiceConfig::default_memberlist_name")]
    pub memberlist_name: String,
}

impl HeapServiceConfig {
    fn default_enabled() -> bool {
        false
    }

    fn default_port() -> u16 {
        50052
    }

    fn default_hasher() -> HeapHasher {
        HeapHasher::Murmur3
    }

    fn default_namespace() -> String {
        "catalog".to_string()
    }

    fn default_memberlist_name() -> String {
        "catalog-heap-memberlist".to_string()
    }
}

impl Default for HeapServiceConfig {
    fn default() -> Self {
        HeapServiceConfig {
            enabled: Self::default_enabled(),
            port: Self::default_port(),
            hasher: Self::default_hasher(),
            namespace: Self::default_namespace(),
            memberlist_name: Self::default_memberlist_name(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct CoordinatorConfig {
    #[serde(default = "CoordinatorConfig::default_service_name")]
    pub service_name: String,
    #[serde(default = "CoordinatorConfig::default_version_file_enabled")]
    pub version_file_enabled: bool,
    #[serde(default = "CoordinatorConfig::default_delete_mode")]
    pub delete_mode: DeleteMode,
    /// No default: a config file or `CATALOG_COORDINATOR__STORAGE__...`
    /// override must always name a concrete backend, since `StorageConfig`
    /// has no `Default` impl for an unopinionated fallback to pick.
    pub storage: StorageConfig,
    #[serde(default)]
    pub sqlite: SqliteConfig,
    #[serde(default)]
    pub reaper: ReaperConfig,
    #[serde(default)]
    pub heap_service: HeapServiceConfig,
}

impl CoordinatorConfig {
    fn default_service_name() -> String {
        "catalog-coordinator".to_string()
    }

    fn default_version_file_enabled() -> bool {
        true
    }

    fn default_delete_mode() -> DeleteMode {
        DeleteMode::Soft
    }
}

#[derive(Deserialize)]
pub struct RootConfig {
    pub coordinator: CoordinatorConfig,
}

impl RootConfig {
    pub fn load() -> Self {
        Self::load_from_path(DEFAULT_CONFIG_PATH)
    }

    pub fn load_from_path(path: &str) -> Self {
        let mut f = figment::Figment::from(Env::prefixed(ENV_PREFIX).map(|k| match k {
            k => k.as_str().replace("__", ".").into(),
        }));
        if std::path::Path::new(path).exists() {
            f = figment::Figment::from(Yaml::file(path)).merge(f);
        }
        f.extract().unwrap_or_else(|e| panic!("error loading config: {e}"))
    }
}
