//! Background soft-delete cleaner. Each tick fetches up to
//! `limit_per_check` soft-deleted collections older than `max_age`
//! (fork roots are never candidates: `list_soft_deleted_collections_for_reaping`
//! filters those at the query level) and hard-deletes each one. Errors for
//! rows that are already gone are tolerated; anything else is logged and
//! the cycle continues.
//!
//! The host loop is modeled on `rust-sysdb/src/server.rs`'s SIGTERM/SIGINT
//! `tokio::select!` shutdown, generalized to a `CancellationToken` so this
//! crate doesn't need to own process-level signal handling itself.

use crate::config::ReaperConfig;
use catalog_dao::Catalog;
use catalog_types::CatalogErrorKind;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub struct Reaper {
    catalog: Arc<dyn Catalog>,
    config: ReaperConfig,
}

impl Reaper {
    pub fn new(catalog: Arc<dyn Catalog>, config: ReaperConfig) -> Self {
        Reaper { catalog, config }
    }

    /// Runs one sweep, returning the number of collections actually
    /// hard-deleted.
    pub async fn run_once(&self, now_secs: i64) -> u32 {
        let cutoff = now_secs - self.config.max_age.as_secs() as i64;
        let candidates = match self
            .catalog
            .list_soft_deleted_collections_for_reaping(cutoff, self.config.limit_per_check)
            .await
        {
            Ok(candidates) => candidates,
            Err(err) => {
                tracing::error!(error = %err, "reaper: failed to list soft-deleted collections");
                return 0;
            }
        };

        let mut reclaimed = 0;
        for collection in candidates {
            match self.catalog.hard_delete_collection(collection.id).await {
                Ok(()) => reclaimed += 1,
                Err(err) if err.kind() == CatalogErrorKind::NotFound => {
                    // Already gone: a concurrent reaper tick, a direct
                    // hard-delete call, or GC finished the job first.
                }
                Err(err) => {
                    tracing::error!(
                        collection_id = %collection.id,
                        error = %err,
                        "reaper: failed to hard-delete soft-deleted collection"
                    );
                }
            }
        }
        reclaimed
    }

    /// Runs the tick loop until `cancellation` fires. Sleeps a random
    /// initial jitter (0..=max_initial_jitter) before the first tick, then
    /// sleeps `cleanup_interval` plus a 0..=1s per-cycle jitter between
    /// ticks.
    pub async fn run(self, cancellation: CancellationToken) {
        let initial_jitter = jitter(self.config.max_initial_jitter);
        tokio::select! {
            _ = tokio::time::sleep(initial_jitter) => {}
            _ = cancellation.cancelled() => {
                tracing::info!("reaper: cancelled during initial jitter, shutting down");
                return;
            }
        }

        loop {
            let now_secs = now_secs();
            let reclaimed = self.run_once(now_secs).await;
            if reclaimed > 0 {
                tracing::info!(reclaimed, "reaper: tick complete");
            }

            let sleep_for = self.config.cleanup_interval + jitter(Duration::from_secs(1));
            tokio::select! {
                _ = tokio::time::sleep(sleep_for) => {}
                _ = cancellation.cancelled() => {
                    tracing::info!("reaper: received shutdown signal, stopping");
                    return;
                }
            }
        }
    }
}

fn jitter(max: Duration) -> Duration {
    if max.is_zero() {
        return Duration::ZERO;
    }
    Duration::from_secs_f64(rand::thread_rng().gen_range(0.0..=max.as_secs_f64()))
}

fn now_secs() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_dao::{CreateCollectionRequest, TestCatalog};
    use catalog_types::{CollectionUuid, Database};

    async fn setup() -> (Arc<TestCatalog>, CollectionUuid) {
        let catalog = Arc::new(TestCatalog::new().await);
        catalog.create_tenant("t").await.unwrap();
        catalog
            .create_database(Database::new("d", "t"))
            .await
            .unwrap();
        let (collection, _created) = catalog
            .create_collection_and_segments(CreateCollectionRequest {
                tenant: "t".to_string(),
                database: "d".to_string(),
                id: None,
                name: "c".to_string(),
                segments: vec![],
                metadata: None,
                dimension: None,
                configuration_json: None,
                get_or_create: false,
            })
            .await
            .unwrap();
        (catalog, collection.id)
    }

    #[tokio::test]
    async fn tick_reclaims_soft_deleted_collections_past_max_age() {
        let (catalog, id) = setup().await;
        catalog.soft_delete_collection(id).await.unwrap();

        let reaper = Reaper::new(
            catalog.clone(),
            ReaperConfig {
                cleanup_interval: Duration::from_secs(30),
                max_age: Duration::from_secs(3600),
                limit_per_check: 100,
                max_initial_jitter: Duration::ZERO,
            },
        );

        // Not yet past max_age: nothing reclaimed.
        let reclaimed = reaper.run_once(now_secs()).await;
        assert_eq!(reclaimed, 0);
        assert!(catalog.get_collection(id, true).await.is_ok());

        // Simulate the passage of time by pretending "now" is far enough
        // in the future that the soft-delete predates max_age.
        let future = now_secs() + 7200;
        let reclaimed = reaper.run_once(future).await;
        assert_eq!(reclaimed, 1);
        assert!(catalog.get_collection(id, true).await.is_err());
    }

    #[tokio::test]
    async fn tick_skips_fork_roots() {
        let (catalog, root_id) = setup().await;
        let fork = catalog
            .fork_collection(catalog_dao::ForkCollectionRequest {
                source_collection_id: root_id,
                target_name: "fork".to_string(),
                source_compaction_offset: 0,
                source_enumeration_offset: 0,
            })
            .await
            .unwrap();

        catalog.soft_delete_collection(root_id).await.unwrap();
        catalog.soft_delete_collection(fork.collection.id).await.unwrap();

        let reaper = Reaper::new(
            catalog.clone(),
            ReaperConfig {
                cleanup_interval: Duration::from_secs(30),
                max_age: Duration::from_secs(3600),
                limit_per_check: 100,
                max_initial_jitter: Duration::ZERO,
            },
        );

        let future = now_secs() + 7200;
        let reclaimed = reaper.run_once(future).await;
        // Only the non-root fork is reclaimed; the root is held back by
        // its lineage_file_path until no descendants remain.
        assert_eq!(reclaimed, 1);
        assert!(catalog.get_collection(root_id, true).await.is_ok());
        assert!(catalog.get_collection(fork.collection.id, true).await.is_err());
    }

    #[tokio::test]
    async fn run_stops_promptly_on_cancellation() {
        let (catalog, _id) = setup().await;
        let reaper = Reaper::new(
            catalog,
            ReaperConfig {
                cleanup_interval: Duration::from_secs(3600),
                max_age: Duration::from_secs(3600),
                limit_per_check: 100,
                max_initial_jitter: Duration::ZERO,
            },
        );
        let cancellation = CancellationToken::new();
        cancellation.cancel();
        tokio::time::timeout(Duration::from_secs(5), reaper.run(cancellation))
            .await
            .expect("reaper should stop immediately once cancelled");
    }
}
