//! Thin process entrypoint. All the real wiring lives in
//! `catalog_coordinator_entrypoint` below, modeled on
//! `rust-sysdb/src/lib.rs`'s `sysdb_service_entrypoint`: load config, init
//! tracing, construct the storage/db/catalog stack, then run the reaper
//! to completion (there is no gRPC server to serve here).

use catalog_coordinator::{Coordinator, Reaper, RootConfig};
use catalog_config::registry::Registry;
use catalog_config::Configurable;
use catalog_dao::{Catalog, SqliteCatalog};
use catalog_sqlite::{MigrationHash, MigrationMode, SqliteDBConfig, SqliteDb};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const CONFIG_PATH_ENV_VAR: &str = "CATALOG_CONFIG_PATH";

#[tokio::main]
async fn main() {
    Box::pin(catalog_coordinator_entrypoint()).await;
}

async fn catalog_coordinator_entrypoint() {
    catalog_tracing::init_stdout_tracing();

    let root_config = match std::env::var(CONFIG_PATH_ENV_VAR) {
        Ok(path) => RootConfig::load_from_path(&path),
        Err(_) => RootConfig::load(),
    };
    let config = root_config.coordinator;

    let registry = Registry::new();

    let storage = catalog_storage::from_config(&config.storage)
        .await
        .unwrap_or_else(|err| panic!("failed to construct blob store: {err:?}"));

    let sqlite_config = SqliteDBConfig {
        url: config.sqlite.url.clone(),
        hash_type: MigrationHash::SHA256,
        migration_mode: MigrationMode::Apply,
    };
    let db = SqliteDb::try_from_config(&sqlite_config, &registry)
        .await
        .unwrap_or_else(|err| panic!("failed to construct sqlite db: {err:?}"));

    let catalog: Arc<dyn Catalog> = Arc::new(SqliteCatalog::new(db, storage.clone()));

    // No heap-service client is wired up by default: this binary is the
    // "zero->aha" example, not a production deployment. A real deployment
    // constructs a `ShardedHeapClient` over real network clients and
    // passes it here.
    let heap_client = None;

    // Constructed to demonstrate the full wiring; nothing in this example
    // binary serves it over a transport, so the facade itself never gets
    // called here.
    let _coordinator = Coordinator::with_version_file_enabled(
        catalog.clone(),
        storage,
        heap_client,
        config.delete_mode,
        config.version_file_enabled,
    );

    tracing::info!(
        service_name = %config.service_name,
        "catalog coordinator started"
    );

    let cancellation = CancellationToken::new();
    let reaper_cancellation = cancellation.clone();
    let reaper = Reaper::new(catalog, config.reaper);

    let mut sigterm =
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
    let mut sigint =
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
            .expect("failed to install SIGINT handler");

    tokio::select! {
        _ = reaper.run(reaper_cancellation) => {}
        _ = sigterm.recv() => {
            tracing::info!("received SIGTERM, shutting down");
            cancellation.cancel();
        }
        _ = sigint.recv() => {
            tracing::info!("received SIGINT, shutting down");
            cancellation.cancel();
        }
    }
}
