//! Shared scaffolding for the `#[cfg(test)]` modules under `sqlite/`. Each
//! test gets its own fresh temp-file database and temp-dir blob store, so
//! tests never interfere with one another even when run in parallel.

use super::SqliteCatalog;
use crate::requests::CreateCollectionRequest;
use catalog_sqlite::db::test_utils::get_new_sqlite_db;
use catalog_storage::BlobStore;
use catalog_types::{Collection, CollectionUuid, Database, FunctionUuid, Segment, SegmentScope};

pub(crate) async fn new_catalog() -> SqliteCatalog {
    let db = get_new_sqlite_db().await;
    let storage = BlobStore::new_test_storage();
    SqliteCatalog::new(db, storage)
}

pub(crate) fn three_segments(collection: CollectionUuid) -> Vec<Segment> {
    vec![
        Segment::new(collection, "urn:catalog:segment/metadata", SegmentScope::Metadata),
        Segment::new(collection, "urn:catalog:segment/record", SegmentScope::Record),
        Segment::new(collection, "urn:catalog:segment/vector", SegmentScope::Vector),
    ]
}

/// Creates tenant `t` and database `t/d`, returning the database row.
pub(crate) async fn setup_tenant_and_database(catalog: &SqliteCatalog, tenant: &str, database: &str) -> Database {
    catalog.create_tenant_impl(tenant).await.unwrap();
    let db = Database::new(database.to_string(), tenant.to_string());
    catalog.create_database_impl(db).await.unwrap()
}

/// End to end: tenant + database + a collection with all three segment
/// scopes, ready for flush/fork/attach tests.
pub(crate) async fn create_test_collection(catalog: &SqliteCatalog, tenant: &str, database: &str, name: &str) -> Collection {
    setup_tenant_and_database(catalog, tenant, database).await;
    let placeholder = CollectionUuid::new();
    let (collection, created) = catalog
        .create_collection_and_segments_impl(CreateCollectionRequest {
            tenant: tenant.to_string(),
            database: database.to_string(),
            id: None,
            name: name.to_string(),
            segments: three_segments(placeholder),
            metadata: None,
            dimension: Some(128),
            configuration_json: None,
            get_or_create: false,
        })
        .await
        .unwrap();
    assert!(created);
    collection
}

/// Functions are referenced by `attached_functions.function_id` but have no
/// Catalog-trait creation path (their registry is owned elsewhere); tests
/// that attach a function insert the row directly.
pub(crate) async fn insert_function(catalog: &SqliteCatalog, name: &str) -> FunctionUuid {
    let id = FunctionUuid::new();
    sqlx::query("INSERT INTO functions (id, name, definition_json) VALUES ($1, $2, NULL)")
        .bind(id.to_string())
        .bind(name)
        .execute(catalog.db.get_conn())
        .await
        .unwrap();
    id
}
