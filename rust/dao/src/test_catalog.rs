//! In-memory-backed `Catalog` for unit tests elsewhere in the workspace
//! (coordinator, gc). Rather than re-implement the CAS/versioning protocols
//! against a `HashMap`, this wraps a real `SqliteCatalog` pointed at a fresh
//! temp-file database and local-disk blob store, mirroring the teacher's
//! `SqliteDb::test_utils::get_new_sqlite_db` test harness. Callers get the
//! exact same transactional semantics as production without a second
//! implementation to keep in sync.

use crate::requests::{
    AttachFunctionRequest, CollectionToGcInfo, CreateCollectionRequest, ForkCollectionRequest,
    ListCollectionsToGcRequest,
};
use crate::sqlite::SqliteCatalog;
use crate::Catalog;
use async_trait::async_trait;
use catalog_sqlite::db::test_utils::get_new_sqlite_db;
use catalog_storage::BlobStore;
use catalog_types::{
    AttachedFunction, AttachedFunctionUpdateInfo, AttachedFunctionUuid, CatalogError, Collection,
    CollectionAndSegments, CollectionFlushInfo, CollectionMetadataUpdate, CollectionUuid, Database,
    FlushCompactionAndAttachedFunctionResponse, FlushCompactionResponse, Segment, SegmentScope,
    SegmentUuid, Tenant,
};

/// A fresh, isolated `Catalog` backed by a temp-file SQLite database and a
/// temp-dir blob store. Each instance is fully independent of every other.
pub struct TestCatalog {
    inner: SqliteCatalog,
}

impl TestCatalog {
    pub async fn new() -> Self {
        let db = get_new_sqlite_db().await;
        let storage = BlobStore::new_test_storage();
        TestCatalog {
            inner: SqliteCatalog::new(db, storage),
        }
    }

    /// Exposes the blob store backing this catalog, for tests that need to
    /// assert on version/lineage blob contents directly.
    pub fn storage(&self) -> &BlobStore {
        &self.inner.storage
    }
}

#[async_trait]
impl Catalog for TestCatalog {
    async fn create_tenant(&self, name: &str) -> Result<Tenant, CatalogError> {
        self.inner.create_tenant(name).await
    }

    async fn get_tenant(&self, name: &str) -> Result<Tenant, CatalogError> {
        self.inner.get_tenant(name).await
    }

    async fn set_tenant_resource_name(
        &self,
        name: &str,
        resource_name: &str,
    ) -> Result<(), CatalogError> {
        self.inner.set_tenant_resource_name(name, resource_name).await
    }

    async fn get_tenant_by_resource_name(&self, resource_name: &str) -> Result<Tenant, CatalogError> {
        self.inner.get_tenant_by_resource_name(resource_name).await
    }

    async fn create_database(&self, database: Database) -> Result<Database, CatalogError> {
        self.inner.create_database(database).await
    }

    async fn get_database(&self, name: &str, tenant: &str) -> Result<Database, CatalogError> {
        self.inner.get_database(name, tenant).await
    }

    async fn list_databases(
        &self,
        tenant: &str,
        limit: Option<u32>,
        offset: u32,
    ) -> Result<Vec<Database>, CatalogError> {
        self.inner.list_databases(tenant, limit, offset).await
    }

    async fn delete_database(&self, name: &str, tenant: &str) -> Result<(), CatalogError> {
        self.inner.delete_database(name, tenant).await
    }

    async fn finish_database_deletion(&self, cutoff_secs: i64) -> Result<u64, CatalogError> {
        self.inner.finish_database_deletion(cutoff_secs).await
    }

    async fn create_collection_and_segments(
        &self,
        req: CreateCollectionRequest,
    ) -> Result<(Collection, bool), CatalogError> {
        self.inner.create_collection_and_segments(req).await
    }

    async fn get_collection(
        &self,
        id: CollectionUuid,
        include_soft_deleted: bool,
    ) -> Result<Collection, CatalogError> {
        self.inner.get_collection(id, include_soft_deleted).await
    }

    async fn get_collection_by_name(
        &self,
        tenant: &str,
        database: &str,
        name: &str,
        include_soft_deleted: bool,
    ) -> Result<Collection, CatalogError> {
        self.inner
            .get_collection_by_name(tenant, database, name, include_soft_deleted)
            .await
    }

    async fn list_collections(
        &self,
        tenant: &str,
        database: &str,
        limit: Option<u32>,
        offset: u32,
        include_soft_deleted: bool,
    ) -> Result<Vec<Collection>, CatalogError> {
        self.inner
            .list_collections(tenant, database, limit, offset, include_soft_deleted)
            .await
    }

    async fn count_collections(&self, tenant: &str, database: &str) -> Result<u64, CatalogError> {
        self.inner.count_collections(tenant, database).await
    }

    async fn list_soft_deleted_collections_for_reaping(
        &self,
        max_age_cutoff_secs: i64,
        limit: u32,
    ) -> Result<Vec<Collection>, CatalogError> {
        self.inner
            .list_soft_deleted_collections_for_reaping(max_age_cutoff_secs, limit)
            .await
    }

    async fn get_collection_with_segments(
        &self,
        id: CollectionUuid,
    ) -> Result<CollectionAndSegments, CatalogError> {
        self.inner.get_collection_with_segments(id).await
    }

    async fn update_collection(
        &self,
        id: CollectionUuid,
        name: Option<String>,
        metadata: Option<CollectionMetadataUpdate>,
        dimension: Option<i32>,
        configuration_json: Option<String>,
    ) -> Result<Collection, CatalogError> {
        self.inner
            .update_collection(id, name, metadata, dimension, configuration_json)
            .await
    }

    async fn soft_delete_collection(&self, id: CollectionUuid) -> Result<(), CatalogError> {
        self.inner.soft_delete_collection(id).await
    }

    async fn hard_delete_collection(&self, id: CollectionUuid) -> Result<(), CatalogError> {
        self.inner.hard_delete_collection(id).await
    }

    async fn fork_collection(
        &self,
        req: ForkCollectionRequest,
    ) -> Result<CollectionAndSegments, CatalogError> {
        self.inner.fork_collection(req).await
    }

    async fn count_forks(&self, any_collection_in_tree: CollectionUuid) -> Result<u64, CatalogError> {
        self.inner.count_forks(any_collection_in_tree).await
    }

    async fn create_segment(&self, segment: Segment) -> Result<Segment, CatalogError> {
        self.inner.create_segment(segment).await
    }

    async fn get_segments(
        &self,
        collection: CollectionUuid,
        id: Option<SegmentUuid>,
        scope: Option<SegmentScope>,
    ) -> Result<Vec<Segment>, CatalogError> {
        self.inner.get_segments(collection, id, scope).await
    }

    async fn update_segment(&self, segment: Segment) -> Result<Segment, CatalogError> {
        self.inner.update_segment(segment).await
    }

    async fn delete_segment(&self, id: SegmentUuid) -> Result<(), CatalogError> {
        self.inner.delete_segment(id).await
    }

    async fn flush_collection_compaction(
        &self,
        req: CollectionFlushInfo,
    ) -> Result<FlushCompactionResponse, CatalogError> {
        self.inner.flush_collection_compaction(req).await
    }

    async fn flush_collection_compaction_and_attached_function(
        &self,
        req: CollectionFlushInfo,
        attached_function_update: AttachedFunctionUpdateInfo,
        run_nonce: uuid::Uuid,
    ) -> Result<FlushCompactionAndAttachedFunctionResponse, CatalogError> {
        self.inner
            .flush_collection_compaction_and_attached_function(req, attached_function_update, run_nonce)
            .await
    }

    async fn flush_collection_compaction_legacy(
        &self,
        req: CollectionFlushInfo,
    ) -> Result<FlushCompactionResponse, CatalogError> {
        self.inner.flush_collection_compaction_legacy(req).await
    }

    async fn list_collections_to_gc(
        &self,
        req: ListCollectionsToGcRequest,
    ) -> Result<Vec<CollectionToGcInfo>, CatalogError> {
        self.inner.list_collections_to_gc(req).await
    }

    async fn mark_version_for_deletion(
        &self,
        collection_id: CollectionUuid,
        versions: Vec<i64>,
    ) -> Result<(), CatalogError> {
        self.inner.mark_version_for_deletion(collection_id, versions).await
    }

    async fn delete_collection_version(
        &self,
        collection_id: CollectionUuid,
        versions: Vec<i64>,
    ) -> Result<(), CatalogError> {
        self.inner.delete_collection_version(collection_id, versions).await
    }

    async fn attach_function(
        &self,
        req: AttachFunctionRequest,
    ) -> Result<AttachedFunctionUuid, CatalogError> {
        self.inner.attach_function(req).await
    }

    async fn complete_attach(&self, id: AttachedFunctionUuid) -> Result<(), CatalogError> {
        self.inner.complete_attach(id).await
    }

    async fn get_attached_function_by_name(
        &self,
        input_collection_id: CollectionUuid,
        name: &str,
    ) -> Result<AttachedFunction, CatalogError> {
        self.inner.get_attached_function_by_name(input_collection_id, name).await
    }

    async fn list_attached_functions(
        &self,
        input_collection_id: CollectionUuid,
    ) -> Result<Vec<AttachedFunction>, CatalogError> {
        self.inner.list_attached_functions(input_collection_id).await
    }

    async fn detach_function(
        &self,
        input_collection_id: CollectionUuid,
        name: &str,
    ) -> Result<(), CatalogError> {
        self.inner.detach_function(input_collection_id, name).await
    }

    async fn advance_attached_function(
        &self,
        id: AttachedFunctionUuid,
        new_next_nonce: uuid::Uuid,
    ) -> Result<(), CatalogError> {
        self.inner.advance_attached_function(id, new_next_nonce).await
    }

    async fn cleanup_expired_partial_attached_functions(
        &self,
        max_age_secs: i64,
    ) -> Result<Vec<AttachedFunctionUuid>, CatalogError> {
        self.inner.cleanup_expired_partial_attached_functions(max_age_secs).await
    }
}
