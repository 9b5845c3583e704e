use super::SqliteCatalog;
use crate::requests::{
    AttachFunctionRequest, CollectionToGcInfo, CreateCollectionRequest, ForkCollectionRequest,
    ListCollectionsToGcRequest,
};
use crate::Catalog;
use async_trait::async_trait;
use catalog_types::{
    AttachedFunction, AttachedFunctionUpdateInfo, AttachedFunctionUuid, CatalogError, Collection,
    CollectionAndSegments, CollectionFlushInfo, CollectionMetadataUpdate, CollectionUuid, Database,
    FlushCompactionAndAttachedFunctionResponse, FlushCompactionResponse, Segment, SegmentScope,
    SegmentUuid, Tenant,
};

#[async_trait]
impl Catalog for SqliteCatalog {
    async fn create_tenant(&self, name: &str) -> Result<Tenant, CatalogError> {
        self.create_tenant_impl(name).await
    }

    async fn get_tenant(&self, name: &str) -> Result<Tenant, CatalogError> {
        self.get_tenant_impl(name).await
    }

    async fn set_tenant_resource_name(
        &self,
        name: &str,
        resource_name: &str,
    ) -> Result<(), CatalogError> {
        self.set_tenant_resource_name_impl(name, resource_name).await
    }

    async fn get_tenant_by_resource_name(&self, resource_name: &str) -> Result<Tenant, CatalogError> {
        self.get_tenant_by_resource_name_impl(resource_name).await
    }

    async fn create_database(&self, database: Database) -> Result<Database, CatalogError> {
        self.create_database_impl(database).await
    }

    async fn get_database(&self, name: &str, tenant: &str) -> Result<Database, CatalogError> {
        self.get_database_impl(name, tenant).await
    }

    async fn list_databases(
        &self,
        tenant: &str,
        limit: Option<u32>,
        offset: u32,
    ) -> Result<Vec<Database>, CatalogError> {
        self.list_databases_impl(tenant, limit, offset).await
    }

    async fn delete_database(&self, name: &str, tenant: &str) -> Result<(), CatalogError> {
        self.delete_database_impl(name, tenant).await
    }

    async fn finish_database_deletion(&self, cutoff_secs: i64) -> Result<u64, CatalogError> {
        self.finish_database_deletion_impl(cutoff_secs).await
    }

    async fn create_collection_and_segments(
        &self,
        req: CreateCollectionRequest,
    ) -> Result<(Collection, bool), CatalogError> {
        self.create_collection_and_segments_impl(req).await
    }

    async fn get_collection(
        &self,
        id: CollectionUuid,
        include_soft_deleted: bool,
    ) -> Result<Collection, CatalogError> {
        self.get_collection_impl(id, include_soft_deleted).await
    }

    async fn get_collection_by_name(
        &self,
        tenant: &str,
        database: &str,
        name: &str,
        include_soft_deleted: bool,
    ) -> Result<Collection, CatalogError> {
        self.get_collection_by_name_impl(tenant, database, name, include_soft_deleted).await
    }

    async fn list_collections(
        &self,
        tenant: &str,
        database: &str,
        limit: Option<u32>,
        offset: u32,
        include_soft_deleted: bool,
    ) -> Result<Vec<Collection>, CatalogError> {
        self.list_collections_impl(tenant, database, limit, offset, include_soft_deleted).await
    }

    async fn count_collections(&self, tenant: &str, database: &str) -> Result<u64, CatalogError> {
        self.count_collections_impl(tenant, database).await
    }

    async fn list_soft_deleted_collections_for_reaping(
        &self,
        max_age_cutoff_secs: i64,
        limit: u32,
    ) -> Result<Vec<Collection>, CatalogError> {
        self.list_soft_deleted_collections_for_reaping_impl(max_age_cutoff_secs, limit)
            .await
    }

    async fn get_collection_with_segments(
        &self,
        id: CollectionUuid,
    ) -> Result<CollectionAndSegments, CatalogError> {
        self.get_collection_with_segments_impl(id).await
    }

    async fn update_collection(
        &self,
        id: CollectionUuid,
        name: Option<String>,
        metadata: Option<CollectionMetadataUpdate>,
        dimension: Option<i32>,
        configuration_json: Option<String>,
    ) -> Result<Collection, CatalogError> {
        self.update_collection_impl(id, name, metadata, dimension, configuration_json)
            .await
    }

    async fn soft_delete_collection(&self, id: CollectionUuid) -> Result<(), CatalogError> {
        self.soft_delete_collection_impl(id).await
    }

    async fn hard_delete_collection(&self, id: CollectionUuid) -> Result<(), CatalogError> {
        self.hard_delete_collection_impl(id).await
    }

    async fn fork_collection(
        &self,
        req: ForkCollectionRequest,
    ) -> Result<CollectionAndSegments, CatalogError> {
        self.fork_collection_impl(req).await
    }

    async fn count_forks(&self, any_collection_in_tree: CollectionUuid) -> Result<u64, CatalogError> {
        self.count_forks_impl(any_collection_in_tree).await
    }

    async fn create_segment(&self, segment: Segment) -> Result<Segment, CatalogError> {
        self.create_segment_impl(segment).await
    }

    async fn get_segments(
        &self,
        collection: CollectionUuid,
        id: Option<SegmentUuid>,
        scope: Option<SegmentScope>,
    ) -> Result<Vec<Segment>, CatalogError> {
        self.get_segments_impl(collection, id, scope).await
    }

    async fn update_segment(&self, segment: Segment) -> Result<Segment, CatalogError> {
        self.update_segment_impl(segment).await
    }

    async fn delete_segment(&self, id: SegmentUuid) -> Result<(), CatalogError> {
        self.delete_segment_impl(id).await
    }

    async fn flush_collection_compaction(
        &self,
        req: CollectionFlushInfo,
    ) -> Result<FlushCompactionResponse, CatalogError> {
        self.flush_collection_compaction_impl(req).await
    }

    async fn flush_collection_compaction_and_attached_function(
        &self,
        req: CollectionFlushInfo,
        attached_function_update: AttachedFunctionUpdateInfo,
        run_nonce: uuid::Uuid,
    ) -> Result<FlushCompactionAndAttachedFunctionResponse, CatalogError> {
        self.flush_collection_compaction_and_attached_function_impl(req, attached_function_update, run_nonce)
            .await
    }

    async fn flush_collection_compaction_legacy(
        &self,
        req: CollectionFlushInfo,
    ) -> Result<FlushCompactionResponse, CatalogError> {
        self.flush_collection_compaction_legacy_impl(req).await
    }

    async fn list_collections_to_gc(
        &self,
        req: ListCollectionsToGcRequest,
    ) -> Result<Vec<CollectionToGcInfo>, CatalogError> {
        self.list_collections_to_gc_impl(req).await
    }

    async fn mark_version_for_deletion(
        &self,
        collection_id: CollectionUuid,
        versions: Vec<i64>,
    ) -> Result<(), CatalogError> {
        self.mark_version_for_deletion_impl(collection_id, versions).await
    }

    async fn delete_collection_version(
        &self,
        collection_id: CollectionUuid,
        versions: Vec<i64>,
    ) -> Result<(), CatalogError> {
        self.delete_collection_version_impl(collection_id, versions).await
    }

    async fn attach_function(
        &self,
        req: AttachFunctionRequest,
    ) -> Result<AttachedFunctionUuid, CatalogError> {
        self.attach_function_impl(req).await
    }

    async fn complete_attach(&self, id: AttachedFunctionUuid) -> Result<(), CatalogError> {
        self.complete_attach_impl(id).await
    }

    async fn get_attached_function_by_name(
        &self,
        input_collection_id: CollectionUuid,
        name: &str,
    ) -> Result<AttachedFunction, CatalogError> {
        self.get_attached_function_by_name_impl(input_collection_id, name).await
    }

    async fn list_attached_functions(
        &self,
        input_collection_id: CollectionUuid,
    ) -> Result<Vec<AttachedFunction>, CatalogError> {
        self.list_attached_functions_impl(input_collection_id).await
    }

    async fn detach_function(
        &self,
        input_collection_id: CollectionUuid,
        name: &str,
    ) -> Result<(), CatalogError> {
        self.detach_function_impl(input_collection_id, name).await
    }

    async fn advance_attached_function(
        &self,
        id: AttachedFunctionUuid,
        new_next_nonce: uuid::Uuid,
    ) -> Result<(), CatalogError> {
        self.advance_attached_function_impl(id, new_next_nonce).await
    }

    async fn cleanup_expired_partial_attached_functions(
        &self,
        max_age_secs: i64,
    ) -> Result<Vec<AttachedFunctionUuid>, CatalogError> {
        self.cleanup_expired_partial_attached_functions_impl(max_age_secs).await
    }
}
