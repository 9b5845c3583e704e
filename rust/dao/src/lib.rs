//! Typed DAO surface over the relational catalog, plus the higher-level
//! protocols (collection creation, compaction flush, fork/lineage, delete
//! lifecycle, attach) that are built directly on top of it.
//!
//! `Catalog` is the seam: a future second relational backend would only
//! need to provide a new implementor, never touch the Coordinator Facade.

mod requests;
mod sqlite;
mod test_catalog;

pub use requests::*;
pub use sqlite::SqliteCatalog;
pub use test_catalog::TestCatalog;

use async_trait::async_trait;
use catalog_types::{
    AttachedFunction, AttachedFunctionUpdateInfo, AttachedFunctionUuid, CatalogError, Collection,
    CollectionAndSegments, CollectionMetadataUpdate, CollectionUuid, Database,
    FlushCompactionAndAttachedFunctionResponse, FlushCompactionResponse, Segment, SegmentScope,
    SegmentUuid, Tenant,
};

/// The full DAO + protocol surface. Every method here corresponds to an
/// entry in the coordinator's RPC surface; the Coordinator Facade is a thin
/// DTO/validation layer over this trait and never touches SQL directly.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn create_tenant(&self, name: &str) -> Result<Tenant, CatalogError>;
    async fn get_tenant(&self, name: &str) -> Result<Tenant, CatalogError>;
    /// Binds a globally-unique `resource_name` to an existing tenant.
    async fn set_tenant_resource_name(
        &self,
        name: &str,
        resource_name: &str,
    ) -> Result<(), CatalogError>;
    async fn get_tenant_by_resource_name(&self, resource_name: &str) -> Result<Tenant, CatalogError>;

    async fn create_database(&self, database: Database) -> Result<Database, CatalogError>;
    async fn get_database(&self, name: &str, tenant: &str) -> Result<Database, CatalogError>;
    async fn list_databases(
        &self,
        tenant: &str,
        limit: Option<u32>,
        offset: u32,
    ) -> Result<Vec<Database>, CatalogError>;
    async fn delete_database(&self, name: &str, tenant: &str) -> Result<(), CatalogError>;
    /// Deletes database rows whose soft-delete is older than `cutoff_secs`
    /// and that have no remaining live or soft-deleted collections.
    async fn finish_database_deletion(&self, cutoff_secs: i64) -> Result<u64, CatalogError>;

    async fn create_collection_and_segments(
        &self,
        req: CreateCollectionRequest,
    ) -> Result<(Collection, bool), CatalogError>;
    async fn get_collection(
        &self,
        id: CollectionUuid,
        include_soft_deleted: bool,
    ) -> Result<Collection, CatalogError>;
    async fn get_collection_by_name(
        &self,
        tenant: &str,
        database: &str,
        name: &str,
        include_soft_deleted: bool,
    ) -> Result<Collection, CatalogError>;
    async fn list_collections(
        &self,
        tenant: &str,
        database: &str,
        limit: Option<u32>,
        offset: u32,
        include_soft_deleted: bool,
    ) -> Result<Vec<Collection>, CatalogError>;
    async fn count_collections(&self, tenant: &str, database: &str) -> Result<u64, CatalogError>;
    /// Reaper candidate listing: soft-deleted, fork-root-free collections
    /// older than `max_age_cutoff_secs`, oldest first.
    async fn list_soft_deleted_collections_for_reaping(
        &self,
        max_age_cutoff_secs: i64,
        limit: u32,
    ) -> Result<Vec<Collection>, CatalogError>;
    async fn get_collection_with_segments(
        &self,
        id: CollectionUuid,
    ) -> Result<CollectionAndSegments, CatalogError>;
    /// `configuration_json`, when present, is merged into the collection's
    /// stored configuration rather than replacing it outright: see
    /// `merge_configuration_json` for the HNSW/SPANN conflict rule.
    async fn update_collection(
        &self,
        id: CollectionUuid,
        name: Option<String>,
        metadata: Option<CollectionMetadataUpdate>,
        dimension: Option<i32>,
        configuration_json: Option<String>,
    ) -> Result<Collection, CatalogError>;
    async fn soft_delete_collection(&self, id: CollectionUuid) -> Result<(), CatalogError>;
    async fn hard_delete_collection(&self, id: CollectionUuid) -> Result<(), CatalogError>;
    async fn fork_collection(
        &self,
        req: ForkCollectionRequest,
    ) -> Result<CollectionAndSegments, CatalogError>;
    async fn count_forks(&self, any_collection_in_tree: CollectionUuid) -> Result<u64, CatalogError>;

    async fn create_segment(&self, segment: Segment) -> Result<Segment, CatalogError>;
    async fn get_segments(
        &self,
        collection: CollectionUuid,
        id: Option<SegmentUuid>,
        scope: Option<SegmentScope>,
    ) -> Result<Vec<Segment>, CatalogError>;
    async fn update_segment(&self, segment: Segment) -> Result<Segment, CatalogError>;
    async fn delete_segment(&self, id: SegmentUuid) -> Result<(), CatalogError>;

    async fn flush_collection_compaction(
        &self,
        req: catalog_types::CollectionFlushInfo,
    ) -> Result<FlushCompactionResponse, CatalogError>;
    async fn flush_collection_compaction_and_attached_function(
        &self,
        req: catalog_types::CollectionFlushInfo,
        attached_function_update: AttachedFunctionUpdateInfo,
        run_nonce: uuid::Uuid,
    ) -> Result<FlushCompactionAndAttachedFunctionResponse, CatalogError>;
    /// The `version_file_enabled=false` fallback: a single CAS'd row update
    /// with no version blob write or read. Superseded by
    /// `flush_collection_compaction` but kept for compatibility; the
    /// coordinator selects between them per its `version_file_enabled`
    /// config knob.
    async fn flush_collection_compaction_legacy(
        &self,
        req: catalog_types::CollectionFlushInfo,
    ) -> Result<FlushCompactionResponse, CatalogError>;

    async fn list_collections_to_gc(
        &self,
        req: ListCollectionsToGcRequest,
    ) -> Result<Vec<CollectionToGcInfo>, CatalogError>;
    async fn mark_version_for_deletion(
        &self,
        collection_id: CollectionUuid,
        versions: Vec<i64>,
    ) -> Result<(), CatalogError>;
    async fn delete_collection_version(
        &self,
        collection_id: CollectionUuid,
        versions: Vec<i64>,
    ) -> Result<(), CatalogError>;

    /// Phases 0+1 of the attach protocol (the idempotency check and the DB
    /// insert). The row comes back with `lowest_live_nonce = NULL`; the
    /// caller (the coordinator) still owes a heap push and a
    /// `complete_attach` call before `GetAttachedFunctionByName` will
    /// succeed for it.
    async fn attach_function(
        &self,
        req: AttachFunctionRequest,
    ) -> Result<AttachedFunctionUuid, CatalogError>;
    /// Phase 3: marks a partial attachment live once its heap push has
    /// succeeded.
    async fn complete_attach(&self, id: AttachedFunctionUuid) -> Result<(), CatalogError>;
    async fn get_attached_function_by_name(
        &self,
        input_collection_id: CollectionUuid,
        name: &str,
    ) -> Result<AttachedFunction, CatalogError>;
    async fn list_attached_functions(
        &self,
        input_collection_id: CollectionUuid,
    ) -> Result<Vec<AttachedFunction>, CatalogError>;
    async fn detach_function(
        &self,
        input_collection_id: CollectionUuid,
        name: &str,
    ) -> Result<(), CatalogError>;
    async fn advance_attached_function(
        &self,
        id: AttachedFunctionUuid,
        new_next_nonce: uuid::Uuid,
    ) -> Result<(), CatalogError>;
    async fn cleanup_expired_partial_attached_functions(
        &self,
        max_age_secs: i64,
    ) -> Result<Vec<AttachedFunctionUuid>, CatalogError>;
}
