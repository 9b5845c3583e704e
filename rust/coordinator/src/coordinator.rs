//! The stateless facade over `Catalog`: DTO validation, soft-vs-hard delete
//! policy, the three-phase attach protocol's heap push, and the composite
//! reads (`GetCollectionByResourceName`, `CheckCollections`,
//! `ListCollectionVersions`, the two `BatchGet*` calls) that have no direct
//! 1:1 DAO method. Modeled on the shape of `rust-sysdb/src/server.rs`'s
//! `SysdbService`, minus the tonic transport: every method here is a plain
//! async function a transport layer would wrap, not a generated RPC stub.

use crate::config::DeleteMode;
use crate::heap::{HeapClient, Triggerable};
use catalog_dao::{
    AttachFunctionRequest, Catalog, CollectionToGcInfo, CreateCollectionRequest,
    ForkCollectionRequest, ListCollectionsToGcRequest,
};
use catalog_storage::BlobStore;
use catalog_types::{
    validate_name, validate_non_empty_metadata, AttachedFunction, AttachedFunctionUpdateInfo,
    AttachedFunctionUuid, CatalogError, Collection, CollectionAndSegments,
    CollectionMetadataUpdate, CollectionUuid, Database, FlushCompactionAndAttachedFunctionResponse,
    FlushCompactionResponse, Segment, SegmentScope, SegmentUuid, Tenant,
};
use catalog_types::CollectionFlushInfo;
use std::sync::Arc;
use uuid::Uuid;

/// One entry of `ListCollectionVersions`: a single historical version of a
/// collection's segment layout, read straight out of its version file.
#[derive(Debug, Clone)]
pub struct CollectionVersionInfo {
    pub version: i64,
    pub created_at_secs: i64,
    pub change_reason: String,
    pub marked_for_deletion: bool,
}

#[derive(Debug, Clone)]
pub struct CollectionCheckResult {
    pub id: CollectionUuid,
    pub exists: bool,
    pub version: Option<i64>,
}

/// Stateless beyond the three handles below: every operation reads its
/// full state from `catalog`/`storage`/`heap_client` each call, so a
/// `Coordinator` is cheap to construct per-request or hold for a process
/// lifetime indifferently.
#[derive(Clone)]
pub struct Coordinator {
    catalog: Arc<dyn Catalog>,
    storage: BlobStore,
    heap_client: Option<Arc<dyn HeapClient>>,
    delete_mode: DeleteMode,
    version_file_enabled: bool,
}

impl Coordinator {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        storage: BlobStore,
        heap_client: Option<Arc<dyn HeapClient>>,
        delete_mode: DeleteMode,
    ) -> Self {
        Self::with_version_file_enabled(catalog, storage, heap_client, delete_mode, true)
    }

    /// Full constructor exposing the `version_file_enabled` knob (§6):
    /// `false` selects the legacy single-row-update flush path for every
    /// `flush_collection_compaction` call, with no version blob ever read
    /// or written. `Coordinator::new` defaults this on, matching
    /// `CoordinatorConfig::default_version_file_enabled`.
    pub fn with_version_file_enabled(
        catalog: Arc<dyn Catalog>,
        storage: BlobStore,
        heap_client: Option<Arc<dyn HeapClient>>,
        delete_mode: DeleteMode,
        version_file_enabled: bool,
    ) -> Self {
        Coordinator {
            catalog,
            storage,
            heap_client,
            delete_mode,
            version_file_enabled,
        }
    }

    // ---- Tenant ----------------------------------------------------

    pub async fn create_tenant(&self, name: &str) -> Result<Tenant, CatalogError> {
        validate_name(name)?;
        self.catalog.create_tenant(name).await
    }

    pub async fn get_tenant(&self, name: &str) -> Result<Tenant, CatalogError> {
        self.catalog.get_tenant(name).await
    }

    pub async fn set_tenant_resource_name(
        &self,
        name: &str,
        resource_name: &str,
    ) -> Result<(), CatalogError> {
        self.catalog.set_tenant_resource_name(name, resource_name).await
    }

    /// Not named in the RPC surface directly, but backs
    /// `GetCollectionByResourceName`'s tenant-resolution step; exposed so a
    /// caller can also look up a tenant by its resource name alone.
    pub async fn get_tenant_by_resource_name(&self, resource_name: &str) -> Result<Tenant, CatalogError> {
        self.catalog.get_tenant_by_resource_name(resource_name).await
    }

    // ---- Database ----------------------------------------------------

    pub async fn create_database(&self, name: &str, tenant: &str) -> Result<Database, CatalogError> {
        validate_name(name)?;
        self.catalog.create_database(Database::new(name, tenant)).await
    }

    pub async fn get_database(&self, name: &str, tenant: &str) -> Result<Database, CatalogError> {
        self.catalog.get_database(name, tenant).await
    }

    pub async fn list_databases(
        &self,
        tenant: &str,
        limit: Option<u32>,
        offset: u32,
    ) -> Result<Vec<Database>, CatalogError> {
        self.catalog.list_databases(tenant, limit, offset).await
    }

    pub async fn delete_database(&self, name: &str, tenant: &str) -> Result<(), CatalogError> {
        self.catalog.delete_database(name, tenant).await
    }

    pub async fn finish_database_deletion(&self, cutoff_secs: i64) -> Result<u64, CatalogError> {
        self.catalog.finish_database_deletion(cutoff_secs).await
    }

    // ---- Collection ----------------------------------------------------

    pub async fn create_collection(
        &self,
        req: CreateCollectionRequest,
    ) -> Result<(Collection, bool), CatalogError> {
        validate_name(&req.name)?;
        if let Some(metadata) = &req.metadata {
            validate_non_empty_metadata(metadata)?;
        }
        self.catalog.create_collection_and_segments(req).await
    }

    pub async fn get_collection(
        &self,
        id: CollectionUuid,
        include_soft_deleted: bool,
    ) -> Result<Collection, CatalogError> {
        self.catalog.get_collection(id, include_soft_deleted).await
    }

    pub async fn get_collection_by_name(
        &self,
        tenant: &str,
        database: &str,
        name: &str,
        include_soft_deleted: bool,
    ) -> Result<Collection, CatalogError> {
        self.catalog
            .get_collection_by_name(tenant, database, name, include_soft_deleted)
            .await
    }

    /// Resolves the owning tenant by its `resource_name`, then delegates
    /// to `get_collection_by_name`. The exact composite semantics here are
    /// not pinned down by name alone; a caller with no better identifying
    /// information than a tenant's external resource name needs both the
    /// database and collection name to land on one row, same as
    /// `GetCollection` needs a tenant name today.
    pub async fn get_collection_by_resource_name(
        &self,
        resource_name: &str,
        database: &str,
        name: &str,
        include_soft_deleted: bool,
    ) -> Result<Collection, CatalogError> {
        let tenant = self.catalog.get_tenant_by_resource_name(resource_name).await?;
        self.catalog
            .get_collection_by_name(&tenant.name, database, name, include_soft_deleted)
            .await
    }

    pub async fn list_collections(
        &self,
        tenant: &str,
        database: &str,
        limit: Option<u32>,
        offset: u32,
        include_soft_deleted: bool,
    ) -> Result<Vec<Collection>, CatalogError> {
        self.catalog
            .list_collections(tenant, database, limit, offset, include_soft_deleted)
            .await
    }

    pub async fn count_collections(&self, tenant: &str, database: &str) -> Result<u64, CatalogError> {
        self.catalog.count_collections(tenant, database).await
    }

    pub async fn get_collection_with_segments(
        &self,
        id: CollectionUuid,
    ) -> Result<CollectionAndSegments, CatalogError> {
        self.catalog.get_collection_with_segments(id).await
    }

    pub async fn update_collection(
        &self,
        id: CollectionUuid,
        name: Option<String>,
        metadata: Option<CollectionMetadataUpdate>,
        dimension: Option<i32>,
        configuration_json: Option<String>,
    ) -> Result<Collection, CatalogError> {
        if let Some(name) = &name {
            validate_name(name)?;
        }
        if let Some(CollectionMetadataUpdate::UpdateMetadata(metadata)) = &metadata {
            validate_non_empty_metadata(metadata)?;
        }
        self.catalog
            .update_collection(id, name, metadata, dimension, configuration_json)
            .await
    }

    /// Soft- or hard-deletes `id` depending on the configured `DeleteMode`.
    /// Soft-delete defers reclamation to the reaper; hard-delete (an
    /// operator/test-only mode) reclaims immediately.
    pub async fn delete_collection(&self, id: CollectionUuid) -> Result<(), CatalogError> {
        match self.delete_mode {
            DeleteMode::Soft => self.catalog.soft_delete_collection(id).await,
            DeleteMode::Hard => self.catalog.hard_delete_collection(id).await,
        }
    }

    pub async fn fork_collection(
        &self,
        req: ForkCollectionRequest,
    ) -> Result<CollectionAndSegments, CatalogError> {
        validate_name(&req.target_name)?;
        self.catalog.fork_collection(req).await
    }

    pub async fn count_forks(&self, any_collection_in_tree: CollectionUuid) -> Result<u64, CatalogError> {
        self.catalog.count_forks(any_collection_in_tree).await
    }

    /// A cheap existence + version probe, distinct from `GetCollection`'s
    /// error-on-not-found semantics: a missing collection reports
    /// `exists: false` rather than propagating `NotFound`, since callers
    /// (e.g. a compactor reconciling a worklist) use this to skip rows
    /// that vanished rather than treat that as their own failure.
    pub async fn check_collection(&self, id: CollectionUuid) -> CollectionCheckResult {
        match self.catalog.get_collection(id, true).await {
            Ok(collection) => CollectionCheckResult {
                id,
                exists: true,
                version: Some(collection.version),
            },
            Err(CatalogError::NotFound(_)) => CollectionCheckResult {
                id,
                exists: false,
                version: None,
            },
            Err(_) => CollectionCheckResult {
                id,
                exists: false,
                version: None,
            },
        }
    }

    // ---- Segment ----------------------------------------------------

    pub async fn create_segment(&self, segment: Segment) -> Result<Segment, CatalogError> {
        self.catalog.create_segment(segment).await
    }

    pub async fn get_segments(
        &self,
        collection: CollectionUuid,
        id: Option<SegmentUuid>,
        scope: Option<SegmentScope>,
    ) -> Result<Vec<Segment>, CatalogError> {
        self.catalog.get_segments(collection, id, scope).await
    }

    pub async fn update_segment(&self, segment: Segment) -> Result<Segment, CatalogError> {
        self.catalog.update_segment(segment).await
    }

    pub async fn delete_segment(&self, id: SegmentUuid) -> Result<(), CatalogError> {
        self.catalog.delete_segment(id).await
    }

    // ---- Compaction flush ----------------------------------------------------

    /// Selects the §4.4 versioned CAS flush or the deprecated
    /// `version_file_enabled=false` single-row fallback per the
    /// coordinator's own config knob; both share the same retry budget and
    /// CAS discipline, the legacy path just never touches a version blob.
    pub async fn flush_collection_compaction(
        &self,
        req: CollectionFlushInfo,
    ) -> Result<FlushCompactionResponse, CatalogError> {
        if self.version_file_enabled {
            self.catalog.flush_collection_compaction(req).await
        } else {
            self.catalog.flush_collection_compaction_legacy(req).await
        }
    }

    pub async fn flush_collection_compaction_and_attached_function(
        &self,
        req: CollectionFlushInfo,
        attached_function_update: AttachedFunctionUpdateInfo,
        run_nonce: Uuid,
    ) -> Result<FlushCompactionAndAttachedFunctionResponse, CatalogError> {
        self.catalog
            .flush_collection_compaction_and_attached_function(req, attached_function_update, run_nonce)
            .await
    }

    // ---- GC / version history ----------------------------------------------------

    pub async fn list_collections_to_gc(
        &self,
        req: ListCollectionsToGcRequest,
    ) -> Result<Vec<CollectionToGcInfo>, CatalogError> {
        self.catalog.list_collections_to_gc(req).await
    }

    /// Loads the collection's version file and returns every entry in its
    /// history, newest first, matching the order `ListCollectionVersions`
    /// callers (the GC candidate review tooling) expect to page through.
    pub async fn list_collection_versions(
        &self,
        id: CollectionUuid,
    ) -> Result<Vec<CollectionVersionInfo>, CatalogError> {
        let collection = self.catalog.get_collection(id, true).await?;
        let file = catalog_version::fetch(
            &self.storage,
            &collection.version_file_path,
            &collection.id.to_string(),
            collection.version,
        )
        .await?;
        let mut versions: Vec<CollectionVersionInfo> = file
            .version_history
            .map(|h| {
                h.versions
                    .into_iter()
                    .map(|v| CollectionVersionInfo {
                        version: v.version,
                        created_at_secs: v.created_at_secs,
                        change_reason: v.change_reason,
                        marked_for_deletion: v.marked_for_deletion,
                    })
                    .collect()
            })
            .unwrap_or_default();
        versions.sort_by_key(|v| std::cmp::Reverse(v.version));
        Ok(versions)
    }

    pub async fn mark_version_for_deletion(
        &self,
        collection_id: CollectionUuid,
        versions: Vec<i64>,
    ) -> Result<(), CatalogError> {
        self.catalog.mark_version_for_deletion(collection_id, versions).await
    }

    pub async fn delete_collection_version(
        &self,
        collection_id: CollectionUuid,
        versions: Vec<i64>,
    ) -> Result<(), CatalogError> {
        self.catalog.delete_collection_version(collection_id, versions).await
    }

    /// Resolves each collection's current `version_file_path` in one pass.
    /// Collections that error out (deleted mid-batch) are simply omitted
    /// rather than failing the whole batch, since a stale id in a batch
    /// request is an expected race, not a caller bug.
    pub async fn batch_get_collection_version_file_paths(
        &self,
        ids: &[CollectionUuid],
    ) -> Vec<(CollectionUuid, String)> {
        let mut out = Vec::with_capacity(ids.len());
        for &id in ids {
            if let Ok(collection) = self.catalog.get_collection(id, true).await {
                out.push((id, collection.version_file_path));
            }
        }
        out
    }

    /// Reports whether each requested collection is currently soft-deleted.
    /// A collection that does not exist at all is reported as soft-deleted
    /// too: from a caller's perspective (deciding whether to still route
    /// traffic to it) "gone" and "soft-deleted" call for the same response.
    pub async fn batch_get_collection_soft_delete_status(
        &self,
        ids: &[CollectionUuid],
    ) -> Vec<(CollectionUuid, bool)> {
        let mut out = Vec::with_capacity(ids.len());
        for &id in ids {
            let is_deleted = match self.catalog.get_collection(id, true).await {
                Ok(collection) => collection.is_deleted,
                Err(_) => true,
            };
            out.push((id, is_deleted));
        }
        out
    }

    // ---- Attach protocol ----------------------------------------------------

    /// Runs the full three-phase attach: Phase 0/1 (idempotent DB insert,
    /// `lowest_live_nonce = NULL`) happen inside `catalog.attach_function`;
    /// Phase 2 best-effort pushes `(partitioning=input_collection_id,
    /// scheduling=attached_function_id)` at the sentinel `MINIMAL_UUIDV7`
    /// nonce onto the external heap; Phase 3 (`complete_attach`) only runs if
    /// Phase 2 succeeds. A Phase 2 failure is swallowed: the row is left
    /// partial and `GetAttachedFunctionByName` reports `NotReady` until a
    /// retried `attach_function` call (or
    /// `CleanupExpiredPartialAttachedFunctions`) resolves it -- the client is
    /// expected to re-drive idempotently.
    pub async fn attach_function(
        &self,
        req: AttachFunctionRequest,
    ) -> Result<AttachedFunctionUuid, CatalogError> {
        let input_collection_id = req.input_collection_id;
        let id = self.catalog.attach_function(req).await?;

        if let Some(heap_client) = &self.heap_client {
            let trigger = Triggerable {
                partitioning: input_collection_id.0,
                scheduling: id.0,
            };
            let nonce = catalog_types::minimal_uuid_v7();
            if heap_client.push_schedule(trigger, nonce).await.is_ok() {
                self.catalog.complete_attach(id).await?;
            }
        }
        Ok(id)
    }

    pub async fn get_attached_function_by_name(
        &self,
        input_collection_id: CollectionUuid,
        name: &str,
    ) -> Result<AttachedFunction, CatalogError> {
        self.catalog.get_attached_function_by_name(input_collection_id, name).await
    }

    pub async fn list_attached_functions(
        &self,
        input_collection_id: CollectionUuid,
    ) -> Result<Vec<AttachedFunction>, CatalogError> {
        self.catalog.list_attached_functions(input_collection_id).await
    }

    pub async fn detach_function(
        &self,
        input_collection_id: CollectionUuid,
        name: &str,
    ) -> Result<(), CatalogError> {
        self.catalog.detach_function(input_collection_id, name).await
    }

    pub async fn cleanup_expired_partial_attached_functions(
        &self,
        max_age_secs: i64,
    ) -> Result<Vec<AttachedFunctionUuid>, CatalogError> {
        self.catalog.cleanup_expired_partial_attached_functions(max_age_secs).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::{AlwaysFailingHeapClient, InMemoryHeapClient};
    use catalog_dao::TestCatalog;

    async fn coordinator_with_heap(heap: Option<Arc<dyn HeapClient>>) -> (Coordinator, Arc<TestCatalog>) {
        let catalog = Arc::new(TestCatalog::new().await);
        let storage = catalog.storage().clone();
        catalog.create_tenant("t").await.unwrap();
        catalog.create_database(Database::new("d", "t")).await.unwrap();
        let coordinator = Coordinator::new(catalog.clone(), storage, heap, DeleteMode::Soft);
        (coordinator, catalog)
    }

    async fn create_collection(coordinator: &Coordinator) -> Collection {
        let (collection, _created) = coordinator
            .create_collection(CreateCollectionRequest {
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
        collection
    }

    #[tokio::test]
    async fn version_file_disabled_uses_the_legacy_flush_path() {
        let catalog = Arc::new(TestCatalog::new().await);
        let storage = catalog.storage().clone();
        catalog.create_tenant("t").await.unwrap();
        catalog.create_database(Database::new("d", "t")).await.unwrap();
        let coordinator = Coordinator::with_version_file_enabled(
            catalog.clone(),
            storage,
            None,
            DeleteMode::Soft,
            false,
        );
        let collection = create_collection(&coordinator).await;
        let before_path = collection.version_file_path.clone();

        let segments = coordinator
            .get_segments(collection.id, None, None)
            .await
            .unwrap();
        let segment_flush_info: Vec<catalog_types::SegmentFlushInfo> = segments
            .iter()
            .map(|s| catalog_types::SegmentFlushInfo {
                segment_id: s.id,
                file_paths: std::collections::HashMap::new(),
            })
            .collect();
        let resp = coordinator
            .flush_collection_compaction(CollectionFlushInfo {
                tenant_id: "t".to_string(),
                collection_id: collection.id,
                log_position: 5,
                expected_version: 0,
                segment_flush_info: std::sync::Arc::from(segment_flush_info),
                total_records_post_compaction: 1,
                size_bytes_post_compaction: 1,
            })
            .await
            .unwrap();
        assert_eq!(resp.collection_version, 1);

        let after = coordinator.get_collection(collection.id, false).await.unwrap();
        assert_eq!(
            after.version_file_path, before_path,
            "legacy flush path must never move the version-file pointer"
        );
    }

    #[tokio::test]
    async fn create_collection_rejects_invalid_names() {
        let (coordinator, _catalog) = coordinator_with_heap(None).await;
        let err = coordinator
            .create_collection(CreateCollectionRequest {
                tenant: "t".to_string(),
                database: "d".to_string(),
                id: None,
                name: "a".to_string(),
                segments: vec![],
                metadata: None,
                dimension: None,
                configuration_json: None,
                get_or_create: false,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Internal(_)));
    }

    #[tokio::test]
    async fn delete_collection_soft_deletes_by_default() {
        let (coordinator, catalog) = coordinator_with_heap(None).await;
        let collection = create_collection(&coordinator).await;
        coordinator.delete_collection(collection.id).await.unwrap();
        let deleted = catalog.get_collection(collection.id, true).await.unwrap();
        assert!(deleted.is_deleted);
    }

    #[tokio::test]
    async fn check_collection_reports_missing_rows_as_not_existing() {
        let (coordinator, _catalog) = coordinator_with_heap(None).await;
        let result = coordinator.check_collection(CollectionUuid::new()).await;
        assert!(!result.exists);
        assert_eq!(result.version, None);
    }

    #[tokio::test]
    async fn attach_without_a_heap_client_leaves_the_row_partial() {
        let (coordinator, _catalog) = coordinator_with_heap(None).await;
        let collection = create_collection(&coordinator).await;
        let function_id = catalog_types::FunctionUuid::new();

        let id = coordinator
            .attach_function(AttachFunctionRequest {
                input_collection_id: collection.id,
                name: "embed".to_string(),
                output_collection_name: "embed-out".to_string(),
                function_id,
                tenant_id: "t".to_string(),
                database_id: "d".to_string(),
                params_json: None,
                min_records_for_invocation: 1,
            })
            .await
            .unwrap();

        let err = coordinator
            .get_attached_function_by_name(collection.id, "embed")
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::NotReady(_)));
        let _ = id;
    }

    #[tokio::test]
    async fn attach_with_a_failing_heap_client_stays_partial_and_recovers_on_retry() {
        let (catalog, _) = (Arc::new(TestCatalog::new().await), ());
        catalog.create_tenant("t").await.unwrap();
        catalog.create_database(Database::new("d", "t")).await.unwrap();
        let storage = catalog.storage().clone();

        let failing = Coordinator::new(
            catalog.clone(),
            storage.clone(),
            Some(Arc::new(AlwaysFailingHeapClient) as Arc<dyn HeapClient>),
            DeleteMode::Soft,
        );
        let (collection, _) = failing
            .create_collection(CreateCollectionRequest {
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
        let function_id = catalog_types::FunctionUuid::new();
        let req = AttachFunctionRequest {
            input_collection_id: collection.id,
            name: "embed".to_string(),
            output_collection_name: "embed-out".to_string(),
            function_id,
            tenant_id: "t".to_string(),
            database_id: "d".to_string(),
            params_json: None,
            min_records_for_invocation: 1,
        };

        failing.attach_function(req.clone()).await.unwrap();
        let err = failing
            .get_attached_function_by_name(collection.id, "embed")
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::NotReady(_)));

        // Retrying against a working heap client recovers the same partial
        // row and completes it (S4: partial-attach recovery).
        let recovered = Coordinator::new(
            catalog.clone(),
            storage,
            Some(Arc::new(InMemoryHeapClient::new()) as Arc<dyn HeapClient>),
            DeleteMode::Soft,
        );
        recovered.attach_function(req).await.unwrap();
        let attached = recovered
            .get_attached_function_by_name(collection.id, "embed")
            .await
            .unwrap();
        assert!(!attached.is_partial());
    }
}
