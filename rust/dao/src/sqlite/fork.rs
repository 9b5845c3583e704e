use super::collection::{fetch_collection_segments_tx, insert_collection_row, insert_segment_row, row_to_collection};
use super::{map_sqlx_err, now_secs, SqliteCatalog};
use crate::requests::ForkCollectionRequest;
use catalog_proto::{LineageDependency, LineageFile};
use catalog_types::{CatalogError, Collection, CollectionAndSegments, CollectionUuid, Segment, SegmentUuid};
use prost::Message;
use sqlx::Row;

const MAX_LINEAGE_DEPENDENCIES: usize = 1_000_000;

impl SqliteCatalog {
    pub(crate) async fn fork_collection_impl(
        &self,
        req: ForkCollectionRequest,
    ) -> Result<CollectionAndSegments, CatalogError> {
        catalog_types::validate_name(&req.target_name)?;

        let mut tx = self.db.get_conn().begin().await.map_err(map_sqlx_err)?;
        self.db.begin_immediate(&mut *tx).await.map_err(map_sqlx_err)?;

        // Locking order: source first, then root (if different), matching
        // hard-delete's order so the two protocols never deadlock.
        let source_row = sqlx::query("SELECT * FROM collections WHERE id = $1")
            .bind(req.source_collection_id.to_string())
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_sqlx_err)?
            .ok_or_else(|| CatalogError::NotFound(format!("collection {}", req.source_collection_id)))?;
        let source = row_to_collection(&source_row)?;
        if source.is_deleted {
            return Err(CatalogError::NotFound(format!("collection {}", req.source_collection_id)));
        }

        let root_id = source.root_collection_id.unwrap_or(source.id);
        let root = if root_id != source.id {
            let root_row = sqlx::query("SELECT * FROM collections WHERE id = $1")
                .bind(root_id.to_string())
                .fetch_optional(&mut *tx)
                .await
                .map_err(map_sqlx_err)?
                .ok_or_else(|| CatalogError::NotFound(format!("collection {root_id}")))?;
            row_to_collection(&root_row)?
        } else {
            source.clone()
        };

        if source.log_position > req.source_enumeration_offset {
            return Err(CatalogError::LogPositionStale {
                requested: req.source_enumeration_offset,
                current: source.log_position,
            });
        }
        if source.log_position < req.source_compaction_offset {
            tracing::error!(
                collection_id = %source.id,
                log_position = source.log_position,
                source_compaction_offset = req.source_compaction_offset,
                "fork source log position precedes its own compaction offset"
            );
            return Err(CatalogError::OffsetAheadOfSource {
                requested: req.source_compaction_offset,
                source: source.log_position,
            });
        }

        let source_segments = fetch_collection_segments_tx(&mut tx, source.id).await?;

        let mut target = Collection::new(req.target_name.clone(), source.tenant_id.clone(), source.database_id, now_secs());
        target.root_collection_id = Some(root_id);
        target.dimension = source.dimension;
        target.configuration_json = source.configuration_json.clone();
        target.schema_json = source.schema_json.clone();
        target.version = source.version;
        target.version_file_path = source.version_file_path.clone();
        target.log_position = source.log_position;
        target.total_records_post_compaction = source.total_records_post_compaction;
        target.size_bytes_post_compaction = source.size_bytes_post_compaction;
        target.last_compaction_time_secs = source.last_compaction_time_secs;
        target.num_versions = source.num_versions;
        target.oldest_version_ts = source.oldest_version_ts;

        let name_conflict = sqlx::query(
            "SELECT id FROM collections WHERE database_id = $1 AND name = $2 AND is_deleted = FALSE",
        )
        .bind(target.database_id.to_string())
        .bind(&req.target_name)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_err)?;
        if name_conflict.is_some() {
            return Err(CatalogError::AlreadyExists(format!(
                "collection {} already exists in database {}",
                req.target_name, target.database_id
            )));
        }

        insert_collection_row(&mut tx, &target).await?;

        let mut target_segments = Vec::with_capacity(source_segments.len());
        for source_segment in &source_segments {
            let mut new_segment = Segment::new(target.id, source_segment.r#type.clone(), source_segment.scope.clone());
            new_segment.id = SegmentUuid::new();
            new_segment.file_paths = source_segment.file_paths.clone();
            new_segment.metadata = source_segment.metadata.clone();
            insert_segment_row(&mut tx, &target.id, &new_segment).await?;
            target_segments.push(new_segment);
        }

        let lineage_file = if let Some(path) = &root.lineage_file_path {
            let bytes = self.storage.get(path).await.map_err(|e| {
                CatalogError::Internal(format!("failed to fetch lineage file at {path}: {e}"))
            })?;
            LineageFile::decode(bytes.as_slice())
                .map_err(|e| CatalogError::Internal(format!("failed to decode lineage file: {e}")))?
        } else {
            LineageFile { dependencies: vec![] }
        };

        let mut dependencies = lineage_file.dependencies;
        if dependencies.len() >= MAX_LINEAGE_DEPENDENCIES {
            return Err(CatalogError::TooManyForks { cap: MAX_LINEAGE_DEPENDENCIES as u64 });
        }
        dependencies.push(LineageDependency {
            source_collection_id: source.id.to_string(),
            source_version: source.version,
            target_collection_id: target.id.to_string(),
        });
        let updated_lineage = LineageFile { dependencies };

        let lineage_path = format!(
            "tenant/{}/database/{}/collection/{}/lineagefiles/{}.binpb",
            root.tenant_id, root.database_id, root.id, uuid::Uuid::now_v7()
        );
        self.storage
            .put_bytes(&lineage_path, updated_lineage.encode_to_vec(), catalog_storage::PutOptions::default())
            .await
            .map_err(|e| CatalogError::Internal(format!("failed to upload lineage file: {e}")))?;

        sqlx::query("UPDATE collections SET lineage_file_path = $1 WHERE id = $2")
            .bind(&lineage_path)
            .bind(root.id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_err)?;

        tx.commit().await.map_err(map_sqlx_err)?;

        let segments_by_scope = |scope: catalog_types::SegmentScope| {
            target_segments
                .iter()
                .find(|s| s.scope == scope)
                .cloned()
                .ok_or_else(|| CatalogError::Internal(format!("forked collection {} missing a segment", target.id)))
        };

        Ok(CollectionAndSegments {
            collection: target,
            metadata_segment: segments_by_scope(catalog_types::SegmentScope::Metadata)?,
            record_segment: segments_by_scope(catalog_types::SegmentScope::Record)?,
            vector_segment: segments_by_scope(catalog_types::SegmentScope::Vector)?,
        })
    }

    pub(crate) async fn count_forks_impl(&self, any_collection_in_tree: CollectionUuid) -> Result<u64, CatalogError> {
        let row = sqlx::query("SELECT id, root_collection_id, lineage_file_path FROM collections WHERE id = $1")
            .bind(any_collection_in_tree.to_string())
            .fetch_optional(self.db.get_conn())
            .await
            .map_err(map_sqlx_err)?
            .ok_or_else(|| CatalogError::NotFound(format!("collection {any_collection_in_tree}")))?;

        let root_collection_id: Option<String> = row.get("root_collection_id");
        let root_id = match root_collection_id {
            Some(id) => id,
            None => row.get("id"),
        };

        let lineage_path: Option<String> = sqlx::query("SELECT lineage_file_path FROM collections WHERE id = $1")
            .bind(&root_id)
            .fetch_one(self.db.get_conn())
            .await
            .map_err(map_sqlx_err)?
            .get("lineage_file_path");

        let Some(path) = lineage_path else {
            return Ok(0);
        };

        let bytes = self
            .storage
            .get(&path)
            .await
            .map_err(|e| CatalogError::Internal(format!("failed to fetch lineage file at {path}: {e}")))?;
        let lineage = LineageFile::decode(bytes.as_slice())
            .map_err(|e| CatalogError::Internal(format!("failed to decode lineage file: {e}")))?;
        Ok(lineage.dependencies.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::test_support::{create_test_collection, new_catalog};

    #[tokio::test]
    async fn fork_copies_offsets_and_registers_one_lineage_dependency() {
        let catalog = new_catalog().await;
        let source = create_test_collection(&catalog, "t1", "d1", "source").await;

        let forked = catalog
            .fork_collection_impl(ForkCollectionRequest {
                source_collection_id: source.id,
                target_name: "fork-1".to_string(),
                source_compaction_offset: 0,
                source_enumeration_offset: 0,
            })
            .await
            .unwrap();

        assert_eq!(forked.collection.log_position, source.log_position);
        assert_eq!(forked.collection.root_collection_id, Some(source.id));
        assert_eq!(catalog.count_forks_impl(source.id).await.unwrap(), 1);
        assert_eq!(catalog.count_forks_impl(forked.collection.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn fork_rejects_enumeration_offset_behind_current_log_position() {
        let catalog = new_catalog().await;
        let source = create_test_collection(&catalog, "t1", "d1", "source").await;
        // Advance log_position past 0 by updating the row directly (no
        // flush blob needed for this check, which runs before any blob IO).
        sqlx::query("UPDATE collections SET log_position = 5 WHERE id = $1")
            .bind(source.id.to_string())
            .execute(catalog.db.get_conn())
            .await
            .unwrap();

        let err = catalog
            .fork_collection_impl(ForkCollectionRequest {
                source_collection_id: source.id,
                target_name: "fork-1".to_string(),
                source_compaction_offset: 0,
                source_enumeration_offset: 0,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::LogPositionStale { .. }));
    }

    #[tokio::test]
    async fn fork_rejects_compaction_offset_ahead_of_source_log_position() {
        let catalog = new_catalog().await;
        let source = create_test_collection(&catalog, "t1", "d1", "source").await;

        let err = catalog
            .fork_collection_impl(ForkCollectionRequest {
                source_collection_id: source.id,
                target_name: "fork-1".to_string(),
                source_compaction_offset: 5,
                source_enumeration_offset: 5,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::OffsetAheadOfSource { .. }));
    }

    #[tokio::test]
    async fn second_fork_of_the_same_root_brings_lineage_count_to_two() {
        let catalog = new_catalog().await;
        let source = create_test_collection(&catalog, "t1", "d1", "source").await;

        catalog
            .fork_collection_impl(ForkCollectionRequest {
                source_collection_id: source.id,
                target_name: "fork-1".to_string(),
                source_compaction_offset: 0,
                source_enumeration_offset: 0,
            })
            .await
            .unwrap();
        catalog
            .fork_collection_impl(ForkCollectionRequest {
                source_collection_id: source.id,
                target_name: "fork-2".to_string(),
                source_compaction_offset: 0,
                source_enumeration_offset: 0,
            })
            .await
            .unwrap();

        assert_eq!(catalog.count_forks_impl(source.id).await.unwrap(), 2);
    }
}
