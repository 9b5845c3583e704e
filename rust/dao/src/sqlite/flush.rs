use super::collection::{fetch_collection_segments, row_to_collection};
use super::{map_sqlx_err, now_secs, SqliteCatalog};
use catalog_types::{
    AttachedFunctionUpdateInfo, CatalogError, CollectionFlushInfo,
    FlushCompactionAndAttachedFunctionResponse, FlushCompactionResponse,
};
use sqlx::{Executor, Row};

const MAX_FLUSH_ATTEMPTS: u32 = 10;

impl SqliteCatalog {
    pub(crate) async fn flush_collection_compaction_impl(
        &self,
        req: CollectionFlushInfo,
    ) -> Result<FlushCompactionResponse, CatalogError> {
        for attempt in 0..MAX_FLUSH_ATTEMPTS {
            match self.try_flush_compaction(&req, None, None).await {
                Ok(FlushOutcome::Response(resp, _)) => return Ok(resp),
                Ok(FlushOutcome::AttachedFunctionResponse(..)) => unreachable!("flush_collection_compaction never requests the attached-function variant"),
                Err(CatalogError::EntryStale(_)) => {
                    tracing::warn!(attempt, collection_id = %req.collection_id, "compaction flush CAS miss, retrying");
                    continue;
                }
                Err(other) => return Err(other),
            }
        }
        Err(CatalogError::Internal(format!(
            "flush_collection_compaction: max attempts ({MAX_FLUSH_ATTEMPTS}) reached for collection {}",
            req.collection_id
        )))
    }

    pub(crate) async fn flush_collection_compaction_and_attached_function_impl(
        &self,
        req: CollectionFlushInfo,
        attached_function_update: AttachedFunctionUpdateInfo,
        run_nonce: uuid::Uuid,
    ) -> Result<FlushCompactionAndAttachedFunctionResponse, CatalogError> {
        for attempt in 0..MAX_FLUSH_ATTEMPTS {
            match self
                .try_flush_compaction(&req, Some(&attached_function_update), Some(run_nonce))
                .await
            {
                Ok(FlushOutcome::AttachedFunctionResponse(resp)) => return Ok(resp),
                Ok(FlushOutcome::Response(..)) => unreachable!("attached-function flush always requests that variant"),
                Err(CatalogError::EntryStale(_)) => {
                    tracing::warn!(attempt, collection_id = %req.collection_id, "compaction flush CAS miss, retrying");
                    continue;
                }
                Err(other) => return Err(other),
            }
        }
        Err(CatalogError::Internal(format!(
            "flush_collection_compaction_and_attached_function: max attempts ({MAX_FLUSH_ATTEMPTS}) reached for collection {}",
            req.collection_id
        )))
    }

    /// `version_file_enabled=false` fallback: advances `version` and the
    /// compaction stats with a single CAS'd row update. No version blob is
    /// read, built, or written, and `version_file_path` is left untouched —
    /// a collection flushed this way never accumulates version history.
    pub(crate) async fn flush_collection_compaction_legacy_impl(
        &self,
        req: CollectionFlushInfo,
    ) -> Result<FlushCompactionResponse, CatalogError> {
        for attempt in 0..MAX_FLUSH_ATTEMPTS {
            match self.try_flush_compaction_legacy(&req).await {
                Ok(resp) => return Ok(resp),
                Err(CatalogError::EntryStale(_)) => {
                    tracing::warn!(attempt, collection_id = %req.collection_id, "legacy compaction flush CAS miss, retrying");
                    continue;
                }
                Err(other) => return Err(other),
            }
        }
        Err(CatalogError::Internal(format!(
            "flush_collection_compaction_legacy: max attempts ({MAX_FLUSH_ATTEMPTS}) reached for collection {}",
            req.collection_id
        )))
    }

    async fn try_flush_compaction_legacy(
        &self,
        req: &CollectionFlushInfo,
    ) -> Result<FlushCompactionResponse, CatalogError> {
        let row = sqlx::query("SELECT * FROM collections WHERE id = $1")
            .bind(req.collection_id.to_string())
            .fetch_optional(self.db.get_conn())
            .await
            .map_err(map_sqlx_err)?
            .ok_or_else(|| CatalogError::NotFound(format!("collection {}", req.collection_id)))?;
        let collection = row_to_collection(&row)?;
        if collection.is_deleted {
            return Err(CatalogError::SoftDeleted(collection.id.to_string()));
        }

        let current_version = collection.version;
        let expected_version = req.expected_version;
        if current_version > expected_version {
            return Err(CatalogError::VersionStale { expected: expected_version, got: current_version });
        }
        if current_version < expected_version {
            return Err(CatalogError::VersionInvalid { expected: expected_version, got: current_version });
        }

        let new_version = current_version + 1;
        let last_compaction_time_secs = now_secs();

        let mut tx = self.db.get_conn().begin().await.map_err(map_sqlx_err)?;
        self.db.begin_immediate(&mut *tx).await.map_err(map_sqlx_err)?;

        tx.execute(
            sqlx::query("UPDATE tenants SET last_compaction_time_secs = $1 WHERE name = $2")
                .bind(last_compaction_time_secs)
                .bind(&req.tenant_id),
        )
        .await
        .map_err(map_sqlx_err)?;

        let result = tx
            .execute(
                sqlx::query(
                    "UPDATE collections SET \
                        version = $1, log_position = $2, \
                        total_records_post_compaction = $3, size_bytes_post_compaction = $4, \
                        last_compaction_time_secs = $5, updated_at_secs = $6 \
                     WHERE id = $7 AND version = $8",
                )
                .bind(new_version)
                .bind(req.log_position)
                .bind(req.total_records_post_compaction as i64)
                .bind(req.size_bytes_post_compaction as i64)
                .bind(last_compaction_time_secs)
                .bind(last_compaction_time_secs)
                .bind(collection.id.to_string())
                .bind(current_version),
            )
            .await
            .map_err(map_sqlx_err)?;

        if result.rows_affected() == 0 {
            return Err(CatalogError::EntryStale(format!(
                "collection {} version moved under us",
                collection.id
            )));
        }

        tx.commit().await.map_err(map_sqlx_err)?;

        Ok(FlushCompactionResponse {
            collection_id: collection.id,
            collection_version: new_version,
            last_compaction_time_secs,
        })
    }

    async fn try_flush_compaction(
        &self,
        req: &CollectionFlushInfo,
        attached_function_update: Option<&AttachedFunctionUpdateInfo>,
        run_nonce: Option<uuid::Uuid>,
    ) -> Result<FlushOutcome, CatalogError> {
        let row = sqlx::query("SELECT * FROM collections WHERE id = $1")
            .bind(req.collection_id.to_string())
            .fetch_optional(self.db.get_conn())
            .await
            .map_err(map_sqlx_err)?
            .ok_or_else(|| CatalogError::NotFound(format!("collection {}", req.collection_id)))?;
        let collection = row_to_collection(&row)?;
        if collection.is_deleted {
            return Err(CatalogError::SoftDeleted(collection.id.to_string()));
        }

        let current_version = collection.version;
        let expected_version = req.expected_version;
        if current_version > expected_version {
            return Err(CatalogError::VersionStale { expected: expected_version, got: current_version });
        }
        if current_version < expected_version {
            tracing::error!(
                collection_id = %req.collection_id,
                current_version,
                expected_version,
                "flush request references a version ahead of the stored row"
            );
            return Err(CatalogError::VersionInvalid { expected: expected_version, got: current_version });
        }

        let current_segments = fetch_collection_segments(self.db.get_conn(), collection.id).await?;

        let version_file = if collection.version_file_path.is_empty() {
            catalog_version::build_initial(&collection, &current_segments, collection.created_at_secs)
        } else {
            catalog_version::fetch(
                &self.storage,
                &collection.version_file_path,
                &collection.id.to_string(),
                current_version,
            )
            .await?
        };

        let new_version = current_version + 1;
        let updated_file = catalog_version::append_version(&version_file, req, &current_segments, now_secs())?;
        let new_path = catalog_version::upload(
            &self.storage,
            &updated_file,
            new_version,
            Some(catalog_version::VersionFileOp::Compaction),
        )
        .await
        .map_err(|e| CatalogError::Internal(format!("failed to upload compaction version blob: {e}")))?;

        let num_active_versions = catalog_version::active_version_count(&updated_file);

        let mut tx = self.db.get_conn().begin().await.map_err(map_sqlx_err)?;
        self.db.begin_immediate(&mut *tx).await.map_err(map_sqlx_err)?;

        for flush_info in req.segment_flush_info.iter() {
            tx.execute(
                sqlx::query("DELETE FROM segment_file_paths WHERE segment_id = $1")
                    .bind(flush_info.segment_id.to_string()),
            )
            .await
            .map_err(map_sqlx_err)?;
            for (role, paths) in &flush_info.file_paths {
                for (position, path) in paths.iter().enumerate() {
                    tx.execute(
                        sqlx::query(
                            "INSERT INTO segment_file_paths (segment_id, role, position, path) VALUES ($1,$2,$3,$4)",
                        )
                        .bind(flush_info.segment_id.to_string())
                        .bind(role)
                        .bind(position as i64)
                        .bind(path),
                    )
                    .await
                    .map_err(map_sqlx_err)?;
                }
            }
        }

        let last_compaction_time_secs = now_secs();
        tx.execute(
            sqlx::query("UPDATE tenants SET last_compaction_time_secs = $1 WHERE name = $2")
                .bind(last_compaction_time_secs)
                .bind(&req.tenant_id),
        )
        .await
        .map_err(map_sqlx_err)?;

        if let (Some(update), Some(run_nonce)) = (attached_function_update, run_nonce) {
            let result = tx
                .execute(
                    sqlx::query(
                        "UPDATE attached_functions SET completion_offset = $1, updated_at_secs = $2 \
                         WHERE id = $3 AND next_nonce = $4",
                    )
                    .bind(update.completion_offset as i64)
                    .bind(last_compaction_time_secs)
                    .bind(update.attached_function_id.to_string())
                    .bind(run_nonce.to_string()),
                )
                .await
                .map_err(map_sqlx_err)?;
            if result.rows_affected() == 0 {
                // Not a CAS race on the collection row: the caller's run_nonce
                // itself is wrong. Retrying the outer loop would just spend
                // the flush's version-blob writes against a run that will
                // never match, so this must fail the compound outright.
                return Err(CatalogError::RunNonceStale(format!(
                    "attached function {} run_nonce mismatch",
                    update.attached_function_id
                )));
            }
        }

        let oldest_version_ts = catalog_version::oldest_active_version_ts(&updated_file);
        let result = tx
            .execute(
                sqlx::query(
                    "UPDATE collections SET \
                        version = $1, version_file_path = $2, log_position = $3, \
                        total_records_post_compaction = $4, size_bytes_post_compaction = $5, \
                        last_compaction_time_secs = $6, num_versions = $7, oldest_version_ts = $8, \
                        updated_at_secs = $9 \
                     WHERE id = $10 AND version = $11 AND version_file_path = $12",
                )
                .bind(new_version)
                .bind(&new_path)
                .bind(req.log_position)
                .bind(req.total_records_post_compaction as i64)
                .bind(req.size_bytes_post_compaction as i64)
                .bind(last_compaction_time_secs)
                .bind(num_active_versions)
                .bind(oldest_version_ts)
                .bind(last_compaction_time_secs)
                .bind(collection.id.to_string())
                .bind(current_version)
                .bind(&collection.version_file_path),
            )
            .await
            .map_err(map_sqlx_err)?;

        if result.rows_affected() == 0 {
            return Err(CatalogError::EntryStale(format!(
                "collection {} version pointer moved under us",
                collection.id
            )));
        }

        tx.commit().await.map_err(map_sqlx_err)?;

        if let Some(update) = attached_function_update {
            let completion_offset_row = sqlx::query("SELECT completion_offset FROM attached_functions WHERE id = $1")
                .bind(update.attached_function_id.to_string())
                .fetch_one(self.db.get_conn())
                .await
                .map_err(map_sqlx_err)?;
            let completion_offset: i64 = completion_offset_row.get("completion_offset");
            return Ok(FlushOutcome::AttachedFunctionResponse(
                FlushCompactionAndAttachedFunctionResponse {
                    collections: vec![FlushCompactionResponse {
                        collection_id: collection.id,
                        collection_version: new_version,
                        last_compaction_time_secs,
                    }],
                    completion_offset: completion_offset as u64,
                },
            ));
        }

        Ok(FlushOutcome::Response(
            FlushCompactionResponse {
                collection_id: collection.id,
                collection_version: new_version,
                last_compaction_time_secs,
            },
            num_active_versions,
        ))
    }
}

enum FlushOutcome {
    Response(FlushCompactionResponse, i64),
    AttachedFunctionResponse(FlushCompactionAndAttachedFunctionResponse),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::test_support::create_test_collection;
    use catalog_types::{SegmentFlushInfo, SegmentUuid};
    use std::collections::HashMap;
    use std::sync::Arc;

    fn flush_info(collection: &catalog_types::Collection, segment_ids: &[SegmentUuid], version: i64) -> CollectionFlushInfo {
        let segment_flush_info: Vec<SegmentFlushInfo> = segment_ids
            .iter()
            .map(|id| {
                let mut file_paths = HashMap::new();
                file_paths.insert("data".to_string(), vec![format!("blocks/{id}")]);
                SegmentFlushInfo { segment_id: *id, file_paths }
            })
            .collect();
        CollectionFlushInfo {
            tenant_id: collection.tenant_id.clone(),
            collection_id: collection.id,
            log_position: 10,
            expected_version: version,
            segment_flush_info: Arc::from(segment_flush_info),
            total_records_post_compaction: 100,
            size_bytes_post_compaction: 2048,
        }
    }

    #[tokio::test]
    async fn flush_advances_version_and_moves_pointer_together() {
        let catalog = crate::sqlite::test_support::new_catalog().await;
        let collection = create_test_collection(&catalog, "t1", "d1", "c1").await;
        let segments = catalog.get_segments_impl(collection.id, None, None).await.unwrap();
        let ids: Vec<_> = segments.iter().map(|s| s.id).collect();

        let before_path = collection.version_file_path.clone();
        let resp = catalog
            .flush_collection_compaction_impl(flush_info(&collection, &ids, 0))
            .await
            .unwrap();
        assert_eq!(resp.collection_version, 1);

        let after = catalog.get_collection_impl(collection.id, false).await.unwrap();
        assert_eq!(after.version, 1);
        assert_ne!(after.version_file_path, before_path, "version and pointer must move together");
    }

    #[tokio::test]
    async fn flush_rejects_stale_expected_version() {
        let catalog = crate::sqlite::test_support::new_catalog().await;
        let collection = create_test_collection(&catalog, "t1", "d1", "c1").await;
        let segments = catalog.get_segments_impl(collection.id, None, None).await.unwrap();
        let ids: Vec<_> = segments.iter().map(|s| s.id).collect();

        catalog
            .flush_collection_compaction_impl(flush_info(&collection, &ids, 0))
            .await
            .unwrap();

        // Retrying the same (now-stale) expected_version must fail, not silently no-op.
        let err = catalog
            .try_flush_compaction(&flush_info(&collection, &ids, 0), None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::VersionStale { .. }));
    }

    #[tokio::test]
    async fn concurrent_flush_from_the_same_observed_version_has_exactly_one_winner() {
        let catalog = Arc::new(crate::sqlite::test_support::new_catalog().await);
        let collection = create_test_collection(&catalog, "t1", "d1", "c1").await;
        let segments = catalog.get_segments_impl(collection.id, None, None).await.unwrap();
        let ids: Vec<_> = segments.iter().map(|s| s.id).collect();

        // Two callers race to flush from the same observed version 0. The
        // CAS `UPDATE ... WHERE version = $X AND version_file_path = $Y`
        // guarantees only one can land; the loser sees its own version
        // pointer has moved and must fail cleanly rather than corrupt state.
        let a = {
            let catalog = catalog.clone();
            let collection = collection.clone();
            let ids = ids.clone();
            tokio::spawn(async move { catalog.flush_collection_compaction_impl(flush_info(&collection, &ids, 0)).await })
        };
        let b = {
            let catalog = catalog.clone();
            let collection = collection.clone();
            let ids = ids.clone();
            tokio::spawn(async move { catalog.flush_collection_compaction_impl(flush_info(&collection, &ids, 0)).await })
        };

        let (ra, rb) = (a.await.unwrap(), b.await.unwrap());
        let oks = [&ra, &rb].iter().filter(|r| r.is_ok()).count();
        let stale = [&ra, &rb].iter().filter(|r| matches!(r, Err(CatalogError::VersionStale { .. }))).count();
        assert_eq!(oks, 1, "exactly one concurrent flush from the same version must win");
        assert_eq!(stale, 1, "the loser must observe a stale version, not succeed or corrupt state");

        let final_collection = catalog.get_collection_impl(collection.id, false).await.unwrap();
        assert_eq!(final_collection.version, 1);
    }

    #[tokio::test]
    async fn legacy_flush_advances_version_without_touching_the_version_pointer() {
        let catalog = crate::sqlite::test_support::new_catalog().await;
        let collection = create_test_collection(&catalog, "t1", "d1", "c1").await;
        let segments = catalog.get_segments_impl(collection.id, None, None).await.unwrap();
        let ids: Vec<_> = segments.iter().map(|s| s.id).collect();

        let before_path = collection.version_file_path.clone();
        let resp = catalog
            .flush_collection_compaction_legacy_impl(flush_info(&collection, &ids, 0))
            .await
            .unwrap();
        assert_eq!(resp.collection_version, 1);

        let after = catalog.get_collection_impl(collection.id, false).await.unwrap();
        assert_eq!(after.version, 1);
        assert_eq!(after.version_file_path, before_path, "legacy flush never moves the blob pointer");
        assert_eq!(after.num_versions, 1, "no version entry is recorded by the legacy path");
    }

    #[tokio::test]
    async fn legacy_flush_rejects_stale_expected_version() {
        let catalog = crate::sqlite::test_support::new_catalog().await;
        let collection = create_test_collection(&catalog, "t1", "d1", "c1").await;
        let segments = catalog.get_segments_impl(collection.id, None, None).await.unwrap();
        let ids: Vec<_> = segments.iter().map(|s| s.id).collect();

        catalog
            .flush_collection_compaction_legacy_impl(flush_info(&collection, &ids, 0))
            .await
            .unwrap();

        let err = catalog
            .flush_collection_compaction_legacy_impl(flush_info(&collection, &ids, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::VersionStale { .. }));
    }
}
