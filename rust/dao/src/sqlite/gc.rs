use super::collection::row_to_collection;
use super::{map_sqlx_err, SqliteCatalog};
use crate::requests::{CollectionToGcInfo, ListCollectionsToGcRequest};
use catalog_types::{CatalogError, CollectionUuid};
use sqlx::Row;
use std::str::FromStr;

const MAX_GC_ATTEMPTS: u32 = 5;

impl SqliteCatalog {
    pub(crate) async fn list_collections_to_gc_impl(
        &self,
        req: ListCollectionsToGcRequest,
    ) -> Result<Vec<CollectionToGcInfo>, CatalogError> {
        // Soft-deleted roots are always returned regardless of the cutoff or
        // `min_versions_if_alive` threshold, so their descendants can be
        // reclaimed once dependencies are gone. The whole OR expression is
        // parenthesized so a tenant filter ANDs onto both branches, not just
        // the second (SQL's `AND` binds tighter than `OR`).
        let mut query = String::from(
            "SELECT id, name, version_file_path FROM collections WHERE \
             ((is_deleted = TRUE AND lineage_file_path IS NOT NULL) \
             OR (oldest_version_ts IS NOT NULL AND oldest_version_ts <= $1",
        );
        let mut next_param = 2;
        if req.min_versions_if_alive.is_some() {
            query.push_str(&format!(" AND (is_deleted = TRUE OR num_versions >= ${next_param})"));
            next_param += 1;
        }
        query.push_str("))");
        if req.tenant.is_some() {
            query.push_str(&format!(" AND tenant_id = ${next_param}"));
            next_param += 1;
        }
        query.push_str(&format!(" ORDER BY oldest_version_ts ASC LIMIT ${next_param}"));

        let mut q = sqlx::query(&query).bind(req.cutoff_secs);
        if let Some(min_versions) = req.min_versions_if_alive {
            q = q.bind(min_versions);
        }
        if let Some(tenant) = &req.tenant {
            q = q.bind(tenant);
        }
        q = q.bind(req.limit.map(|l| l as i64).unwrap_or(-1));

        let rows = q.fetch_all(self.db.get_conn()).await.map_err(map_sqlx_err)?;
        rows.into_iter()
            .map(|row| {
                let id: String = row.get("id");
                Ok(CollectionToGcInfo {
                    id: CollectionUuid::from_str(&id).map_err(|e| {
                        CatalogError::Internal(format!("stored collection id is not a uuid: {e}"))
                    })?,
                    name: row.get("name"),
                    version_file_path: row.get("version_file_path"),
                })
            })
            .collect()
    }

    pub(crate) async fn mark_version_for_deletion_impl(
        &self,
        collection_id: CollectionUuid,
        versions: Vec<i64>,
    ) -> Result<(), CatalogError> {
        for attempt in 0..MAX_GC_ATTEMPTS {
            match self.try_mark_version_for_deletion(collection_id, &versions).await {
                Ok(()) => return Ok(()),
                Err(CatalogError::EntryStale(_)) => {
                    tracing::warn!(attempt, %collection_id, "gc mark CAS miss, retrying");
                    continue;
                }
                Err(other) => return Err(other),
            }
        }
        Err(CatalogError::Internal(format!(
            "mark_version_for_deletion: max attempts ({MAX_GC_ATTEMPTS}) reached for collection {collection_id}"
        )))
    }

    async fn try_mark_version_for_deletion(
        &self,
        collection_id: CollectionUuid,
        versions: &[i64],
    ) -> Result<(), CatalogError> {
        let row = sqlx::query("SELECT * FROM collections WHERE id = $1")
            .bind(collection_id.to_string())
            .fetch_optional(self.db.get_conn())
            .await
            .map_err(map_sqlx_err)?
            .ok_or_else(|| CatalogError::NotFound(format!("collection {collection_id}")))?;
        let collection = row_to_collection(&row)?;

        let mut file = catalog_version::fetch(
            &self.storage,
            &collection.version_file_path,
            &collection.id.to_string(),
            collection.version,
        )
        .await?;
        catalog_version::mark_for_deletion(&mut file, versions)?;

        let new_path = catalog_version::upload(
            &self.storage,
            &file,
            collection.version,
            Some(catalog_version::VersionFileOp::GcMark),
        )
        .await
        .map_err(|e| CatalogError::Internal(format!("failed to upload gc-mark version blob: {e}")))?;

        let result = sqlx::query(
            "UPDATE collections SET version_file_path = $1 WHERE id = $2 AND version = $3 AND version_file_path = $4",
        )
        .bind(&new_path)
        .bind(collection_id.to_string())
        .bind(collection.version)
        .bind(&collection.version_file_path)
        .execute(self.db.get_conn())
        .await
        .map_err(map_sqlx_err)?;

        if result.rows_affected() == 0 {
            return Err(CatalogError::EntryStale(format!(
                "collection {collection_id} version pointer moved under us"
            )));
        }
        Ok(())
    }

    pub(crate) async fn delete_collection_version_impl(
        &self,
        collection_id: CollectionUuid,
        versions: Vec<i64>,
    ) -> Result<(), CatalogError> {
        for attempt in 0..MAX_GC_ATTEMPTS {
            match self.try_delete_collection_version(collection_id, &versions).await {
                Ok(()) => return Ok(()),
                Err(CatalogError::EntryStale(_)) => {
                    tracing::warn!(attempt, %collection_id, "gc delete CAS miss, retrying");
                    continue;
                }
                Err(other) => return Err(other),
            }
        }
        Err(CatalogError::Internal(format!(
            "delete_collection_version: max attempts ({MAX_GC_ATTEMPTS}) reached for collection {collection_id}"
        )))
    }

    async fn try_delete_collection_version(
        &self,
        collection_id: CollectionUuid,
        versions: &[i64],
    ) -> Result<(), CatalogError> {
        let row = sqlx::query("SELECT * FROM collections WHERE id = $1")
            .bind(collection_id.to_string())
            .fetch_optional(self.db.get_conn())
            .await
            .map_err(map_sqlx_err)?
            .ok_or_else(|| CatalogError::NotFound(format!("collection {collection_id}")))?;
        let collection = row_to_collection(&row)?;

        let mut file = catalog_version::fetch(
            &self.storage,
            &collection.version_file_path,
            &collection.id.to_string(),
            collection.version,
        )
        .await?;
        catalog_version::remove_versions(&mut file, versions)?;

        let num_active_versions = catalog_version::active_version_count(&file);
        if num_active_versions == 0 && !collection.is_deleted {
            return Err(CatalogError::Internal(format!(
                "refusing to leave live collection {collection_id} with zero active versions"
            )));
        }
        let oldest_version_ts = catalog_version::oldest_active_version_ts(&file);

        let new_path = catalog_version::upload(
            &self.storage,
            &file,
            collection.version,
            Some(catalog_version::VersionFileOp::GcDelete),
        )
        .await
        .map_err(|e| CatalogError::Internal(format!("failed to upload gc-delete version blob: {e}")))?;

        let result = sqlx::query(
            "UPDATE collections SET version_file_path = $1, num_versions = $2, oldest_version_ts = $3 \
             WHERE id = $4 AND version = $5 AND version_file_path = $6",
        )
        .bind(&new_path)
        .bind(num_active_versions)
        .bind(oldest_version_ts)
        .bind(collection_id.to_string())
        .bind(collection.version)
        .bind(&collection.version_file_path)
        .execute(self.db.get_conn())
        .await
        .map_err(map_sqlx_err)?;

        if result.rows_affected() == 0 {
            return Err(CatalogError::EntryStale(format!(
                "collection {collection_id} version pointer moved under us"
            )));
        }
        Ok(())
    }
}
