use super::collection::{fetch_collection_segments_tx, row_to_collection};
use super::{map_sqlx_err, now_secs, SqliteCatalog};
use catalog_proto::LineageFile;
use catalog_types::{CatalogError, CollectionUuid};
use prost::Message;
use sqlx::Row;

impl SqliteCatalog {
    pub(crate) async fn soft_delete_collection_impl(&self, id: CollectionUuid) -> Result<(), CatalogError> {
        let mut tx = self.db.get_conn().begin().await.map_err(map_sqlx_err)?;
        self.db.begin_immediate(&mut *tx).await.map_err(map_sqlx_err)?;

        let row = sqlx::query("SELECT * FROM collections WHERE id = $1")
            .bind(id.to_string())
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_sqlx_err)?
            .ok_or_else(|| CatalogError::NotFound(format!("collection {id}")))?;
        let mut collection = row_to_collection(&row)?;
        if collection.is_deleted {
            return Err(CatalogError::SoftDeleted(id.to_string()));
        }

        collection.soft_delete(now_secs());
        sqlx::query("UPDATE collections SET name = $1, is_deleted = TRUE, updated_at_secs = $2 WHERE id = $3")
            .bind(&collection.name)
            .bind(collection.updated_at_secs)
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_err)?;

        tx.commit().await.map_err(map_sqlx_err)?;
        Ok(())
    }

    pub(crate) async fn hard_delete_collection_impl(&self, id: CollectionUuid) -> Result<(), CatalogError> {
        let mut tx = self.db.get_conn().begin().await.map_err(map_sqlx_err)?;
        self.db.begin_immediate(&mut *tx).await.map_err(map_sqlx_err)?;

        // Lock order: child (this collection) first, then its root, mirroring
        // fork's locking order so the two protocols never deadlock.
        let row = sqlx::query("SELECT * FROM collections WHERE id = $1")
            .bind(id.to_string())
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_sqlx_err)?
            .ok_or_else(|| CatalogError::NotFound(format!("collection {id}")))?;
        let collection = row_to_collection(&row)?;
        if !collection.is_deleted {
            return Err(CatalogError::WasNotSoftDeleted(id.to_string()));
        }

        if let Some(root_id) = collection.root_collection_id {
            let root_row = sqlx::query("SELECT * FROM collections WHERE id = $1")
                .bind(root_id.to_string())
                .fetch_optional(&mut *tx)
                .await
                .map_err(map_sqlx_err)?
                .ok_or_else(|| CatalogError::NotFound(format!("collection {root_id}")))?;
            let root = row_to_collection(&root_row)?;

            let lineage_path = root.lineage_file_path.clone().ok_or_else(|| {
                CatalogError::Internal(format!(
                    "collection {id} has a root_collection_id but root {root_id} has no lineage file"
                ))
            })?;
            let bytes = self.storage.get(&lineage_path).await.map_err(|e| {
                CatalogError::Internal(format!("failed to fetch lineage file at {lineage_path}: {e}"))
            })?;
            let lineage = LineageFile::decode(bytes.as_slice())
                .map_err(|e| CatalogError::Internal(format!("failed to decode lineage file: {e}")))?;

            if lineage
                .dependencies
                .iter()
                .any(|dep| dep.source_collection_id == id.to_string())
            {
                return Err(CatalogError::ConcurrentDelete(format!(
                    "collection {id} still has surviving forks depending on it"
                )));
            }

            let remaining: Vec<_> = lineage
                .dependencies
                .into_iter()
                .filter(|dep| dep.target_collection_id != id.to_string())
                .collect();
            let updated_lineage = LineageFile { dependencies: remaining };

            let new_path = format!(
                "tenant/{}/database/{}/collection/{}/lineagefiles/{}.binpb",
                root.tenant_id, root.database_id, root.id, uuid::Uuid::now_v7()
            );
            self.storage
                .put_bytes(&new_path, updated_lineage.encode_to_vec(), catalog_storage::PutOptions::default())
                .await
                .map_err(|e| CatalogError::Internal(format!("failed to upload lineage file: {e}")))?;

            sqlx::query("UPDATE collections SET lineage_file_path = $1 WHERE id = $2")
                .bind(&new_path)
                .bind(root.id.to_string())
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_err)?;
        }

        let segments = fetch_collection_segments_tx(&mut tx, id).await?;
        for segment in &segments {
            sqlx::query("DELETE FROM segment_metadata WHERE segment_id = $1")
                .bind(segment.id.to_string())
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_err)?;
            sqlx::query("DELETE FROM segment_file_paths WHERE segment_id = $1")
                .bind(segment.id.to_string())
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_err)?;
        }
        sqlx::query("DELETE FROM segments WHERE collection_id = $1")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_err)?;
        sqlx::query("DELETE FROM collection_metadata WHERE collection_id = $1")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_err)?;
        sqlx::query("DELETE FROM collections WHERE id = $1")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_err)?;

        tx.commit().await.map_err(map_sqlx_err)?;
        Ok(())
    }
}
