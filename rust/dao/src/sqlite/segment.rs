use super::collection::{fetch_collection_segments, insert_segment_row, scope_to_str};
use super::{map_sqlx_err, replace_metadata, SqliteCatalog};
use catalog_types::{CatalogError, CollectionUuid, Segment, SegmentScope, SegmentUuid};
use std::str::FromStr;

impl SqliteCatalog {
    pub(crate) async fn create_segment_impl(&self, segment: Segment) -> Result<Segment, CatalogError> {
        let mut tx = self.db.get_conn().begin().await.map_err(map_sqlx_err)?;
        self.db.begin_immediate(&mut *tx).await.map_err(map_sqlx_err)?;
        insert_segment_row(&mut tx, &segment.collection, &segment).await?;
        tx.commit().await.map_err(map_sqlx_err)?;
        Ok(segment)
    }

    pub(crate) async fn get_segments_impl(
        &self,
        collection: CollectionUuid,
        id: Option<SegmentUuid>,
        scope: Option<SegmentScope>,
    ) -> Result<Vec<Segment>, CatalogError> {
        let segments = fetch_collection_segments(self.db.get_conn(), collection).await?;
        Ok(segments
            .into_iter()
            .filter(|s| id.is_none_or(|id| s.id == id))
            .filter(|s| scope.as_ref().is_none_or(|scope| &s.scope == scope))
            .collect())
    }

    pub(crate) async fn update_segment_impl(&self, segment: Segment) -> Result<Segment, CatalogError> {
        let mut tx = self.db.get_conn().begin().await.map_err(map_sqlx_err)?;
        self.db.begin_immediate(&mut *tx).await.map_err(map_sqlx_err)?;

        let existing = sqlx::query("SELECT id FROM segments WHERE id = $1")
            .bind(segment.id.to_string())
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_sqlx_err)?;
        if existing.is_none() {
            return Err(CatalogError::NotFound(format!("segment {}", segment.id)));
        }

        sqlx::query("UPDATE segments SET segment_type = $1, scope = $2 WHERE id = $3")
            .bind(&segment.r#type)
            .bind(scope_to_str(&segment.scope))
            .bind(segment.id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_err)?;

        sqlx::query("DELETE FROM segment_file_paths WHERE segment_id = $1")
            .bind(segment.id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_err)?;
        for (role, paths) in &segment.file_paths {
            for (position, path) in paths.iter().enumerate() {
                sqlx::query(
                    "INSERT INTO segment_file_paths (segment_id, role, position, path) VALUES ($1,$2,$3,$4)",
                )
                .bind(segment.id.to_string())
                .bind(role)
                .bind(position as i64)
                .bind(path)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_err)?;
            }
        }

        if let Some(metadata) = &segment.metadata {
            replace_metadata(&mut tx, "segment_metadata", "segment_id", &segment.id.to_string(), metadata).await?;
        }

        tx.commit().await.map_err(map_sqlx_err)?;
        Ok(segment)
    }

    pub(crate) async fn delete_segment_impl(&self, id: SegmentUuid) -> Result<(), CatalogError> {
        let mut tx = self.db.get_conn().begin().await.map_err(map_sqlx_err)?;
        self.db.begin_immediate(&mut *tx).await.map_err(map_sqlx_err)?;

        let rows = sqlx::query("DELETE FROM segments WHERE id = $1 RETURNING id")
            .bind(id.to_string())
            .fetch_all(&mut *tx)
            .await
            .map_err(map_sqlx_err)?;
        if rows.is_empty() {
            return Err(CatalogError::NotFound(format!("segment {id}")));
        }
        sqlx::query("DELETE FROM segment_file_paths WHERE segment_id = $1")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_err)?;
        sqlx::query("DELETE FROM segment_metadata WHERE segment_id = $1")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_err)?;

        tx.commit().await.map_err(map_sqlx_err)?;
        Ok(())
    }
}

#[allow(dead_code)]
pub(crate) fn parse_segment_uuid(s: &str) -> Result<SegmentUuid, CatalogError> {
    SegmentUuid::from_str(s).map_err(|e| CatalogError::Internal(format!("stored segment id is not a uuid: {e}")))
}
