use super::{map_sqlx_err, now_secs, row_get_opt_string, SqliteCatalog};
use crate::requests::AttachFunctionRequest;
use catalog_types::{minimal_uuid_v7, AttachedFunction, AttachedFunctionUuid, CatalogError, CollectionUuid};
use sqlx::Row;
use std::str::FromStr;
use uuid::Uuid;

impl SqliteCatalog {
    pub(crate) async fn attach_function_impl(
        &self,
        req: AttachFunctionRequest,
    ) -> Result<AttachedFunctionUuid, CatalogError> {
        // Phase 0: cheap idempotency check outside any transaction.
        if let Some(existing) = self
            .find_attached_function_by_name(req.input_collection_id, &req.name)
            .await?
        {
            if !existing.is_partial() {
                if request_matches(&req, &existing) {
                    return Ok(existing.id);
                }
                return Err(CatalogError::AlreadyExists(format!(
                    "attached function {} on collection {} already exists with different parameters",
                    req.name, req.input_collection_id
                )));
            }
            // Partial row: fall through to Phase 1, which re-validates and
            // either reuses it (recovery) or fails on a genuine mismatch.
        }

        let mut tx = self.db.get_conn().begin().await.map_err(map_sqlx_err)?;
        self.db.begin_immediate(&mut *tx).await.map_err(map_sqlx_err)?;

        let row = sqlx::query(
            "SELECT * FROM attached_functions WHERE input_collection_id = $1 AND name = $2 AND is_deleted = FALSE",
        )
        .bind(req.input_collection_id.to_string())
        .bind(&req.name)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_err)?;

        if let Some(row) = row {
            let existing = row_to_attached_function(&row)?;
            if !existing.is_partial() {
                tx.commit().await.map_err(map_sqlx_err)?;
                if request_matches(&req, &existing) {
                    return Ok(existing.id);
                }
                return Err(CatalogError::AlreadyExists(format!(
                    "attached function {} on collection {} already exists with different parameters",
                    req.name, req.input_collection_id
                )));
            }
            if !request_matches(&req, &existing) {
                return Err(CatalogError::AlreadyExists(format!(
                    "partial attached function {} on collection {} has mismatched parameters",
                    req.name, req.input_collection_id
                )));
            }
            tx.commit().await.map_err(map_sqlx_err)?;
            return Ok(existing.id);
        }

        let input_exists = sqlx::query("SELECT id FROM collections WHERE id = $1 AND is_deleted = FALSE")
            .bind(req.input_collection_id.to_string())
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_sqlx_err)?;
        if input_exists.is_none() {
            return Err(CatalogError::NotFound(format!("collection {}", req.input_collection_id)));
        }

        let output_conflict = sqlx::query(
            "SELECT id FROM collections WHERE database_id = \
             (SELECT database_id FROM collections WHERE id = $1) AND name = $2 AND is_deleted = FALSE",
        )
        .bind(req.input_collection_id.to_string())
        .bind(&req.output_collection_name)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_err)?;
        if output_conflict.is_some() {
            return Err(CatalogError::AlreadyExists(format!(
                "output collection {} already exists",
                req.output_collection_name
            )));
        }

        let function_exists = sqlx::query("SELECT id FROM functions WHERE id = $1")
            .bind(req.function_id.to_string())
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_sqlx_err)?;
        if function_exists.is_none() {
            return Err(CatalogError::NotFound(format!("function {}", req.function_id)));
        }

        let id = AttachedFunctionUuid::new();
        let now = now_secs();
        let next_nonce = Uuid::now_v7();
        sqlx::query(
            "INSERT INTO attached_functions (\
                id, name, input_collection_id, output_collection_name, function_id, tenant_id, \
                database_id, params_json, min_records_for_invocation, completion_offset, next_nonce, \
                lowest_live_nonce, next_run_secs, created_at_secs, updated_at_secs, is_deleted\
             ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,0,$10,NULL,0,$11,$11,FALSE)",
        )
        .bind(id.to_string())
        .bind(&req.name)
        .bind(req.input_collection_id.to_string())
        .bind(&req.output_collection_name)
        .bind(req.function_id.to_string())
        .bind(&req.tenant_id)
        .bind(&req.database_id)
        .bind(&req.params_json)
        .bind(req.min_records_for_invocation as i64)
        .bind(next_nonce.to_string())
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_err)?;

        tx.commit().await.map_err(map_sqlx_err)?;
        Ok(id)
    }

    pub(crate) async fn complete_attach_impl(&self, id: AttachedFunctionUuid) -> Result<(), CatalogError> {
        let minimal = minimal_uuid_v7();
        let result = sqlx::query(
            "UPDATE attached_functions SET lowest_live_nonce = $1, updated_at_secs = $2 \
             WHERE id = $3 AND is_deleted = FALSE",
        )
        .bind(minimal.to_string())
        .bind(now_secs())
        .bind(id.to_string())
        .execute(self.db.get_conn())
        .await
        .map_err(map_sqlx_err)?;

        if result.rows_affected() == 0 {
            return Err(CatalogError::NotFound(format!("attached function {id}")));
        }
        Ok(())
    }

    pub(crate) async fn get_attached_function_by_name_impl(
        &self,
        input_collection_id: CollectionUuid,
        name: &str,
    ) -> Result<AttachedFunction, CatalogError> {
        let attached = self
            .find_attached_function_by_name(input_collection_id, name)
            .await?
            .ok_or_else(|| CatalogError::NotFound(format!("attached function {name} on collection {input_collection_id}")))?;
        if attached.is_partial() {
            return Err(CatalogError::NotReady(format!(
                "attached function {name} on collection {input_collection_id} has not completed attachment"
            )));
        }
        Ok(attached)
    }

    pub(crate) async fn list_attached_functions_impl(
        &self,
        input_collection_id: CollectionUuid,
    ) -> Result<Vec<AttachedFunction>, CatalogError> {
        let rows = sqlx::query(
            "SELECT * FROM attached_functions WHERE input_collection_id = $1 AND is_deleted = FALSE \
             ORDER BY created_at_secs ASC",
        )
        .bind(input_collection_id.to_string())
        .fetch_all(self.db.get_conn())
        .await
        .map_err(map_sqlx_err)?;
        rows.iter().map(row_to_attached_function).collect()
    }

    pub(crate) async fn detach_function_impl(
        &self,
        input_collection_id: CollectionUuid,
        name: &str,
    ) -> Result<(), CatalogError> {
        let result = sqlx::query(
            "UPDATE attached_functions SET is_deleted = TRUE, updated_at_secs = $1 \
             WHERE input_collection_id = $2 AND name = $3 AND is_deleted = FALSE",
        )
        .bind(now_secs())
        .bind(input_collection_id.to_string())
        .bind(name)
        .execute(self.db.get_conn())
        .await
        .map_err(map_sqlx_err)?;

        if result.rows_affected() == 0 {
            return Err(CatalogError::NotFound(format!(
                "attached function {name} on collection {input_collection_id}"
            )));
        }
        Ok(())
    }

    pub(crate) async fn advance_attached_function_impl(
        &self,
        id: AttachedFunctionUuid,
        new_next_nonce: Uuid,
    ) -> Result<(), CatalogError> {
        let result = sqlx::query(
            "UPDATE attached_functions SET next_nonce = $1, next_run_secs = $2, updated_at_secs = $2 \
             WHERE id = $3 AND is_deleted = FALSE",
        )
        .bind(new_next_nonce.to_string())
        .bind(now_secs())
        .bind(id.to_string())
        .execute(self.db.get_conn())
        .await
        .map_err(map_sqlx_err)?;

        if result.rows_affected() == 0 {
            return Err(CatalogError::NotFound(format!("attached function {id}")));
        }
        Ok(())
    }

    pub(crate) async fn cleanup_expired_partial_attached_functions_impl(
        &self,
        max_age_secs: i64,
    ) -> Result<Vec<AttachedFunctionUuid>, CatalogError> {
        let cutoff = now_secs() - max_age_secs;
        let rows = sqlx::query(
            "DELETE FROM attached_functions WHERE lowest_live_nonce IS NULL AND created_at_secs <= $1 RETURNING id",
        )
        .bind(cutoff)
        .fetch_all(self.db.get_conn())
        .await
        .map_err(map_sqlx_err)?;

        rows.iter()
            .map(|row| {
                let id: String = row.get("id");
                AttachedFunctionUuid::from_str(&id)
                    .map_err(|e| CatalogError::Internal(format!("stored attached-function id is not a uuid: {e}")))
            })
            .collect()
    }

    async fn find_attached_function_by_name(
        &self,
        input_collection_id: CollectionUuid,
        name: &str,
    ) -> Result<Option<AttachedFunction>, CatalogError> {
        let row = sqlx::query(
            "SELECT * FROM attached_functions WHERE input_collection_id = $1 AND name = $2 AND is_deleted = FALSE",
        )
        .bind(input_collection_id.to_string())
        .bind(name)
        .fetch_optional(self.db.get_conn())
        .await
        .map_err(map_sqlx_err)?;
        row.as_ref().map(row_to_attached_function).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::test_support::{create_test_collection, insert_function, new_catalog};

    fn request(collection: CollectionUuid, function: catalog_types::FunctionUuid) -> AttachFunctionRequest {
        AttachFunctionRequest {
            input_collection_id: collection,
            name: "embed".to_string(),
            output_collection_name: "embed-out".to_string(),
            function_id: function,
            tenant_id: "t1".to_string(),
            database_id: "d1".to_string(),
            params_json: None,
            min_records_for_invocation: 100,
        }
    }

    #[tokio::test]
    async fn attach_is_partial_until_complete_attach_runs() {
        let catalog = new_catalog().await;
        let collection = create_test_collection(&catalog, "t1", "d1", "c1").await;
        let function = insert_function(&catalog, "embedder").await;

        let id = catalog.attach_function_impl(request(collection.id, function)).await.unwrap();
        // Phase 1 has run but phase 3 has not, so lookups must see it as not ready.
        let err = catalog.get_attached_function_by_name_impl(collection.id, "embed").await.unwrap_err();
        assert!(matches!(err, CatalogError::NotReady(_)));

        catalog.complete_attach_impl(id).await.unwrap();
        let attached = catalog.get_attached_function_by_name_impl(collection.id, "embed").await.unwrap();
        assert_eq!(attached.id, id);
        assert!(!attached.is_partial());
    }

    #[tokio::test]
    async fn re_attaching_with_identical_parameters_is_idempotent() {
        let catalog = new_catalog().await;
        let collection = create_test_collection(&catalog, "t1", "d1", "c1").await;
        let function = insert_function(&catalog, "embedder").await;

        let id1 = catalog.attach_function_impl(request(collection.id, function)).await.unwrap();
        catalog.complete_attach_impl(id1).await.unwrap();

        // Calling attach again with the exact same request must return the
        // same id rather than erroring or creating a second row.
        let id2 = catalog.attach_function_impl(request(collection.id, function)).await.unwrap();
        assert_eq!(id1, id2);
    }

    #[tokio::test]
    async fn re_attaching_with_different_parameters_conflicts() {
        let catalog = new_catalog().await;
        let collection = create_test_collection(&catalog, "t1", "d1", "c1").await;
        let function = insert_function(&catalog, "embedder").await;

        let id1 = catalog.attach_function_impl(request(collection.id, function)).await.unwrap();
        catalog.complete_attach_impl(id1).await.unwrap();

        let mut conflicting = request(collection.id, function);
        conflicting.min_records_for_invocation = 999;
        let err = catalog.attach_function_impl(conflicting).await.unwrap_err();
        assert!(matches!(err, CatalogError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn retrying_a_partial_attach_with_matching_parameters_recovers_the_same_id() {
        let catalog = new_catalog().await;
        let collection = create_test_collection(&catalog, "t1", "d1", "c1").await;
        let function = insert_function(&catalog, "embedder").await;

        // Simulates a caller that crashed between phase 1 (DB insert) and
        // phase 3 (complete_attach): retry the same request before the heap
        // push/complete ever happened.
        let id1 = catalog.attach_function_impl(request(collection.id, function)).await.unwrap();
        let id2 = catalog.attach_function_impl(request(collection.id, function)).await.unwrap();
        assert_eq!(id1, id2);

        catalog.complete_attach_impl(id1).await.unwrap();
        let attached = catalog.get_attached_function_by_name_impl(collection.id, "embed").await.unwrap();
        assert!(!attached.is_partial());
    }

    #[tokio::test]
    async fn cleanup_expired_partial_attachments_only_removes_old_unconfirmed_rows() {
        let catalog = new_catalog().await;
        let collection = create_test_collection(&catalog, "t1", "d1", "c1").await;
        let function = insert_function(&catalog, "embedder").await;

        let partial_id = catalog.attach_function_impl(request(collection.id, function)).await.unwrap();

        let mut confirmed_req = request(collection.id, function);
        confirmed_req.name = "confirmed".to_string();
        confirmed_req.output_collection_name = "confirmed-out".to_string();
        let confirmed_id = catalog.attach_function_impl(confirmed_req).await.unwrap();
        catalog.complete_attach_impl(confirmed_id).await.unwrap();

        let swept = catalog.cleanup_expired_partial_attached_functions_impl(0).await.unwrap();
        assert_eq!(swept, vec![partial_id]);

        let err = catalog.get_attached_function_by_name_impl(collection.id, "embed").await.unwrap_err();
        assert!(matches!(err, CatalogError::NotFound(_)));
        let still_there = catalog.get_attached_function_by_name_impl(collection.id, "confirmed").await.unwrap();
        assert!(!still_there.is_partial());
    }
}

fn request_matches(req: &AttachFunctionRequest, existing: &AttachedFunction) -> bool {
    existing.function_id == req.function_id
        && existing.database_id == req.database_id
        && existing.output_collection_name == req.output_collection_name
        && existing.params_json == req.params_json
        && existing.min_records_for_invocation == req.min_records_for_invocation
}

fn row_to_attached_function(row: &sqlx::sqlite::SqliteRow) -> Result<AttachedFunction, CatalogError> {
    let id: String = row.get("id");
    let input_collection_id: String = row.get("input_collection_id");
    let function_id: String = row.get("function_id");
    let next_nonce: String = row.get("next_nonce");
    let lowest_live_nonce = row_get_opt_string(row, "lowest_live_nonce");

    Ok(AttachedFunction {
        id: AttachedFunctionUuid::from_str(&id)
            .map_err(|e| CatalogError::Internal(format!("stored attached-function id is not a uuid: {e}")))?,
        name: row.get("name"),
        input_collection_id: CollectionUuid::from_str(&input_collection_id)
            .map_err(|e| CatalogError::Internal(format!("stored input_collection_id is not a uuid: {e}")))?,
        output_collection_name: row.get("output_collection_name"),
        function_id: catalog_types::FunctionUuid::from_str(&function_id)
            .map_err(|e| CatalogError::Internal(format!("stored function_id is not a uuid: {e}")))?,
        tenant_id: row.get("tenant_id"),
        database_id: row.get("database_id"),
        params_json: row.get("params_json"),
        min_records_for_invocation: row.get::<i64, _>("min_records_for_invocation") as u64,
        completion_offset: row.get::<i64, _>("completion_offset") as u64,
        next_nonce: Uuid::from_str(&next_nonce)
            .map_err(|e| CatalogError::Internal(format!("stored next_nonce is not a uuid: {e}")))?,
        lowest_live_nonce: lowest_live_nonce
            .map(|s| Uuid::from_str(&s))
            .transpose()
            .map_err(|e| CatalogError::Internal(format!("stored lowest_live_nonce is not a uuid: {e}")))?,
        next_run_secs: row.get("next_run_secs"),
        created_at_secs: row.get("created_at_secs"),
        updated_at_secs: row.get("updated_at_secs"),
        is_deleted: row.get("is_deleted"),
    })
}
