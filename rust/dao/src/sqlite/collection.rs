use super::{fetch_metadata, map_sqlx_err, now_secs, replace_metadata, SqliteCatalog};
use crate::requests::CreateCollectionRequest;
use catalog_types::{
    CatalogError, Collection, CollectionAndSegments, CollectionMetadataUpdate, CollectionUuid,
    DatabaseUuid, Metadata, Segment, SegmentScope, SegmentUuid,
};
use sqlx::sqlite::SqliteRow;
use sqlx::{Executor, Row};
use std::str::FromStr;

impl SqliteCatalog {
    pub(crate) async fn create_collection_and_segments_impl(
        &self,
        req: CreateCollectionRequest,
    ) -> Result<(Collection, bool), CatalogError> {
        catalog_types::validate_name(&req.name)?;

        if req.get_or_create {
            if let Ok(existing) = self
                .get_collection_by_name_impl(&req.tenant, &req.database, &req.name, false)
                .await
            {
                return Ok((existing, false));
            }
        }

        let database = self.get_database_impl(&req.database, &req.tenant).await?;
        let collection_id = req.id.unwrap_or_else(CollectionUuid::new);

        let mut collection = Collection::new(req.name.clone(), req.tenant.clone(), database.id, now_secs());
        collection.id = collection_id;
        collection.dimension = req.dimension;
        collection.configuration_json = req.configuration_json.clone();

        // Version-0 blob is written before the DB row so the row never
        // references a blob that was never persisted.
        let version_file =
            catalog_version::build_initial(&collection, &req.segments, collection.created_at_secs);
        let version_file_path = catalog_version::upload(&self.storage, &version_file, 0, None)
            .await
            .map_err(|e| CatalogError::Internal(format!("failed to upload version-0 blob: {e}")))?;
        collection.version_file_path = version_file_path;

        let mut tx = self.db.get_conn().begin().await.map_err(map_sqlx_err)?;
        self.db
            .begin_immediate(&mut *tx)
            .await
            .map_err(map_sqlx_err)?;

        let conflict = sqlx::query(
            "SELECT id FROM collections WHERE database_id = $1 AND name = $2 AND is_deleted = FALSE",
        )
        .bind(collection.database_id.to_string())
        .bind(&req.name)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_err)?;

        if conflict.is_some() {
            if req.get_or_create {
                tx.commit().await.map_err(map_sqlx_err)?;
                let existing = self
                    .get_collection_by_name_impl(&req.tenant, &req.database, &req.name, false)
                    .await
                    .map_err(|e| match e {
                        CatalogError::NotFound(_) => CatalogError::ConcurrentDelete(format!(
                            "collection {} was deleted concurrently with get_or_create",
                            req.name
                        )),
                        other => other,
                    })?;
                return Ok((existing, false));
            }
            return Err(CatalogError::AlreadyExists(format!(
                "collection {} already exists in database {}",
                req.name, req.database
            )));
        }

        insert_collection_row(&mut tx, &collection).await?;
        if let Some(metadata) = &req.metadata {
            replace_metadata(&mut tx, "collection_metadata", "collection_id", &collection.id.to_string(), metadata)
                .await?;
        }
        for segment in &req.segments {
            insert_segment_row(&mut tx, &collection.id, segment).await?;
        }

        tx.commit().await.map_err(map_sqlx_err)?;
        Ok((collection, true))
    }

    pub(crate) async fn get_collection_impl(
        &self,
        id: CollectionUuid,
        include_soft_deleted: bool,
    ) -> Result<Collection, CatalogError> {
        let query = if include_soft_deleted {
            "SELECT * FROM collections WHERE id = $1"
        } else {
            "SELECT * FROM collections WHERE id = $1 AND is_deleted = FALSE"
        };
        let row = sqlx::query(query)
            .bind(id.to_string())
            .fetch_optional(self.db.get_conn())
            .await
            .map_err(map_sqlx_err)?
            .ok_or_else(|| CatalogError::NotFound(format!("collection {id}")))?;
        row_to_collection(&row)
    }

    pub(crate) async fn get_collection_by_name_impl(
        &self,
        tenant: &str,
        database: &str,
        name: &str,
        include_soft_deleted: bool,
    ) -> Result<Collection, CatalogError> {
        let deleted_clause = if include_soft_deleted {
            ""
        } else {
            "AND collections.is_deleted = FALSE"
        };
        let query = format!(
            "SELECT collections.* FROM collections \
             JOIN databases ON collections.database_id = databases.id \
             WHERE databases.name = $1 AND databases.tenant_id = $2 AND collections.name = $3 {deleted_clause}"
        );
        let row = sqlx::query(&query)
            .bind(database)
            .bind(tenant)
            .bind(name)
            .fetch_optional(self.db.get_conn())
            .await
            .map_err(map_sqlx_err)?
            .ok_or_else(|| CatalogError::NotFound(format!("collection {tenant}/{database}/{name}")))?;
        row_to_collection(&row)
    }

    pub(crate) async fn list_collections_impl(
        &self,
        tenant: &str,
        database: &str,
        limit: Option<u32>,
        offset: u32,
        include_soft_deleted: bool,
    ) -> Result<Vec<Collection>, CatalogError> {
        let deleted_clause = if include_soft_deleted {
            ""
        } else {
            "AND collections.is_deleted = FALSE"
        };
        let query = format!(
            "SELECT collections.* FROM collections \
             JOIN databases ON collections.database_id = databases.id \
             WHERE databases.name = $1 AND databases.tenant_id = $2 {deleted_clause} \
             ORDER BY collections.created_at_secs ASC LIMIT $3 OFFSET $4"
        );
        let rows = sqlx::query(&query)
            .bind(database)
            .bind(tenant)
            .bind(limit.map(|l| l as i64).unwrap_or(-1))
            .bind(offset as i64)
            .fetch_all(self.db.get_conn())
            .await
            .map_err(map_sqlx_err)?;
        rows.iter().map(row_to_collection).collect()
    }

    /// Soft-deleted collections eligible for the reaper to hard-delete:
    /// `updated_at_secs` (the soft-delete timestamp, since `soft_delete`
    /// sets it) older than `max_age_cutoff_secs`, and no `lineage_file_path`
    /// -- a fork root is never reaped while any of its descendants live
    /// (I2).
    pub(crate) async fn list_soft_deleted_collections_for_reaping_impl(
        &self,
        max_age_cutoff_secs: i64,
        limit: u32,
    ) -> Result<Vec<Collection>, CatalogError> {
        let query = "SELECT * FROM collections \
                     WHERE is_deleted = TRUE AND lineage_file_path IS NULL \
                     AND updated_at_secs < $1 \
                     ORDER BY updated_at_secs ASC LIMIT $2";
        let rows = sqlx::query(query)
            .bind(max_age_cutoff_secs)
            .bind(limit as i64)
            .fetch_all(self.db.get_conn())
            .await
            .map_err(map_sqlx_err)?;
        rows.iter().map(row_to_collection).collect()
    }

    pub(crate) async fn count_collections_impl(
        &self,
        tenant: &str,
        database: &str,
    ) -> Result<u64, CatalogError> {
        let query = "SELECT COUNT(*) AS n FROM collections \
                     JOIN databases ON collections.database_id = databases.id \
                     WHERE databases.name = $1 AND databases.tenant_id = $2 AND collections.is_deleted = FALSE";
        let row = sqlx::query(query)
            .bind(database)
            .bind(tenant)
            .fetch_one(self.db.get_conn())
            .await
            .map_err(map_sqlx_err)?;
        let n: i64 = row.get("n");
        Ok(n as u64)
    }

    pub(crate) async fn get_collection_with_segments_impl(
        &self,
        id: CollectionUuid,
    ) -> Result<CollectionAndSegments, CatalogError> {
        let collection = self.get_collection_impl(id, false).await?;
        let segments = self.get_segments_impl(id, None, None).await?;

        let mut metadata_segment = None;
        let mut record_segment = None;
        let mut vector_segment = None;
        for segment in segments {
            match segment.scope {
                SegmentScope::Metadata => metadata_segment = Some(segment),
                SegmentScope::Record => record_segment = Some(segment),
                SegmentScope::Vector => vector_segment = Some(segment),
            }
        }

        Ok(CollectionAndSegments {
            collection,
            metadata_segment: metadata_segment
                .ok_or_else(|| CatalogError::Internal(format!("collection {id} missing a metadata segment")))?,
            record_segment: record_segment
                .ok_or_else(|| CatalogError::Internal(format!("collection {id} missing a record segment")))?,
            vector_segment: vector_segment
                .ok_or_else(|| CatalogError::Internal(format!("collection {id} missing a vector segment")))?,
        })
    }

    pub(crate) async fn update_collection_impl(
        &self,
        id: CollectionUuid,
        name: Option<String>,
        metadata: Option<CollectionMetadataUpdate>,
        dimension: Option<i32>,
        configuration_json: Option<String>,
    ) -> Result<Collection, CatalogError> {
        if let Some(name) = &name {
            catalog_types::validate_name(name)?;
        }

        let mut tx = self.db.get_conn().begin().await.map_err(map_sqlx_err)?;
        self.db
            .begin_immediate(&mut *tx)
            .await
            .map_err(map_sqlx_err)?;

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

        if let Some(name) = name {
            collection.name = name;
        }
        if let Some(dimension) = dimension {
            collection.dimension = Some(dimension);
        }
        if let Some(update) = configuration_json {
            collection.configuration_json = Some(merge_configuration_json(
                collection.configuration_json.as_deref(),
                &update,
            ));
        }
        collection.updated_at_secs = now_secs();

        tx.execute(
            sqlx::query(
                "UPDATE collections SET name = $1, dimension = $2, configuration_json = $3, updated_at_secs = $4 \
                 WHERE id = $5",
            )
            .bind(&collection.name)
            .bind(collection.dimension)
            .bind(&collection.configuration_json)
            .bind(collection.updated_at_secs)
            .bind(id.to_string()),
        )
        .await
        .map_err(map_sqlx_err)?;

        match metadata {
            Some(CollectionMetadataUpdate::UpdateMetadata(update)) => {
                let mut existing = fetch_metadata(&mut *tx, "collection_metadata", "collection_id", &id.to_string()).await?;
                for (key, value) in update.iter() {
                    existing.insert(key.clone(), value.clone());
                }
                replace_metadata(&mut tx, "collection_metadata", "collection_id", &id.to_string(), &existing).await?;
            }
            Some(CollectionMetadataUpdate::ResetMetadata) => {
                replace_metadata(&mut tx, "collection_metadata", "collection_id", &id.to_string(), &Metadata::new())
                    .await?;
            }
            None => {}
        }

        tx.commit().await.map_err(map_sqlx_err)?;
        Ok(collection)
    }
}

/// Merges an incoming configuration update into the existing stored
/// configuration, both encoded as JSON objects. Keys present in `update` take
/// precedence except for the index-type variant keys (`hnsw_configuration`,
/// `spann_configuration`): a type change there is ignored and the existing
/// variant is kept, rather than erroring or silently dropping the old index
/// config. Non-JSON-object input falls back to replacing wholesale.
pub(crate) fn merge_configuration_json(existing: Option<&str>, update: &str) -> String {
    const VARIANT_KEYS: [&str; 2] = ["hnsw_configuration", "spann_configuration"];

    let update_value: serde_json::Value = match serde_json::from_str(update) {
        Ok(v) => v,
        Err(_) => return update.to_string(),
    };
    let Some(update_obj) = update_value.as_object() else {
        return update.to_string();
    };

    let existing_value: serde_json::Value = existing
        .and_then(|s| serde_json::from_str(s).ok())
        .unwrap_or_else(|| serde_json::Value::Object(serde_json::Map::new()));
    let mut merged = existing_value.as_object().cloned().unwrap_or_default();

    let existing_variant = VARIANT_KEYS.iter().find(|k| {
        merged.get(**k).is_some_and(|v| !v.is_null())
    });

    for (key, value) in update_obj {
        if let Some(existing_variant) = existing_variant {
            let is_conflicting_variant_change =
                VARIANT_KEYS.contains(&key.as_str()) && key != existing_variant && !value.is_null();
            if is_conflicting_variant_change {
                tracing::warn!(
                    from = %existing_variant,
                    to = %key,
                    "ignoring index configuration type change, keeping existing variant"
                );
                continue;
            }
        }
        merged.insert(key.clone(), value.clone());
    }

    serde_json::Value::Object(merged).to_string()
}

pub(crate) async fn insert_collection_row<'c>(
    tx: &mut sqlx::Transaction<'c, sqlx::Sqlite>,
    collection: &Collection,
) -> Result<(), CatalogError> {
    let query = "INSERT INTO collections (\
        id, name, tenant_id, database_id, created_at_secs, root_collection_id, dimension, \
        configuration_json, schema_json, is_deleted, updated_at_secs, version, version_file_path, \
        lineage_file_path, log_position, total_records_post_compaction, size_bytes_post_compaction, \
        last_compaction_time_secs, num_versions, oldest_version_ts\
    ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19,$20)";
    tx.execute(
        sqlx::query(query)
            .bind(collection.id.to_string())
            .bind(&collection.name)
            .bind(&collection.tenant_id)
            .bind(collection.database_id.to_string())
            .bind(collection.created_at_secs)
            .bind(collection.root_collection_id.map(|id| id.to_string()))
            .bind(collection.dimension)
            .bind(&collection.configuration_json)
            .bind(&collection.schema_json)
            .bind(collection.is_deleted)
            .bind(collection.updated_at_secs)
            .bind(collection.version)
            .bind(&collection.version_file_path)
            .bind(&collection.lineage_file_path)
            .bind(collection.log_position)
            .bind(collection.total_records_post_compaction as i64)
            .bind(collection.size_bytes_post_compaction as i64)
            .bind(collection.last_compaction_time_secs)
            .bind(collection.num_versions)
            .bind(collection.oldest_version_ts),
    )
    .await
    .map_err(map_sqlx_err)?;
    Ok(())
}

pub(crate) async fn insert_segment_row<'c>(
    tx: &mut sqlx::Transaction<'c, sqlx::Sqlite>,
    collection_id: &CollectionUuid,
    segment: &Segment,
) -> Result<(), CatalogError> {
    tx.execute(
        sqlx::query("INSERT INTO segments (id, collection_id, segment_type, scope) VALUES ($1,$2,$3,$4)")
            .bind(segment.id.to_string())
            .bind(collection_id.to_string())
            .bind(&segment.r#type)
            .bind(scope_to_str(&segment.scope)),
    )
    .await
    .map_err(map_sqlx_err)?;

    for (role, paths) in &segment.file_paths {
        for (position, path) in paths.iter().enumerate() {
            tx.execute(
                sqlx::query(
                    "INSERT INTO segment_file_paths (segment_id, role, position, path) VALUES ($1,$2,$3,$4)",
                )
                .bind(segment.id.to_string())
                .bind(role)
                .bind(position as i64)
                .bind(path),
            )
            .await
            .map_err(map_sqlx_err)?;
        }
    }

    if let Some(metadata) = &segment.metadata {
        replace_metadata(tx, "segment_metadata", "segment_id", &segment.id.to_string(), metadata).await?;
    }
    Ok(())
}

pub(crate) fn scope_to_str(scope: &SegmentScope) -> &'static str {
    match scope {
        SegmentScope::Vector => "vector",
        SegmentScope::Record => "record",
        SegmentScope::Metadata => "metadata",
    }
}

pub(crate) fn str_to_scope(s: &str) -> Result<SegmentScope, CatalogError> {
    match s {
        "vector" => Ok(SegmentScope::Vector),
        "record" => Ok(SegmentScope::Record),
        "metadata" => Ok(SegmentScope::Metadata),
        other => Err(CatalogError::Internal(format!("unknown segment scope {other:?}"))),
    }
}

pub(crate) fn row_to_collection(row: &SqliteRow) -> Result<Collection, CatalogError> {
    let id: String = row.get("id");
    let database_id: String = row.get("database_id");
    let root_collection_id: Option<String> = row.get("root_collection_id");
    let oldest_version_ts: i64 = row.get("oldest_version_ts");

    Ok(Collection {
        id: CollectionUuid::from_str(&id)
            .map_err(|e| CatalogError::Internal(format!("stored collection id is not a uuid: {e}")))?,
        name: row.get("name"),
        tenant_id: row.get("tenant_id"),
        database_id: DatabaseUuid::from_str(&database_id)
            .map_err(|e| CatalogError::Internal(format!("stored database id is not a uuid: {e}")))?,
        created_at_secs: row.get("created_at_secs"),
        root_collection_id: root_collection_id
            .map(|id| CollectionUuid::from_str(&id))
            .transpose()
            .map_err(|e| CatalogError::Internal(format!("stored root_collection_id is not a uuid: {e}")))?,
        dimension: row.get("dimension"),
        configuration_json: row.get("configuration_json"),
        schema_json: row.get("schema_json"),
        is_deleted: row.get("is_deleted"),
        updated_at_secs: row.get("updated_at_secs"),
        version: row.get("version"),
        version_file_path: row.get("version_file_path"),
        lineage_file_path: row.get("lineage_file_path"),
        log_position: row.get("log_position"),
        total_records_post_compaction: row.get::<i64, _>("total_records_post_compaction") as u64,
        size_bytes_post_compaction: row.get::<i64, _>("size_bytes_post_compaction") as u64,
        last_compaction_time_secs: row.get("last_compaction_time_secs"),
        num_versions: row.get("num_versions"),
        oldest_version_ts: if oldest_version_ts == 0 { None } else { Some(oldest_version_ts) },
    })
}

pub(crate) async fn fetch_collection_segments<'e, E>(
    executor: E,
    collection_id: CollectionUuid,
) -> Result<Vec<Segment>, CatalogError>
where
    E: Executor<'e, Database = sqlx::Sqlite> + Copy,
{
    let rows = sqlx::query("SELECT id, segment_type, scope FROM segments WHERE collection_id = $1")
        .bind(collection_id.to_string())
        .fetch_all(executor)
        .await
        .map_err(map_sqlx_err)?;

    let mut segments = Vec::with_capacity(rows.len());
    for row in rows {
        let id: String = row.get("id");
        let segment_id = SegmentUuid::from_str(&id)
            .map_err(|e| CatalogError::Internal(format!("stored segment id is not a uuid: {e}")))?;
        let scope_str: String = row.get("scope");

        let path_rows = sqlx::query(
            "SELECT role, position, path FROM segment_file_paths WHERE segment_id = $1 ORDER BY role, position ASC",
        )
        .bind(&id)
        .fetch_all(executor)
        .await
        .map_err(map_sqlx_err)?;
        let mut file_paths: std::collections::HashMap<String, Vec<String>> = std::collections::HashMap::new();
        for path_row in path_rows {
            let role: String = path_row.get("role");
            let path: String = path_row.get("path");
            file_paths.entry(role).or_default().push(path);
        }

        let metadata = fetch_metadata(executor, "segment_metadata", "segment_id", &id).await?;

        segments.push(Segment {
            id: segment_id,
            r#type: row.get("segment_type"),
            scope: str_to_scope(&scope_str)?,
            collection: collection_id,
            metadata: if metadata.is_empty() { None } else { Some(metadata) },
            file_paths,
        });
    }
    Ok(segments)
}


/// Same read, but against a live transaction. `Executor` is not implemented
/// for an owned `&mut Transaction` in a way that is `Copy`, so this takes
/// the transaction directly and reborrows (`&mut *tx`) for each query
/// instead of going through the generic pool-oriented helper above.
pub(crate) async fn fetch_collection_segments_tx<'c>(
    tx: &mut sqlx::Transaction<'c, sqlx::Sqlite>,
    collection_id: CollectionUuid,
) -> Result<Vec<Segment>, CatalogError> {
    let rows = sqlx::query("SELECT id, segment_type, scope FROM segments WHERE collection_id = $1")
        .bind(collection_id.to_string())
        .fetch_all(&mut **tx)
        .await
        .map_err(map_sqlx_err)?;

    let mut segments = Vec::with_capacity(rows.len());
    for row in rows {
        let id: String = row.get("id");
        let segment_id = SegmentUuid::from_str(&id)
            .map_err(|e| CatalogError::Internal(format!("stored segment id is not a uuid: {e}")))?;
        let scope_str: String = row.get("scope");

        let path_rows = sqlx::query(
            "SELECT role, position, path FROM segment_file_paths WHERE segment_id = $1 ORDER BY role, position ASC",
        )
        .bind(&id)
        .fetch_all(&mut **tx)
        .await
        .map_err(map_sqlx_err)?;
        let mut file_paths: std::collections::HashMap<String, Vec<String>> = std::collections::HashMap::new();
        for path_row in path_rows {
            let role: String = path_row.get("role");
            let path: String = path_row.get("path");
            file_paths.entry(role).or_default().push(path);
        }

        let metadata = fetch_metadata(&mut **tx, "segment_metadata", "segment_id", &id).await?;

        segments.push(Segment {
            id: segment_id,
            r#type: row.get("segment_type"),
            scope: str_to_scope(&scope_str)?,
            collection: collection_id,
            metadata: if metadata.is_empty() { None } else { Some(metadata) },
            file_paths,
        });
    }
    Ok(segments)
}

#[cfg(test)]
mod tests {
    use crate::requests::CreateCollectionRequest;
    use crate::sqlite::test_support::{create_test_collection, new_catalog, setup_tenant_and_database, three_segments};
    use catalog_types::CatalogError;

    #[tokio::test]
    async fn soft_deleted_collection_is_masked_from_default_listing_and_lookup() {
        let catalog = new_catalog().await;
        let collection = create_test_collection(&catalog, "t1", "d1", "c1").await;

        catalog.soft_delete_collection_impl(collection.id).await.unwrap();

        let by_id = catalog.get_collection_impl(collection.id, false).await;
        assert!(matches!(by_id, Err(CatalogError::NotFound(_))));

        let by_name = catalog.get_collection_by_name_impl("t1", "d1", "c1", false).await;
        assert!(matches!(by_name, Err(CatalogError::NotFound(_))));

        let listing = catalog.list_collections_impl("t1", "d1", None, 0, false).await.unwrap();
        assert!(listing.is_empty());

        // With include_soft_deleted the row is still reachable by id, under its rewritten name.
        let still_there = catalog.get_collection_impl(collection.id, true).await.unwrap();
        assert!(still_there.is_deleted);
        assert_ne!(still_there.name, "c1");
    }

    #[tokio::test]
    async fn soft_deleted_name_can_be_reused_immediately() {
        let catalog = new_catalog().await;
        let collection = create_test_collection(&catalog, "t1", "d1", "c1").await;
        catalog.soft_delete_collection_impl(collection.id).await.unwrap();

        let (recreated, created) = catalog
            .create_collection_and_segments_impl(CreateCollectionRequest {
                tenant: "t1".to_string(),
                database: "d1".to_string(),
                id: None,
                name: "c1".to_string(),
                segments: three_segments(catalog_types::CollectionUuid::new()),
                metadata: None,
                dimension: None,
                configuration_json: None,
                get_or_create: false,
            })
            .await
            .unwrap();
        assert!(created);
        assert_eq!(recreated.name, "c1");
        assert_ne!(recreated.id, collection.id);
    }

    #[tokio::test]
    async fn get_or_create_returns_existing_collection_without_creating_a_duplicate() {
        let catalog = new_catalog().await;
        let collection = create_test_collection(&catalog, "t1", "d1", "c1").await;

        let (existing, created) = catalog
            .create_collection_and_segments_impl(CreateCollectionRequest {
                tenant: "t1".to_string(),
                database: "d1".to_string(),
                id: None,
                name: "c1".to_string(),
                segments: three_segments(catalog_types::CollectionUuid::new()),
                metadata: None,
                dimension: None,
                configuration_json: None,
                get_or_create: true,
            })
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(existing.id, collection.id);
    }

    #[tokio::test]
    async fn create_without_get_or_create_rejects_name_collision() {
        let catalog = new_catalog().await;
        create_test_collection(&catalog, "t1", "d1", "c1").await;

        let err = catalog
            .create_collection_and_segments_impl(CreateCollectionRequest {
                tenant: "t1".to_string(),
                database: "d1".to_string(),
                id: None,
                name: "c1".to_string(),
                segments: three_segments(catalog_types::CollectionUuid::new()),
                metadata: None,
                dimension: None,
                configuration_json: None,
                get_or_create: false,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn update_collection_rejects_mutation_of_a_soft_deleted_collection() {
        let catalog = new_catalog().await;
        let collection = create_test_collection(&catalog, "t1", "d1", "c1").await;
        catalog.soft_delete_collection_impl(collection.id).await.unwrap();

        let err = catalog
            .update_collection_impl(collection.id, Some("renamed".to_string()), None, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::SoftDeleted(_)));
    }

    #[tokio::test]
    async fn update_collection_configuration_merges_new_keys_over_existing() {
        let catalog = new_catalog().await;
        let collection = create_test_collection(&catalog, "t1", "d1", "c1").await;
        catalog
            .update_collection_impl(
                collection.id,
                None,
                None,
                None,
                Some(r#"{"hnsw_configuration":{"ef_search":10}}"#.to_string()),
            )
            .await
            .unwrap();

        let updated = catalog
            .update_collection_impl(
                collection.id,
                None,
                None,
                None,
                Some(r#"{"hnsw_configuration":{"ef_search":20}}"#.to_string()),
            )
            .await
            .unwrap();

        let value: serde_json::Value = serde_json::from_str(updated.configuration_json.as_deref().unwrap()).unwrap();
        assert_eq!(value["hnsw_configuration"]["ef_search"], 20);
    }

    #[tokio::test]
    async fn update_collection_configuration_ignores_index_type_change() {
        let catalog = new_catalog().await;
        let collection = create_test_collection(&catalog, "t1", "d1", "c1").await;
        catalog
            .update_collection_impl(
                collection.id,
                None,
                None,
                None,
                Some(r#"{"hnsw_configuration":{"ef_search":10}}"#.to_string()),
            )
            .await
            .unwrap();

        // A later update attempting to switch the index type to SPANN must
        // not overwrite the stored HNSW configuration; this is a
        // documented conservative merge policy, not a bug to "fix" into an
        // error.
        let updated = catalog
            .update_collection_impl(
                collection.id,
                None,
                None,
                None,
                Some(r#"{"spann_configuration":{"search_nprobe":5}}"#.to_string()),
            )
            .await
            .unwrap();

        let value: serde_json::Value = serde_json::from_str(updated.configuration_json.as_deref().unwrap()).unwrap();
        assert_eq!(value["hnsw_configuration"]["ef_search"], 10);
        assert!(value.get("spann_configuration").is_none() || value["spann_configuration"].is_null());
    }

    #[tokio::test]
    async fn list_databases_excludes_soft_deleted() {
        let catalog = new_catalog().await;
        setup_tenant_and_database(&catalog, "t1", "d1").await;
        catalog.delete_database_impl("d1", "t1").await.unwrap();
        let dbs = catalog.list_databases_impl("t1", None, 0).await.unwrap();
        assert!(dbs.is_empty());
    }
}
