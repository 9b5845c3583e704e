use super::{map_sqlx_err, now_secs, SqliteCatalog};
use catalog_types::{CatalogError, Database, DatabaseUuid, Tenant};
use sqlx::{Executor, Row};
use std::str::FromStr;

impl SqliteCatalog {
    pub(crate) async fn create_tenant_impl(&self, name: &str) -> Result<Tenant, CatalogError> {
        let query = "INSERT INTO tenants (name) VALUES ($1)";
        sqlx::query(query)
            .bind(name)
            .execute(self.db.get_conn())
            .await
            .map_err(map_sqlx_err)?;
        Ok(Tenant::new(name))
    }

    pub(crate) async fn get_tenant_impl(&self, name: &str) -> Result<Tenant, CatalogError> {
        let query = "SELECT name, last_compaction_time_secs, resource_name FROM tenants WHERE name = $1";
        let row = sqlx::query(query)
            .bind(name)
            .fetch_optional(self.db.get_conn())
            .await
            .map_err(map_sqlx_err)?
            .ok_or_else(|| CatalogError::NotFound(format!("tenant {name}")))?;
        Ok(Tenant {
            name: row.get("name"),
            last_compaction_time_secs: row.get("last_compaction_time_secs"),
            resource_name: row.get("resource_name"),
        })
    }

    pub(crate) async fn set_tenant_resource_name_impl(
        &self,
        name: &str,
        resource_name: &str,
    ) -> Result<(), CatalogError> {
        let rows_affected =
            sqlx::query("UPDATE tenants SET resource_name = $1 WHERE name = $2")
                .bind(resource_name)
                .bind(name)
                .execute(self.db.get_conn())
                .await
                .map_err(map_sqlx_err)?
                .rows_affected();
        if rows_affected == 0 {
            return Err(CatalogError::NotFound(format!("tenant {name}")));
        }
        Ok(())
    }

    pub(crate) async fn get_tenant_by_resource_name_impl(
        &self,
        resource_name: &str,
    ) -> Result<Tenant, CatalogError> {
        let query = "SELECT name, last_compaction_time_secs, resource_name FROM tenants WHERE resource_name = $1";
        let row = sqlx::query(query)
            .bind(resource_name)
            .fetch_optional(self.db.get_conn())
            .await
            .map_err(map_sqlx_err)?
            .ok_or_else(|| CatalogError::NotFound(format!("tenant with resource_name {resource_name}")))?;
        Ok(Tenant {
            name: row.get("name"),
            last_compaction_time_secs: row.get("last_compaction_time_secs"),
            resource_name: row.get("resource_name"),
        })
    }

    pub(crate) async fn create_database_impl(
        &self,
        database: Database,
    ) -> Result<Database, CatalogError> {
        let query = "INSERT INTO databases (id, name, tenant_id) VALUES ($1, $2, $3)";
        sqlx::query(query)
            .bind(database.id.to_string())
            .bind(&database.name)
            .bind(&database.tenant)
            .execute(self.db.get_conn())
            .await
            .map_err(map_sqlx_err)?;
        Ok(database)
    }

    pub(crate) async fn get_database_impl(
        &self,
        name: &str,
        tenant: &str,
    ) -> Result<Database, CatalogError> {
        let query =
            "SELECT id, name, tenant_id, is_deleted FROM databases WHERE name = $1 AND tenant_id = $2 AND is_deleted = FALSE";
        let row = sqlx::query(query)
            .bind(name)
            .bind(tenant)
            .fetch_optional(self.db.get_conn())
            .await
            .map_err(map_sqlx_err)?
            .ok_or_else(|| CatalogError::NotFound(format!("database {tenant}/{name}")))?;
        row_to_database(&row)
    }

    pub(crate) async fn list_databases_impl(
        &self,
        tenant: &str,
        limit: Option<u32>,
        offset: u32,
    ) -> Result<Vec<Database>, CatalogError> {
        let query = "SELECT id, name, tenant_id, is_deleted FROM databases \
                     WHERE tenant_id = $1 AND is_deleted = FALSE ORDER BY name ASC LIMIT $2 OFFSET $3";
        let rows = sqlx::query(query)
            .bind(tenant)
            .bind(limit.map(|l| l as i64).unwrap_or(-1))
            .bind(offset as i64)
            .fetch_all(self.db.get_conn())
            .await
            .map_err(map_sqlx_err)?;
        rows.iter().map(row_to_database).collect()
    }

    pub(crate) async fn delete_database_impl(
        &self,
        name: &str,
        tenant: &str,
    ) -> Result<(), CatalogError> {
        let mut tx = self.db.get_conn().begin().await.map_err(map_sqlx_err)?;
        self.db
            .begin_immediate(&mut *tx)
            .await
            .map_err(map_sqlx_err)?;

        let row = sqlx::query(
            "SELECT id FROM databases WHERE name = $1 AND tenant_id = $2 AND is_deleted = FALSE",
        )
        .bind(name)
        .bind(tenant)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_err)?
        .ok_or_else(|| CatalogError::NotFound(format!("database {tenant}/{name}")))?;
        let database_id: String = row.get("id");

        tx.execute(
            sqlx::query("UPDATE databases SET is_deleted = TRUE, deleted_at_secs = $1 WHERE id = $2")
                .bind(now_secs())
                .bind(&database_id),
        )
        .await
        .map_err(map_sqlx_err)?;

        // Cascade: soft-delete every live collection in this database, with
        // the same reserved-name rewrite `soft_delete_collection` applies.
        let now = now_secs();
        let live_collections =
            sqlx::query("SELECT id, name FROM collections WHERE database_id = $1 AND is_deleted = FALSE")
                .bind(&database_id)
                .fetch_all(&mut *tx)
                .await
                .map_err(map_sqlx_err)?;
        for collection_row in live_collections {
            let id: String = collection_row.get("id");
            let name: String = collection_row.get("name");
            let new_name = catalog_types::soft_deleted_name(
                &name,
                catalog_types::CollectionUuid(uuid::Uuid::from_str(&id).map_err(|e| {
                    CatalogError::Internal(format!("stored collection id is not a uuid: {e}"))
                })?),
            );
            tx.execute(
                sqlx::query(
                    "UPDATE collections SET is_deleted = TRUE, name = $1, updated_at_secs = $2 WHERE id = $3",
                )
                .bind(new_name)
                .bind(now)
                .bind(id),
            )
            .await
            .map_err(map_sqlx_err)?;
        }

        tx.commit().await.map_err(map_sqlx_err)?;
        Ok(())
    }

    /// Deletes database rows whose soft-delete has aged past `cutoff_secs`
    /// and which have no remaining live or soft-deleted collection rows.
    pub(crate) async fn finish_database_deletion_impl(
        &self,
        cutoff_secs: i64,
    ) -> Result<u64, CatalogError> {
        let mut tx = self.db.get_conn().begin().await.map_err(map_sqlx_err)?;
        self.db
            .begin_immediate(&mut *tx)
            .await
            .map_err(map_sqlx_err)?;

        let candidates = sqlx::query(
            "SELECT databases.id AS id FROM databases \
             WHERE databases.is_deleted = TRUE \
             AND databases.deleted_at_secs IS NOT NULL \
             AND databases.deleted_at_secs <= $1 \
             AND NOT EXISTS (SELECT 1 FROM collections WHERE collections.database_id = databases.id)",
        )
        .bind(cutoff_secs)
        .fetch_all(&mut *tx)
        .await
        .map_err(map_sqlx_err)?;

        let mut deleted = 0u64;
        for row in candidates {
            let id: String = row.get("id");
            tx.execute(sqlx::query("DELETE FROM databases WHERE id = $1").bind(id))
                .await
                .map_err(map_sqlx_err)?;
            deleted += 1;
        }

        tx.commit().await.map_err(map_sqlx_err)?;
        Ok(deleted)
    }
}

fn row_to_database(row: &sqlx::sqlite::SqliteRow) -> Result<Database, CatalogError> {
    let id: String = row.get("id");
    Ok(Database {
        id: DatabaseUuid::from_str(&id)
            .map_err(|e| CatalogError::Internal(format!("stored database id is not a uuid: {e}")))?,
        name: row.get("name"),
        tenant: row.get("tenant_id"),
        is_deleted: row.get("is_deleted"),
    })
}
