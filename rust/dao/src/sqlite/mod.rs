mod attach;
mod catalog_impl;
mod collection;
mod delete;
mod flush;
mod fork;
mod gc;
mod segment;
#[cfg(test)]
pub(crate) mod test_support;
mod tenant_database;

use catalog_sqlite::SqliteDb;
use catalog_storage::BlobStore;
use catalog_types::{CatalogError, Metadata, MetadataValue};
use sqlx::sqlite::SqliteRow;
use sqlx::{Executor, Row};
use std::time::{SystemTime, UNIX_EPOCH};

/// Relational DAO + protocol implementation over an embedded SQLite
/// database. Stateless beyond the pool handle and the blob store handle;
/// every write path serializes through the teacher's `acquire_write`
/// single-writer lock table (`SqliteDb::begin_immediate`) so two concurrent
/// writers on this one SQLite file observe real mutual exclusion rather
/// than sqlite's default "busy" error.
pub struct SqliteCatalog {
    pub(crate) db: SqliteDb,
    pub(crate) storage: BlobStore,
}

impl SqliteCatalog {
    pub fn new(db: SqliteDb, storage: BlobStore) -> Self {
        SqliteCatalog { db, storage }
    }
}

pub(crate) fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the unix epoch")
        .as_secs() as i64
}

pub(crate) fn map_sqlx_err(err: sqlx::Error) -> CatalogError {
    match err {
        sqlx::Error::RowNotFound => CatalogError::NotFound("row not found".to_string()),
        sqlx::Error::Database(ref db_err)
            if db_err.kind() == sqlx::error::ErrorKind::UniqueViolation =>
        {
            CatalogError::AlreadyExists(db_err.message().to_string())
        }
        other => CatalogError::Internal(other.to_string()),
    }
}

/// Reads the metadata rows for one `(table, key-column)` pair, ordered by
/// `position`, back into an ordered `Metadata`.
pub(crate) async fn fetch_metadata<'e, E>(
    executor: E,
    table: &str,
    key_column: &str,
    id: &str,
) -> Result<Metadata, CatalogError>
where
    E: Executor<'e, Database = sqlx::Sqlite>,
{
    let query = format!(
        "SELECT key, value_type, value_string, value_int, value_float, value_bool \
         FROM {table} WHERE {key_column} = $1 ORDER BY position ASC"
    );
    let rows = sqlx::query(&query)
        .bind(id)
        .fetch_all(executor)
        .await
        .map_err(map_sqlx_err)?;

    let mut metadata = Metadata::new();
    for row in rows {
        let key: String = row.get("key");
        let value_type: String = row.get("value_type");
        let value = match value_type.as_str() {
            "string" => MetadataValue::String(row.get("value_string")),
            "int" => MetadataValue::Int(row.get("value_int")),
            "float" => MetadataValue::Float(row.get("value_float")),
            "bool" => MetadataValue::Bool(row.get("value_bool")),
            other => {
                tracing::error!(value_type = other, key = %key, "unrecognized stored metadata value_type");
                return Err(CatalogError::UnknownMetadataType);
            }
        };
        metadata.insert(key, value);
    }
    Ok(metadata)
}

/// Replaces all metadata rows for `id` with `metadata`, preserving its
/// iteration order as the `position` column.
pub(crate) async fn replace_metadata<'c>(
    tx: &mut sqlx::Transaction<'c, sqlx::Sqlite>,
    table: &str,
    key_column: &str,
    id: &str,
    metadata: &Metadata,
) -> Result<(), CatalogError> {
    let delete = format!("DELETE FROM {table} WHERE {key_column} = $1");
    tx.execute(sqlx::query(&delete).bind(id))
        .await
        .map_err(map_sqlx_err)?;

    let insert = format!(
        "INSERT INTO {table} ({key_column}, key, position, value_type, value_string, value_int, value_float, value_bool) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"
    );
    for (position, (key, value)) in metadata.iter().enumerate() {
        let (value_type, value_string, value_int, value_float, value_bool): (
            &str,
            Option<&str>,
            Option<i64>,
            Option<f64>,
            Option<bool>,
        ) = match value {
            MetadataValue::String(s) => ("string", Some(s.as_str()), None, None, None),
            MetadataValue::Int(i) => ("int", None, Some(*i), None, None),
            MetadataValue::Float(f) => ("float", None, None, Some(*f), None),
            MetadataValue::Bool(b) => ("bool", None, None, None, Some(*b)),
        };
        let query = sqlx::query(&insert)
            .bind(id)
            .bind(key)
            .bind(position as i64)
            .bind(value_type)
            .bind(value_string)
            .bind(value_int)
            .bind(value_float)
            .bind(value_bool);
        tx.execute(query).await.map_err(map_sqlx_err)?;
    }
    Ok(())
}

pub(crate) fn row_get_opt_string(row: &SqliteRow, col: &str) -> Option<String> {
    row.try_get::<Option<String>, _>(col).ok().flatten()
}
