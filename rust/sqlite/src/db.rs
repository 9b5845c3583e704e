use crate::config::{MigrationHash, MigrationMode, SqliteDBConfig};
use crate::migrations::{GetSourceMigrationsError, Migration, MigrationDir, MIGRATION_DIRS};
use async_trait::async_trait;
use catalog_config::{registry::Registry, Configurable};
use catalog_error::{CatalogError, ErrorCodes};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{Executor, Row};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone)]
/// A wrapper around a SQLite database connection that also runs migrations
/// on the database
/// ## Fields:
/// - conn: SqlitePool - The connection to the SQLite database
/// ## Notes:
/// - Clone safety: The SqlitePool is cloneable and all clones share the same connection
///     pool. The pool is Send/Sync.
pub struct SqliteDb {
    conn: SqlitePool,
    migration_hash_type: MigrationHash,
}

impl SqliteDb {
    pub(crate) fn new(conn: SqlitePool, migration_hash_type: MigrationHash) -> Self {
        Self {
            conn,
            migration_hash_type,
        }
    }

    pub fn get_conn(&self) -> &SqlitePool {
        &self.conn
    }

    pub async fn reset(&self) -> Result<(), SqliteMigrationError> {
        let query = r#"
            SELECT name FROM sqlite_master
            WHERE type='table'
        "#;
        let rows = sqlx::query(query).fetch_all(&self.conn).await?;
        for row in rows {
            let name: String = row.get("name");
            let query = format!("DROP TABLE IF EXISTS {}", name);
            sqlx::query(&query).execute(&self.conn).await?;
        }

        self.initialize_migrations_table().await?;
        self.apply_all_migration().await?;

        Ok(())
    }

    //////////////////////// Migrations ////////////////////////

    pub(crate) async fn apply_all_migration(&self) -> Result<(), SqliteMigrationError> {
        let mut all_unapplied_migrations = Vec::new();
        for dir in MIGRATION_DIRS.iter() {
            let applied_migrations = self.get_existing_migrations(dir).await;
            let source_migrations = dir
                .get_source_migrations(&self.migration_hash_type)
                .map_err(SqliteMigrationError::GetSourceMigrationsError)?;
            let unapplied = self
                .validate_migrations_and_get_unapplied(applied_migrations, source_migrations)
                .map_err(SqliteMigrationError::MigrationValidationError)?;
            all_unapplied_migrations.extend(unapplied);
        }
        self.apply_migrations(all_unapplied_migrations).await?;

        Ok(())
    }

    pub(crate) async fn validate_all_migrations(&self) -> Result<(), SqliteMigrationError> {
        if !self.has_initialized_migrations().await {
            return Err(SqliteMigrationError::MigrationsTableNotInitialized);
        }
        for dir in MIGRATION_DIRS.iter() {
            let applied_migrations = self.get_existing_migrations(dir).await;
            let source_migrations = dir
                .get_source_migrations(&self.migration_hash_type)
                .map_err(SqliteMigrationError::GetSourceMigrationsError)?;
            let unapplied =
                self.validate_migrations_and_get_unapplied(applied_migrations, source_migrations)?;
            if !unapplied.is_empty() {
                return Err(SqliteMigrationError::UnappliedMigrationsFound);
            }
        }

        Ok(())
    }

    /// Apply all migrations in a transaction
    /// Arguments:
    /// - migrations: Vec<Migration> - The migrations to apply
    async fn apply_migrations(&self, migrations: Vec<Migration>) -> Result<(), sqlx::Error> {
        let mut tx = self.conn.begin().await?;
        for migration in migrations {
            // Applied per-statement; sqlite's transactional DDL makes this safe.
            tx.execute("PRAGMA foreign_keys = ON").await?;
            tx.execute(sqlx::query(&migration.sql)).await?;

            let query = r#"
                INSERT INTO migrations (dir, version, filename, sql, hash)
                VALUES ($1, $2, $3, $4, $5)
            "#;
            let query = sqlx::query(query)
                .bind(&migration.dir)
                .bind(migration.version)
                .bind(&migration.filename)
                .bind(&migration.sql)
                .bind(&migration.hash);
            tx.execute(query).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Validate migration sequence and get the migrations that need to be applied
    /// ## Arguments:
    /// - applied_migrations: Vec<Migration> - The migrations that have been applied, in ascending version order
    /// - source_migrations: Vec<Migration> - The migrations that are on disk, in ascending version order
    /// ## Returns:
    /// - Vec<Migration> - The migrations that need to be applied
    fn validate_migrations_and_get_unapplied(
        &self,
        applied_migrations: Vec<Migration>,
        source_migrations: Vec<Migration>,
    ) -> Result<Vec<Migration>, MigrationValidationError> {
        for (db_migration, source_migration) in
            applied_migrations.iter().zip(source_migrations.iter())
        {
            if db_migration.version != source_migration.version {
                return Err(MigrationValidationError::InconsistentVersion(
                    db_migration.version,
                    source_migration.version,
                ));
            }
            if db_migration.hash != source_migration.hash {
                return Err(MigrationValidationError::InconsistentHash(
                    db_migration.hash.clone(),
                    source_migration.hash.clone(),
                ));
            }
            if db_migration.sql != source_migration.sql {
                return Err(MigrationValidationError::InconsistentHash(
                    db_migration.hash.clone(),
                    source_migration.hash.clone(),
                ));
            }
        }

        if applied_migrations.len() > source_migrations.len() {
            return Ok(vec![]);
        }

        let unapplied = source_migrations[applied_migrations.len()..].to_vec();
        Ok(unapplied)
    }

    /// Initialize the migrations table
    /// Note:
    /// - This function is idempotent
    pub(crate) async fn initialize_migrations_table(&self) -> Result<(), sqlx::Error> {
        let query = r#"
            CREATE TABLE IF NOT EXISTS migrations (
                dir TEXT NOT NULL,
                version INTEGER NOT NULL,
                filename TEXT NOT NULL,
                sql TEXT NOT NULL,
                hash TEXT NOT NULL,
                PRIMARY KEY (dir, version)
            )
        "#;
        sqlx::query(query).execute(&self.conn).await?;
        // HACK: https://github.com/launchbadge/sqlx/issues/481#issuecomment-2224913791
        // sqlx's sqlite pool does not expose a real `BEGIN IMMEDIATE`, so a
        // single always-present row stands in as a write-lock target for
        // callers that need to serialize concurrent writers explicitly.
        let lock_table = r#"
            CREATE TABLE IF NOT EXISTS acquire_write (
                id INTEGER PRIMARY KEY,
                lock_status INTEGER NOT NULL
            )
        "#;
        sqlx::query(lock_table).execute(&self.conn).await?;
        let insert_lock = r#"
            INSERT INTO acquire_write (lock_status) VALUES (TRUE)
        "#;
        sqlx::query(insert_lock).execute(&self.conn).await?;
        Ok(())
    }

    pub async fn begin_immediate<'tx, C>(&self, tx: C) -> Result<(), sqlx::Error>
    where
        C: sqlx::Executor<'tx, Database = sqlx::Sqlite>,
    {
        let query = r#"
            UPDATE acquire_write SET lock_status = TRUE WHERE id = 1
        "#;
        match tx.execute(query).await {
            Ok(_) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Check if the migrations table has been initialized
    /// Returns:
    /// - bool - True if the migrations table has been initialized
    async fn has_initialized_migrations(&self) -> bool {
        let query = r#"
            SELECT name FROM sqlite_master WHERE type='table' AND name='migrations'
        "#;
        let row = sqlx::query(query)
            .fetch_one(&self.conn)
            .await
            .expect("Expect it to be fetched");
        let name: String = row.get("name");
        name == "migrations" // Sanity check
    }

    /// Get existing migrations for a given directory
    /// Arguments:
    /// - dir_name: str - The name of the directory that contains the migrations
    /// ## Returns:
    /// - Vec<Migration> - A list of migrations, sorted by version in ascending order
    async fn get_existing_migrations(&self, dir: &MigrationDir) -> Vec<Migration> {
        let query = r#"
            SELECT dir, version, filename, sql, hash
            FROM migrations
            WHERE dir = $1
            ORDER BY version ASC
        "#;
        let rows = sqlx::query(query)
            .bind(dir.as_str())
            .fetch_all(&self.conn)
            .await
            .expect("Expect it to be fetched");

        let mut migrations = Vec::new();
        for row in rows {
            let dir: String = row.get("dir");
            let version: i32 = row.get("version");
            let filename: String = row.get("filename");
            let sql: String = row.get("sql");
            let hash: String = row.get("hash");
            migrations.push(Migration::new(dir, filename, version, sql, hash));
        }
        migrations
    }
}

#[async_trait]
impl Configurable<SqliteDBConfig> for SqliteDb {
    async fn try_from_config(
        config: &SqliteDBConfig,
        _registry: &Registry,
    ) -> Result<Self, Box<dyn CatalogError>> {
        let connect_options = match &config.url {
            Some(url) => SqliteConnectOptions::from_str(url)
                .map_err(SqliteCreationError::SqlxError)?
                .create_if_missing(true),
            None => SqliteConnectOptions::from_str(":memory:")
                .map_err(SqliteCreationError::SqlxError)?,
        };
        let pool = SqlitePoolOptions::new()
            // In-memory databases only survive while at least one
            // connection is held; a single-connection pool keeps all
            // callers on the same in-memory instance.
            .max_connections(if config.url.is_none() { 1 } else { 10 })
            .connect_with(connect_options)
            .await
            .map_err(SqliteCreationError::SqlxError)?;

        let db = SqliteDb::new(pool, config.hash_type.clone());
        db.initialize_migrations_table()
            .await
            .map_err(SqliteCreationError::SqlxError)?;

        match config.migration_mode {
            MigrationMode::Apply => db
                .apply_all_migration()
                .await
                .map_err(SqliteCreationError::MigrationError)?,
            MigrationMode::Validate => db
                .validate_all_migrations()
                .await
                .map_err(SqliteCreationError::MigrationError)?,
        }

        Ok(db)
    }
}

//////////////////////// Error Types ////////////////////////

#[derive(Error, Debug)]
pub enum SqliteMigrationError {
    #[error(transparent)]
    SqlxError(#[from] sqlx::Error),
    #[error(transparent)]
    GetSourceMigrationsError(#[from] GetSourceMigrationsError),
    #[error(transparent)]
    MigrationValidationError(#[from] MigrationValidationError),
    #[error("Migrations table not initialized")]
    MigrationsTableNotInitialized,
    #[error("Unapplied migrations found")]
    UnappliedMigrationsFound,
}

impl CatalogError for SqliteMigrationError {
    fn code(&self) -> ErrorCodes {
        ErrorCodes::Internal
    }
}

#[derive(Error, Debug)]
pub enum SqliteCreationError {
    #[error(transparent)]
    MigrationError(#[from] SqliteMigrationError),
    #[error(transparent)]
    SqlxError(#[from] sqlx::Error),
}

impl CatalogError for SqliteCreationError {
    fn code(&self) -> ErrorCodes {
        match self {
            SqliteCreationError::MigrationError(err) => err.code(),
            SqliteCreationError::SqlxError(_) => ErrorCodes::Internal,
        }
    }
}

impl From<SqliteCreationError> for Box<dyn CatalogError> {
    fn from(err: SqliteCreationError) -> Self {
        err.boxed()
    }
}

#[derive(Error, Debug)]
pub enum MigrationValidationError {
    #[error("Inconsistent version: db={0}, source={1}")]
    InconsistentVersion(i32, i32),
    #[error("Inconsistent hash: db={0}, source={1}")]
    InconsistentHash(String, String),
}

//////////////////////// Test Helpers ////////////////////////

pub mod test_utils {
    use super::*;
    use crate::config::MigrationHash;
    use std::path::PathBuf;
    use tempfile::tempdir;

    #[allow(dead_code)]
    pub(crate) fn test_migration_dir() -> PathBuf {
        let migration_dir = "migrations/".to_string();
        PathBuf::from(migration_dir)
    }

    pub fn new_test_db_persist_path() -> Option<String> {
        let path = tempdir().unwrap().into_path();
        Some(path.to_str().unwrap().to_string() + "/catalog.sqlite3")
    }

    pub async fn get_new_sqlite_db() -> SqliteDb {
        let config = SqliteDBConfig {
            url: new_test_db_persist_path(),
            hash_type: MigrationHash::MD5,
            migration_mode: MigrationMode::Apply,
        };
        let registry = Registry::new();
        SqliteDb::try_from_config(&config, &registry)
            .await
            .expect("Expect it to be created")
    }
}
