#[derive(Clone)]
pub struct SqliteDBConfig {
    /// Filesystem path to the sqlite database file. `None` opens an
    /// in-memory, non-persisted database (used in tests).
    pub url: Option<String>,
    pub hash_type: MigrationHash,
    pub migration_mode: MigrationMode,
}

impl Default for SqliteDBConfig {
    fn default() -> Self {
        Self {
            url: None,
            hash_type: MigrationHash::SHA256,
            migration_mode: MigrationMode::Apply,
        }
    }
}

/// Migration mode for the database
/// - Apply: Apply the migrations
/// - Validate: Validate the applied migrations and ensure none are unapplied
#[derive(Clone, PartialEq)]
pub enum MigrationMode {
    Apply,
    Validate,
}

/// The hash function to use for the migration files
/// - SHA256: Use SHA256 hash
/// - MD5: Use MD5 hash
#[derive(Clone)]
pub enum MigrationHash {
    SHA256,
    MD5,
}
