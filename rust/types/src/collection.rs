use crate::common::{soft_deleted_name, CollectionUuid, DatabaseUuid};
use crate::metadata::Metadata;
use serde::{Deserialize, Serialize};

/// The central entity of the catalog. See invariants I1-I4 on the mutation
/// methods below; the DAO layer is responsible for enforcing them inside a
/// transaction, these helpers just compute the resulting row shape.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    pub id: CollectionUuid,
    pub name: String,
    pub tenant_id: String,
    pub database_id: DatabaseUuid,

    pub created_at_secs: i64,
    pub root_collection_id: Option<CollectionUuid>,

    pub dimension: Option<i32>,
    pub configuration_json: Option<String>,
    pub schema_json: Option<String>,
    pub is_deleted: bool,
    pub updated_at_secs: i64,

    /// Invariant I1: `version` and `version_file_path` move together.
    pub version: i64,
    pub version_file_path: String,

    /// Present only when this collection is a fork root (I2).
    pub lineage_file_path: Option<String>,

    pub log_position: i64,
    pub total_records_post_compaction: u64,
    pub size_bytes_post_compaction: u64,
    pub last_compaction_time_secs: i64,
    pub num_versions: i64,
    pub oldest_version_ts: Option<i64>,
}

impl Collection {
    pub fn new(name: impl Into<String>, tenant_id: impl Into<String>, database_id: DatabaseUuid, created_at_secs: i64) -> Self {
        Collection {
            id: CollectionUuid::new(),
            name: name.into(),
            tenant_id: tenant_id.into(),
            database_id,
            created_at_secs,
            root_collection_id: None,
            dimension: None,
            configuration_json: None,
            schema_json: None,
            is_deleted: false,
            updated_at_secs: created_at_secs,
            version: 0,
            version_file_path: String::new(),
            lineage_file_path: None,
            log_position: 0,
            total_records_post_compaction: 0,
            size_bytes_post_compaction: 0,
            last_compaction_time_secs: 0,
            num_versions: 1,
            oldest_version_ts: Some(created_at_secs),
        }
    }

    pub fn is_fork_root(&self) -> bool {
        self.lineage_file_path.is_some()
    }

    /// I3: rewrites `name` to the reserved soft-delete form, freeing the
    /// original name for immediate reuse.
    pub fn soft_delete(&mut self, now_secs: i64) {
        self.name = soft_deleted_name(&self.name, self.id);
        self.is_deleted = true;
        self.updated_at_secs = now_secs;
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CollectionAndSegments {
    pub collection: Collection,
    pub metadata_segment: crate::segment::Segment,
    pub record_segment: crate::segment::Segment,
    pub vector_segment: crate::segment::Segment,
}

/// What callers may change via `UpdateCollection`; `Reset` clears the field
/// to its unset/default state rather than leaving it untouched.
#[derive(Clone, Debug)]
pub enum CollectionMetadataUpdate {
    UpdateMetadata(Metadata),
    ResetMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn soft_delete_rewrites_name_and_sets_deleted() {
        let mut c = Collection::new("my-collection", "t1", DatabaseUuid::new(), 1000);
        let original_id = c.id;
        c.soft_delete(2000);
        assert!(c.is_deleted);
        assert_eq!(c.name, format!("_deleted_my-collection_{original_id}"));
        assert_eq!(c.updated_at_secs, 2000);
    }

    #[test]
    fn new_collection_starts_at_version_zero_with_empty_version_file_path() {
        let c = Collection::new("c", "t1", DatabaseUuid::new(), 1000);
        assert_eq!(c.version, 0);
        assert_eq!(c.version_file_path, "");
        assert!(!c.is_fork_root());
    }
}
