//! Builds, validates, and mutates a collection's version-history blob.
//!
//! A version file is an append-only sequence of `VersionInfo` entries,
//! identified by an immutable header (tenant/database/collection/name).
//! The compaction flush protocol and the GC mark/delete protocol both
//! mutate it by writing a brand-new blob at a fresh path and then
//! CAS-updating the owning collection row's pointer -- this module only
//! knows how to build that next blob's contents, never how to install the
//! pointer.

use catalog_proto::{
    FilePaths, MutableVersionInfo, SegmentInfo as ProtoSegmentInfo, VersionFile, VersionHistory,
    VersionInfo,
};
use catalog_storage::{BlobStore, PutOptions, StorageError};
use catalog_types::{CatalogError, Collection, CollectionFlushInfo, Segment};
use prost::Message;
use std::collections::HashMap;
use uuid::Uuid;

/// Determines the blob name suffix and the UUID version used to generate
/// it. Version 0 has no suffix at all -- its name is just `"0"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionFileOp {
    Compaction,
    GcMark,
    GcDelete,
}

impl VersionFileOp {
    fn suffix(&self) -> &'static str {
        match self {
            VersionFileOp::Compaction => "flush",
            VersionFileOp::GcMark => "gc_mark",
            VersionFileOp::GcDelete => "gc_delete",
        }
    }
}

/// Builds the path a version file's blob is uploaded to. The version
/// prefix is zero-padded to 6 digits so that a prefix-listing of
/// `versionfiles/` sorts lexicographically in version order.
pub fn generate_file_path(
    tenant: &str,
    database: &str,
    collection_id: &str,
    version: i64,
    op: Option<VersionFileOp>,
) -> String {
    let name = match op {
        None => "0".to_string(),
        Some(op @ VersionFileOp::Compaction) => {
            format!("{:06}_{}_{}", version, Uuid::new_v4(), op.suffix())
        }
        Some(op) => format!("{:06}_{}_{}", version, Uuid::now_v7(), op.suffix()),
    };
    format!(
        "tenant/{tenant}/database/{database}/collection/{collection_id}/versionfiles/{name}"
    )
}

/// Builds the version-0 `VersionFile` for a freshly created collection,
/// with full segment info taken directly from the segments it was created
/// with.
pub fn build_initial(collection: &Collection, segments: &[Segment], now_secs: i64) -> VersionFile {
    let segment_info = segment_info_map(segments);
    let version_info = VersionInfo {
        version: 0,
        created_at_secs: now_secs,
        segment_info,
        mutable_info: Some(MutableVersionInfo {
            log_position: collection.log_position,
            version: 0,
            updated_at_secs: now_secs,
        }),
        change_reason: "create".to_string(),
        marked_for_deletion: false,
    };
    VersionFile {
        tenant: collection.tenant_id.clone(),
        database: collection.database_id.to_string(),
        collection: collection.id.to_string(),
        name: "0".to_string(),
        created_at_secs: now_secs,
        version_history: Some(VersionHistory {
            versions: vec![version_info],
        }),
    }
}

/// Appends a new `VersionInfo` for `req.expected_version + 1` onto
/// `existing`'s history. If the request carries no segment flush info (an
/// empty-flush compaction), the new entry inherits segment info verbatim
/// from `current_segments` -- the collection's currently materialised
/// segments -- so the version still references live files rather than
/// nothing.
pub fn append_version(
    existing: &VersionFile,
    req: &CollectionFlushInfo,
    current_segments: &[Segment],
    now_secs: i64,
) -> Result<VersionFile, CatalogError> {
    let new_version = req.expected_version + 1;

    let segment_info = if req.segment_flush_info.is_empty() {
        segment_info_map(current_segments)
    } else {
        req.segment_flush_info
            .iter()
            .map(|flush| {
                let paths = flush
                    .file_paths
                    .iter()
                    .map(|(role, paths)| (role.clone(), FilePaths { paths: paths.clone() }))
                    .collect();
                (
                    flush.segment_id.to_string(),
                    ProtoSegmentInfo { file_paths: paths },
                )
            })
            .collect()
    };

    let version_info = VersionInfo {
        version: new_version,
        created_at_secs: now_secs,
        segment_info,
        mutable_info: Some(MutableVersionInfo {
            log_position: req.log_position,
            version: new_version,
            updated_at_secs: now_secs,
        }),
        change_reason: "flush".to_string(),
        marked_for_deletion: false,
    };

    let mut history = existing
        .version_history
        .clone()
        .unwrap_or(VersionHistory { versions: vec![] });
    history.versions.push(version_info);

    let new_file = VersionFile {
        version_history: Some(history),
        ..existing.clone()
    };

    validate(&new_file, &req.collection_id.to_string(), new_version)?;
    Ok(new_file)
}

/// Validates a version file per §4.3:
/// (a) the header's `collection` matches `expected_collection_id`;
/// (b) every non-initial version carries at least one segment;
/// (c) once any version carries non-empty file paths for a segment, no
///     later version may omit them;
/// (d) the last version's number equals `expected_version`.
pub fn validate(
    file: &VersionFile,
    expected_collection_id: &str,
    expected_version: i64,
) -> Result<(), CatalogError> {
    if file.collection != expected_collection_id {
        return Err(CatalogError::Internal(format!(
            "version file collection id mismatch: expected {expected_collection_id}, got {}",
            file.collection
        )));
    }

    let history = file.version_history.as_ref().ok_or_else(|| {
        CatalogError::Internal("version file has no version history".to_string())
    })?;
    if history.versions.is_empty() {
        return Err(CatalogError::Internal(
            "version history is empty".to_string(),
        ));
    }

    let mut seen_nonempty_paths = false;
    for (idx, version_info) in history.versions.iter().enumerate() {
        if idx == 0 {
            continue;
        }
        if version_info.segment_info.is_empty() {
            return Err(CatalogError::Internal(format!(
                "version {} has no segments",
                version_info.version
            )));
        }
        for segment_info in version_info.segment_info.values() {
            let has_paths = segment_info
                .file_paths
                .values()
                .any(|paths| !paths.paths.is_empty());
            if seen_nonempty_paths && !has_paths {
                return Err(CatalogError::Internal(format!(
                    "version {} omits file paths for a segment that previously had them",
                    version_info.version
                )));
            }
            if has_paths {
                seen_nonempty_paths = true;
            }
        }
    }

    let last_version = history.versions.last().expect("checked non-empty above").version;
    if last_version != expected_version {
        return Err(CatalogError::Internal(format!(
            "version file's last version {last_version} does not match expected {expected_version}"
        )));
    }

    Ok(())
}

/// Sets `marked_for_deletion=true` on the given version numbers. Fails if
/// any requested version is absent from the history.
pub fn mark_for_deletion(file: &mut VersionFile, versions: &[i64]) -> Result<(), CatalogError> {
    let history = file
        .version_history
        .as_mut()
        .ok_or_else(|| CatalogError::Internal("version file has no version history".to_string()))?;

    for &v in versions {
        let entry = history.versions.iter_mut().find(|vi| vi.version == v);
        match entry {
            Some(vi) => vi.marked_for_deletion = true,
            None => {
                return Err(CatalogError::NotFound(format!(
                    "version {v} not present in version file"
                )))
            }
        }
    }
    Ok(())
}

/// Physically drops the given version numbers from the history. Fails if
/// any requested version is absent.
pub fn remove_versions(file: &mut VersionFile, versions: &[i64]) -> Result<(), CatalogError> {
    let history = file
        .version_history
        .as_mut()
        .ok_or_else(|| CatalogError::Internal("version file has no version history".to_string()))?;

    for &v in versions {
        if !history.versions.iter().any(|vi| vi.version == v) {
            return Err(CatalogError::NotFound(format!(
                "version {v} not present in version file"
            )));
        }
    }
    history.versions.retain(|vi| !versions.contains(&vi.version));
    Ok(())
}

/// Downloads and decodes the version file at `path`, validating it against
/// `expected_collection_id`/`expected_version`. A missing blob at a path
/// recorded in a live row is a data-loss condition, not a retryable miss.
pub async fn fetch(
    storage: &BlobStore,
    path: &str,
    expected_collection_id: &str,
    expected_version: i64,
) -> Result<VersionFile, CatalogError> {
    let bytes = storage.get(path).await.map_err(|err| match err {
        StorageError::NotFound { path } => {
            tracing::error!(path = %path, "version file blob missing for a path recorded on a live row");
            CatalogError::Internal(format!("version file blob missing: {path}"))
        }
        other => CatalogError::Internal(format!("failed to fetch version file: {other}")),
    })?;
    let file = VersionFile::decode(bytes.as_slice())
        .map_err(|err| CatalogError::Internal(format!("failed to decode version file: {err}")))?;
    validate(&file, expected_collection_id, expected_version)?;
    Ok(file)
}

/// Encodes and uploads `file` to a fresh path derived from `op` and
/// `new_version`. Each call writes to a distinct UUID-suffixed name, so a
/// retry after a CAS loss simply leaves a harmless orphan blob.
pub async fn upload(
    storage: &BlobStore,
    file: &VersionFile,
    new_version: i64,
    op: Option<VersionFileOp>,
) -> Result<String, CatalogError> {
    let path = generate_file_path(&file.tenant, &file.database, &file.collection, new_version, op);
    let bytes = file.encode_to_vec();
    storage
        .put_bytes(&path, bytes, PutOptions::default())
        .await
        .map_err(|err| CatalogError::Internal(format!("failed to upload version file: {err}")))?;
    Ok(path)
}

/// Counts versions not flagged `marked_for_deletion`.
pub fn active_version_count(file: &VersionFile) -> i64 {
    file.version_history
        .as_ref()
        .map(|h| h.versions.iter().filter(|vi| !vi.marked_for_deletion).count() as i64)
        .unwrap_or(0)
}

/// The earliest `created_at_secs` among non-deleted-marked versions, or
/// `None` if every version is marked for deletion (or the history is empty).
pub fn oldest_active_version_ts(file: &VersionFile) -> Option<i64> {
    file.version_history.as_ref().and_then(|h| {
        h.versions
            .iter()
            .filter(|vi| !vi.marked_for_deletion)
            .map(|vi| vi.created_at_secs)
            .min()
    })
}

fn segment_info_map(segments: &[Segment]) -> HashMap<String, ProtoSegmentInfo> {
    segments
        .iter()
        .map(|segment| {
            let paths = segment
                .file_paths
                .iter()
                .map(|(role, paths)| (role.clone(), FilePaths { paths: paths.clone() }))
                .collect();
            (segment.id.to_string(), ProtoSegmentInfo { file_paths: paths })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_types::{CollectionUuid, DatabaseUuid, SegmentFlushInfo, SegmentScope};
    use std::sync::Arc;

    fn sample_collection() -> Collection {
        Collection::new("c", "t1", DatabaseUuid::new(), 1000)
    }

    fn sample_segment(collection: CollectionUuid) -> Segment {
        let mut segment = Segment::new(collection, "vector", SegmentScope::Vector);
        segment
            .file_paths
            .insert("hnsw_index".to_string(), vec!["path/1".to_string()]);
        segment
    }

    #[test]
    fn build_initial_has_version_zero_and_full_segment_info() {
        let collection = sample_collection();
        let segment = sample_segment(collection.id);
        let file = build_initial(&collection, &[segment.clone()], 1000);

        assert_eq!(file.collection, collection.id.to_string());
        let history = file.version_history.unwrap();
        assert_eq!(history.versions.len(), 1);
        assert_eq!(history.versions[0].version, 0);
        assert!(history.versions[0]
            .segment_info
            .contains_key(&segment.id.to_string()));
    }

    #[test]
    fn append_version_with_segment_flush_info_replaces_segment_info() {
        let collection = sample_collection();
        let segment = sample_segment(collection.id);
        let initial = build_initial(&collection, &[segment.clone()], 1000);

        let flush_req = CollectionFlushInfo {
            tenant_id: collection.tenant_id.clone(),
            collection_id: collection.id,
            log_position: 500,
            expected_version: 0,
            segment_flush_info: Arc::from(vec![SegmentFlushInfo {
                segment_id: segment.id,
                file_paths: std::collections::HashMap::from([(
                    "hnsw_index".to_string(),
                    vec!["path/2".to_string()],
                )]),
            }]),
            total_records_post_compaction: 10,
            size_bytes_post_compaction: 100,
        };

        let next = append_version(&initial, &flush_req, &[segment], 2000).unwrap();
        let history = next.version_history.unwrap();
        assert_eq!(history.versions.len(), 2);
        assert_eq!(history.versions[1].version, 1);
    }

    #[test]
    fn append_version_with_no_flush_info_inherits_current_segments() {
        let collection = sample_collection();
        let segment = sample_segment(collection.id);
        let initial = build_initial(&collection, &[segment.clone()], 1000);

        let flush_req = CollectionFlushInfo {
            tenant_id: collection.tenant_id.clone(),
            collection_id: collection.id,
            log_position: 500,
            expected_version: 0,
            segment_flush_info: Arc::from(vec![]),
            total_records_post_compaction: 10,
            size_bytes_post_compaction: 100,
        };

        let next = append_version(&initial, &flush_req, &[segment.clone()], 2000).unwrap();
        let history = next.version_history.unwrap();
        assert!(history.versions[1]
            .segment_info
            .contains_key(&segment.id.to_string()));
    }

    #[test]
    fn validate_rejects_collection_id_mismatch() {
        let collection = sample_collection();
        let segment = sample_segment(collection.id);
        let file = build_initial(&collection, &[segment], 1000);
        assert!(validate(&file, "not-the-right-id", 0).is_err());
    }

    #[test]
    fn validate_rejects_wrong_expected_version() {
        let collection = sample_collection();
        let segment = sample_segment(collection.id);
        let file = build_initial(&collection, &[segment], 1000);
        assert!(validate(&file, &collection.id.to_string(), 5).is_err());
    }

    #[test]
    fn mark_for_deletion_flags_requested_versions() {
        let collection = sample_collection();
        let segment = sample_segment(collection.id);
        let mut file = build_initial(&collection, &[segment], 1000);
        mark_for_deletion(&mut file, &[0]).unwrap();
        assert!(file.version_history.unwrap().versions[0].marked_for_deletion);
    }

    #[test]
    fn mark_for_deletion_fails_on_missing_version() {
        let collection = sample_collection();
        let segment = sample_segment(collection.id);
        let mut file = build_initial(&collection, &[segment], 1000);
        assert!(mark_for_deletion(&mut file, &[99]).is_err());
    }

    #[test]
    fn remove_versions_drops_exactly_the_requested_entries() {
        let collection = sample_collection();
        let segment = sample_segment(collection.id);
        let mut file = build_initial(&collection, &[segment.clone()], 1000);
        // Fabricate a couple more versions directly for the removal test.
        let history = file.version_history.as_mut().unwrap();
        history.versions.push(VersionInfo {
            version: 1,
            created_at_secs: 1100,
            segment_info: segment_info_map(&[segment.clone()]),
            mutable_info: None,
            change_reason: "flush".to_string(),
            marked_for_deletion: false,
        });
        history.versions.push(VersionInfo {
            version: 2,
            created_at_secs: 1200,
            segment_info: segment_info_map(&[segment]),
            mutable_info: None,
            change_reason: "flush".to_string(),
            marked_for_deletion: false,
        });

        remove_versions(&mut file, &[1]).unwrap();
        let remaining: Vec<i64> = file
            .version_history
            .unwrap()
            .versions
            .iter()
            .map(|vi| vi.version)
            .collect();
        assert_eq!(remaining, vec![0, 2]);
    }

    #[test]
    fn generate_file_path_for_version_zero_is_bare_name() {
        let path = generate_file_path("t", "d", "c", 0, None);
        assert!(path.ends_with("/versionfiles/0"));
    }

    #[test]
    fn generate_file_path_for_compaction_has_flush_suffix() {
        let path = generate_file_path("t", "d", "c", 3, Some(VersionFileOp::Compaction));
        assert!(path.contains("000003_"));
        assert!(path.ends_with("_flush"));
    }
}
