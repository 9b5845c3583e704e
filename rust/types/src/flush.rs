use crate::common::{AttachedFunctionUuid, CollectionUuid, SegmentUuid};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct SegmentFlushInfo {
    pub segment_id: SegmentUuid,
    pub file_paths: HashMap<String, Vec<String>>,
}

/// Input to the compaction flush protocol (4.4): the caller's proposed
/// next state for one collection, keyed against the version it observed.
#[derive(Debug, Clone)]
pub struct CollectionFlushInfo {
    pub tenant_id: String,
    pub collection_id: CollectionUuid,
    pub log_position: i64,
    pub expected_version: i64,
    pub segment_flush_info: Arc<[SegmentFlushInfo]>,
    pub total_records_post_compaction: u64,
    pub size_bytes_post_compaction: u64,
}

#[derive(Debug, Clone)]
pub struct AttachedFunctionUpdateInfo {
    pub attached_function_id: AttachedFunctionUuid,
    pub completion_offset: u64,
}

#[derive(Debug, Clone)]
pub struct FlushCompactionResponse {
    pub collection_id: CollectionUuid,
    pub collection_version: i64,
    pub last_compaction_time_secs: i64,
}

#[derive(Debug, Clone)]
pub struct FlushCompactionAndAttachedFunctionResponse {
    pub collections: Vec<FlushCompactionResponse>,
    pub completion_offset: u64,
}
