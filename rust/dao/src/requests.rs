use catalog_types::{CollectionUuid, FunctionUuid, Metadata, Segment};

#[derive(Debug, Clone)]
pub struct CreateCollectionRequest {
    pub tenant: String,
    pub database: String,
    pub id: Option<CollectionUuid>,
    pub name: String,
    pub segments: Vec<Segment>,
    pub metadata: Option<Metadata>,
    pub dimension: Option<i32>,
    pub configuration_json: Option<String>,
    pub get_or_create: bool,
}

#[derive(Debug, Clone)]
pub struct ForkCollectionRequest {
    pub source_collection_id: CollectionUuid,
    pub target_name: String,
    pub source_compaction_offset: i64,
    pub source_enumeration_offset: i64,
}

#[derive(Debug, Clone)]
pub struct AttachFunctionRequest {
    pub input_collection_id: CollectionUuid,
    pub name: String,
    pub output_collection_name: String,
    pub function_id: FunctionUuid,
    pub tenant_id: String,
    pub database_id: String,
    pub params_json: Option<String>,
    pub min_records_for_invocation: u64,
}

#[derive(Debug, Clone, Default)]
pub struct ListCollectionsToGcRequest {
    pub cutoff_secs: i64,
    pub limit: Option<u32>,
    pub tenant: Option<String>,
    pub min_versions_if_alive: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollectionToGcInfo {
    pub id: CollectionUuid,
    pub name: String,
    pub version_file_path: String,
}
