use crate::common::{CollectionUuid, SegmentUuid};
use crate::metadata::Metadata;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Segments are data-agnostic containers; the catalog never interprets
/// their contents, only their scope (what kind of data a segment holds)
/// and file path bookkeeping.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SegmentScope {
    Vector,
    Record,
    Metadata,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub id: SegmentUuid,
    pub r#type: String,
    pub scope: SegmentScope,
    pub collection: CollectionUuid,
    pub metadata: Option<Metadata>,
    /// role -> ordered sequence of blob paths
    pub file_paths: HashMap<String, Vec<String>>,
}

impl Segment {
    pub fn new(collection: CollectionUuid, r#type: impl Into<String>, scope: SegmentScope) -> Self {
        Segment {
            id: SegmentUuid::new(),
            r#type: r#type.into(),
            scope,
            collection,
            metadata: None,
            file_paths: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_segment_has_no_file_paths() {
        let segment = Segment::new(CollectionUuid::new(), "urn:catalog:segment/record", SegmentScope::Record);
        assert!(segment.file_paths.is_empty());
        assert_eq!(segment.scope, SegmentScope::Record);
    }
}
