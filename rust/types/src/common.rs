use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

macro_rules! uuid_id {
    ($name:ident) => {
        #[derive(
            Copy, Clone, Debug, Default, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize,
        )]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                $name(Uuid::new_v4())
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map($name)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(CollectionUuid);
uuid_id!(DatabaseUuid);
uuid_id!(SegmentUuid);
uuid_id!(AttachedFunctionUuid);
uuid_id!(FunctionUuid);

/// File role prefixes used when laying out blob paths for a segment. GC's
/// rename-before-delete convention and its orphan delete-list both live
/// under reserved prefixes so a list of a collection's own segment files
/// never collides with them.
#[derive(Debug, Clone, Copy)]
pub enum FilePrefix {
    Renamed,
    DeleteList,
}

impl std::fmt::Display for FilePrefix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from(*self))
    }
}

impl From<FilePrefix> for String {
    fn from(value: FilePrefix) -> Self {
        match value {
            FilePrefix::Renamed => "gc/renamed/".to_string(),
            FilePrefix::DeleteList => "gc/delete-list/".to_string(),
        }
    }
}

/// Renames a soft-deleted collection's `name` out of the way so the
/// original name is immediately reusable (I3).
pub fn soft_deleted_name(original_name: &str, id: CollectionUuid) -> String {
    format!("_deleted_{original_name}_{id}")
}
