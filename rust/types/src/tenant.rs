use serde::{Deserialize, Serialize};

/// Identified by `name` (primary key); never deleted by the core.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tenant {
    pub name: String,
    pub last_compaction_time_secs: i64,
    pub resource_name: Option<String>,
}

impl Tenant {
    pub fn new(name: impl Into<String>) -> Self {
        Tenant {
            name: name.into(),
            last_compaction_time_secs: 0,
            resource_name: None,
        }
    }
}
