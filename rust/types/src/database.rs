use crate::common::DatabaseUuid;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Database {
    pub id: DatabaseUuid,
    pub name: String,
    pub tenant: String,
    pub is_deleted: bool,
}

impl Database {
    pub fn new(name: impl Into<String>, tenant: impl Into<String>) -> Self {
        Database {
            id: DatabaseUuid::new(),
            name: name.into(),
            tenant: tenant.into(),
            is_deleted: false,
        }
    }
}
