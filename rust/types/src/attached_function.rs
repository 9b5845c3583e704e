use crate::common::{AttachedFunctionUuid, CollectionUuid, FunctionUuid};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The least possible UUIDv7 value: all time/random bits zero, version and
/// variant bits set correctly. Used as the initial `lowest_live_nonce` so
/// every real run nonce generated afterwards (a fresh `Uuid::now_v7()`)
/// sorts strictly greater than it.
pub fn minimal_uuid_v7() -> Uuid {
    // UUIDv7 layout: 48-bit time, 4-bit version (7), 12-bit rand_a,
    // 2-bit variant (10), 62-bit rand_b. Zeroing everything but the
    // version/variant bits gives the smallest legal v7 value.
    let mut bytes = [0u8; 16];
    bytes[6] = 0x70; // version nibble
    bytes[8] = 0x80; // variant bits
    Uuid::from_bytes(bytes)
}

/// An attachment of a function (e.g. a compaction/embedding job) to an
/// input collection. `lowest_live_nonce = None` marks a **partial**
/// attachment: DB insertion finished but the external heap scheduler has
/// not yet accepted it (two-phase attach, see the coordinator protocol).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AttachedFunction {
    pub id: AttachedFunctionUuid,
    pub name: String,
    pub input_collection_id: CollectionUuid,
    pub output_collection_name: String,
    pub function_id: FunctionUuid,
    pub tenant_id: String,
    pub database_id: String,
    pub params_json: Option<String>,
    pub min_records_for_invocation: u64,
    pub completion_offset: u64,
    pub next_nonce: Uuid,
    pub lowest_live_nonce: Option<Uuid>,
    pub next_run_secs: i64,
    pub created_at_secs: i64,
    pub updated_at_secs: i64,
    pub is_deleted: bool,
}

impl AttachedFunction {
    pub fn is_partial(&self) -> bool {
        self.lowest_live_nonce.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AttachedFunction {
        AttachedFunction {
            id: AttachedFunctionUuid::new(),
            name: "compact".to_string(),
            input_collection_id: CollectionUuid::new(),
            output_collection_name: "compact-out".to_string(),
            function_id: FunctionUuid::new(),
            tenant_id: "t1".to_string(),
            database_id: "d1".to_string(),
            params_json: None,
            min_records_for_invocation: 100,
            completion_offset: 0,
            next_nonce: Uuid::now_v7(),
            lowest_live_nonce: None,
            next_run_secs: 0,
            created_at_secs: 0,
            updated_at_secs: 0,
            is_deleted: false,
        }
    }

    #[test]
    fn attachment_with_no_lowest_live_nonce_is_partial() {
        assert!(sample().is_partial());
    }

    #[test]
    fn attachment_with_a_lowest_live_nonce_is_not_partial() {
        let mut f = sample();
        f.lowest_live_nonce = Some(Uuid::now_v7());
        assert!(!f.is_partial());
    }

    #[test]
    fn minimal_uuid_v7_sorts_below_any_real_v7_nonce() {
        let minimal = minimal_uuid_v7();
        assert_eq!(minimal.get_version_num(), 7);
        for _ in 0..16 {
            let real = Uuid::now_v7();
            assert!(minimal < real);
        }
    }
}
