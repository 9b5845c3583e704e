//! Ordered string-keyed metadata shared by collections and segments.
//!
//! Backed by a `Vec` rather than a `HashMap` because the data model requires
//! insertion order to survive a read/write round-trip; a hash map would
//! silently violate that on every call.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata(Vec<(String, MetadataValue)>);

impl Metadata {
    pub fn new() -> Self {
        Metadata(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&MetadataValue> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Inserts `key`, preserving its original position if already present
    /// (replace-in-place) or appending it at the end if new.
    pub fn insert(&mut self, key: String, value: MetadataValue) {
        if let Some(entry) = self.0.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = value;
        } else {
            self.0.push((key, value));
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<MetadataValue> {
        let idx = self.0.iter().position(|(k, _)| k == key)?;
        Some(self.0.remove(idx).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, MetadataValue)> {
        self.0.iter()
    }

    /// Applies an `UpdateMetadata` payload: `None` entries delete the key,
    /// `Some` entries upsert it, in the order given.
    pub fn apply_update(&mut self, update: &[(String, Option<MetadataValue>)]) {
        for (key, value) in update {
            match value {
                Some(v) => self.insert(key.clone(), v.clone()),
                None => {
                    self.remove(key);
                }
            }
        }
    }
}

impl FromIterator<(String, MetadataValue)> for Metadata {
    fn from_iter<T: IntoIterator<Item = (String, MetadataValue)>>(iter: T) -> Self {
        let mut m = Metadata::new();
        for (k, v) in iter {
            m.insert(k, v);
        }
        m
    }
}

pub fn distinct_keys(update: &[(String, Option<MetadataValue>)]) -> HashSet<&str> {
    update.iter().map(|(k, _)| k.as_str()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insertion_order_is_preserved_on_round_trip() {
        let mut metadata = Metadata::new();
        metadata.insert("z".to_string(), MetadataValue::Int(1));
        metadata.insert("a".to_string(), MetadataValue::String("x".to_string()));
        metadata.insert("m".to_string(), MetadataValue::Bool(true));

        let keys: Vec<&str> = metadata.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["z", "a", "m"]);

        let json = serde_json::to_string(&metadata).unwrap();
        let round_tripped: Metadata = serde_json::from_str(&json).unwrap();
        assert_eq!(round_tripped, metadata);
    }

    #[test]
    fn replacing_a_key_keeps_its_original_position() {
        let mut metadata = Metadata::new();
        metadata.insert("a".to_string(), MetadataValue::Int(1));
        metadata.insert("b".to_string(), MetadataValue::Int(2));
        metadata.insert("a".to_string(), MetadataValue::Int(3));

        let keys: Vec<&str> = metadata.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(metadata.get("a"), Some(&MetadataValue::Int(3)));
    }

    #[test]
    fn apply_update_deletes_on_none() {
        let mut metadata = Metadata::new();
        metadata.insert("a".to_string(), MetadataValue::Int(1));
        metadata.insert("b".to_string(), MetadataValue::Int(2));

        metadata.apply_update(&[("a".to_string(), None)]);
        assert_eq!(metadata.get("a"), None);
        assert_eq!(metadata.get("b"), Some(&MetadataValue::Int(2)));
    }
}
