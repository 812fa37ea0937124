use std::fmt;

use serde_json::{Map, Value};
use thiserror::Error;

/// Separates the dataset id from its serialized parameters.
const PARAMS_SEPARATOR: char = ':';

#[derive(Error, Debug, PartialEq, Eq)]
pub enum KeyError {
    #[error("Dataset id must not be empty")]
    EmptyDatasetId,

    #[error("Dataset id {0:?} must not contain ':'")]
    InvalidDatasetId(String),
}

/// Identifies one cacheable dataset request.
///
/// Built from the dataset id plus the canonical JSON form of its request
/// parameters (object keys sorted at every depth), so equal requests always
/// map to the same key and any differing parameter yields a different one.
/// `null` and `{}` parameters both normalize to "no parameters".
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn for_dataset(dataset_id: &str, params: Option<&Value>) -> Result<Self, KeyError> {
        if dataset_id.is_empty() {
            return Err(KeyError::EmptyDatasetId);
        }
        if dataset_id.contains(PARAMS_SEPARATOR) {
            return Err(KeyError::InvalidDatasetId(dataset_id.to_string()));
        }

        let key = match params {
            None | Some(Value::Null) => dataset_id.to_string(),
            Some(Value::Object(map)) if map.is_empty() => dataset_id.to_string(),
            Some(params) => format!(
                "{}{}{}",
                dataset_id,
                PARAMS_SEPARATOR,
                canonicalize(params)
            ),
        };
        Ok(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Rebuild objects with keys inserted in sorted order, independent of how
/// serde_json's map is configured to order them.
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let mut sorted = Map::new();
            for (k, v) in entries {
                sorted.insert(k.clone(), canonicalize(v));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}
