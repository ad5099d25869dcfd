//! Hierarchical key-value store abstraction (Firebase Realtime Database model)

use async_trait::async_trait;
use serde_json::{Map, Value};

/// Transaction callback: receives the current node value, returns the new
/// value or `None` to abort. May run more than once under contention.
pub type TransactionFn<'a> = dyn Fn(Option<&Value>) -> Option<Value> + Send + Sync + 'a;

/// Result of a read-modify-write
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionOutcome {
    /// Whether the new value was written
    pub committed: bool,
    /// Value stored after the transaction (the untouched value on abort)
    pub value: Option<Value>,
}

/// Store operations used by the API
#[async_trait]
pub trait Database: Send + Sync {
    /// Read the node at `path`
    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError>;

    /// Replace the node at `path`; `null` deletes it
    async fn set(&self, path: &str, value: &Value) -> Result<(), StoreError>;

    /// Multi-location update; each key is a path relative to `path`
    async fn update(&self, path: &str, fields: &Map<String, Value>) -> Result<(), StoreError>;

    /// Append `value` under a generated child key and return the key
    async fn push(&self, path: &str, value: &Value) -> Result<String, StoreError>;

    /// Delete the node at `path`
    async fn remove(&self, path: &str) -> Result<(), StoreError>;

    /// Children of `path` whose `child` field equals `value`, in key order
    async fn query_equal(
        &self,
        path: &str,
        child: &str,
        value: &Value,
    ) -> Result<Map<String, Value>, StoreError>;

    /// Atomic read-modify-write of a single node
    async fn transaction(
        &self,
        path: &str,
        apply: &TransactionFn<'_>,
    ) -> Result<TransactionOutcome, StoreError>;

    /// Short backend name for health output
    fn backend(&self) -> &'static str;
}

/// Split and validate a store path. An empty path addresses the root.
pub fn path_segments(path: &str) -> Result<Vec<&str>, StoreError> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    trimmed
        .split('/')
        .map(|segment| {
            if is_valid_key(segment) {
                Ok(segment)
            } else {
                Err(StoreError::InvalidPath(path.to_string()))
            }
        })
        .collect()
}

/// Whether `key` can be used as a single path segment
pub fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && key.len() <= 768
        && !key
            .chars()
            .any(|c| matches!(c, '.' | '$' | '#' | '[' | ']' | '/') || c.is_control())
}

/// Children of `node` whose `child` field equals `value`, in key order
pub fn children_equal(node: Option<&Value>, child: &str, value: &Value) -> Map<String, Value> {
    let Some(Value::Object(children)) = node else {
        return Map::new();
    };
    children
        .iter()
        .filter(|(_, entry)| entry.get(child) == Some(value))
        .map(|(key, entry)| (key.clone(), entry.clone()))
        .collect()
}

/// Store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("Failed to parse stored value: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid store path: {0}")]
    InvalidPath(String),

    #[error("Transaction on {0} gave up after repeated conflicts")]
    Contention(String),
}
