//! In-process store with Realtime Database semantics

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};

use super::database::{
    children_equal, path_segments, Database, StoreError, TransactionFn, TransactionOutcome,
};
use crate::util::{ids::push_key, time::unix_millis};

/// JSON tree behind a mutex; every operation is atomic
#[derive(Default)]
pub struct MemoryDatabase {
    root: Mutex<Value>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self {
            root: Mutex::new(Value::Null),
        }
    }

    /// Start from an existing tree
    pub fn with_root(root: Value) -> Self {
        Self {
            root: Mutex::new(root),
        }
    }
}

fn read<'a>(root: &'a Value, segments: &[&str]) -> Option<&'a Value> {
    let mut node = root;
    for segment in segments {
        node = node.as_object()?.get(*segment)?;
    }
    (!node.is_null()).then_some(node)
}

fn write(root: &mut Value, segments: &[&str], value: Value) {
    let Some((last, parents)) = segments.split_last() else {
        *root = value;
        return;
    };

    let mut node = &mut *root;
    for segment in parents {
        if !node.is_object() {
            if value.is_null() {
                return;
            }
            *node = Value::Object(Map::new());
        }
        node = match node {
            Value::Object(map) => map
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new())),
            _ => return,
        };
    }

    if !node.is_object() {
        if value.is_null() {
            return;
        }
        *node = Value::Object(Map::new());
    }
    if let Value::Object(map) = node {
        if value.is_null() {
            map.remove(*last);
        } else {
            map.insert(last.to_string(), value);
        }
    }
    prune(root);
}

/// Drop empty objects and nulls, as the real database never stores them
fn prune(node: &mut Value) {
    if let Value::Object(map) = node {
        for child in map.values_mut() {
            prune(child);
        }
        map.retain(|_, child| !child.is_null() && !matches!(child, Value::Object(m) if m.is_empty()));
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError> {
        let segments = path_segments(path)?;
        let root = self.root.lock();
        Ok(read(&root, &segments).cloned())
    }

    async fn set(&self, path: &str, value: &Value) -> Result<(), StoreError> {
        let segments = path_segments(path)?;
        let mut root = self.root.lock();
        write(&mut root, &segments, value.clone());
        Ok(())
    }

    async fn update(&self, path: &str, fields: &Map<String, Value>) -> Result<(), StoreError> {
        let base = path_segments(path)?;
        // Validate everything before touching the tree so the update stays atomic
        let mut writes = Vec::with_capacity(fields.len());
        for (relative, value) in fields {
            let mut segments = base.clone();
            segments.extend(path_segments(relative)?);
            writes.push((segments, value.clone()));
        }

        let mut root = self.root.lock();
        for (segments, value) in writes {
            write(&mut root, &segments, value);
        }
        Ok(())
    }

    async fn push(&self, path: &str, value: &Value) -> Result<String, StoreError> {
        let mut segments = path_segments(path)?;
        let key = push_key(unix_millis());
        segments.push(&key);
        let mut root = self.root.lock();
        write(&mut root, &segments, value.clone());
        Ok(key)
    }

    async fn remove(&self, path: &str) -> Result<(), StoreError> {
        self.set(path, &Value::Null).await
    }

    async fn query_equal(
        &self,
        path: &str,
        child: &str,
        value: &Value,
    ) -> Result<Map<String, Value>, StoreError> {
        let segments = path_segments(path)?;
        let root = self.root.lock();
        Ok(children_equal(read(&root, &segments), child, value))
    }

    async fn transaction(
        &self,
        path: &str,
        apply: &TransactionFn<'_>,
    ) -> Result<TransactionOutcome, StoreError> {
        let segments = path_segments(path)?;
        let mut root = self.root.lock();
        let current = read(&root, &segments).cloned();

        match apply(current.as_ref()) {
            Some(next) => {
                write(&mut root, &segments, next);
                Ok(TransactionOutcome {
                    committed: true,
                    value: read(&root, &segments).cloned(),
                })
            }
            None => Ok(TransactionOutcome {
                committed: false,
                value: current,
            }),
        }
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
