//! In-memory store that can be slowed down or made to fail, for tests

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};

use super::database::{Database, StoreError, TransactionFn, TransactionOutcome};
use super::memory::MemoryDatabase;

pub struct FaultyDatabase {
    inner: MemoryDatabase,
    query_delay: Mutex<Duration>,
    failing_prefix: Mutex<Option<String>>,
}

impl FaultyDatabase {
    pub fn with_root(root: Value) -> Self {
        Self {
            inner: MemoryDatabase::with_root(root),
            query_delay: Mutex::new(Duration::ZERO),
            failing_prefix: Mutex::new(None),
        }
    }

    /// Delay every `query_equal`
    pub fn delay_queries(&self, delay: Duration) {
        *self.query_delay.lock() = delay;
    }

    /// Fail every write whose path starts with `prefix`
    pub fn fail_writes_under(&self, prefix: &str) {
        *self.failing_prefix.lock() = Some(prefix.to_string());
    }

    pub fn heal(&self) {
        *self.query_delay.lock() = Duration::ZERO;
        *self.failing_prefix.lock() = None;
    }

    fn check_write(&self, path: &str) -> Result<(), StoreError> {
        match self.failing_prefix.lock().as_deref() {
            Some(prefix) if path.starts_with(prefix) => Err(StoreError::Api {
                status: 503,
                body: "store unavailable".to_string(),
            }),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl Database for FaultyDatabase {
    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError> {
        self.inner.get(path).await
    }

    async fn set(&self, path: &str, value: &Value) -> Result<(), StoreError> {
        self.check_write(path)?;
        self.inner.set(path, value).await
    }

    async fn update(&self, path: &str, fields: &Map<String, Value>) -> Result<(), StoreError> {
        self.check_write(path)?;
        self.inner.update(path, fields).await
    }

    async fn push(&self, path: &str, value: &Value) -> Result<String, StoreError> {
        self.check_write(path)?;
        self.inner.push(path, value).await
    }

    async fn remove(&self, path: &str) -> Result<(), StoreError> {
        self.check_write(path)?;
        self.inner.remove(path).await
    }

    async fn query_equal(
        &self,
        path: &str,
        child: &str,
        value: &Value,
    ) -> Result<Map<String, Value>, StoreError> {
        let delay = *self.query_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.inner.query_equal(path, child, value).await
    }

    async fn transaction(
        &self,
        path: &str,
        apply: &TransactionFn<'_>,
    ) -> Result<TransactionOutcome, StoreError> {
        self.check_write(path)?;
        self.inner.transaction(path, apply).await
    }

    fn backend(&self) -> &'static str {
        "faulty-memory"
    }
}
