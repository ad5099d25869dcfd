//! Processed-payment ledger under `transactions/`
//!
//! A provider reference is claimed before any balance moves. A second
//! delivery of the same reference finds the entry and is ignored, unless
//! the claim is still `processing` after its lease ran out (the process
//! died mid-credit), in which case the retry takes it over.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use tracing::warn;

use super::database::{Database, StoreError};

const TRANSACTIONS: &str = "transactions";

/// How long a `processing` claim blocks retries
pub const CLAIM_LEASE_MILLIS: u64 = 10 * 60 * 1000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub provider: String,
    pub reference: String,
    pub event: String,
    pub amount: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub status: String,
    pub received_at: String,
    /// Unix millis of the claim; entries written without it count as stale
    #[serde(default)]
    pub claimed_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl LedgerEntry {
    pub const PROCESSING: &'static str = "processing";
    pub const APPLIED: &'static str = "applied";
}

#[derive(Clone)]
pub struct Ledger {
    db: Arc<dyn Database>,
}

impl Ledger {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    /// Ledger key for a provider reference. References may hold characters
    /// keys cannot, so the reference is hashed; the raw value stays in the entry.
    pub fn key(provider: &str, reference: &str) -> String {
        let digest = Sha256::digest(reference.as_bytes());
        format!("{}_{}", provider, hex::encode(digest))
    }

    fn entry_path(key: &str) -> String {
        format!("{}/{}", TRANSACTIONS, key)
    }

    /// Create the entry if the reference was never seen, or take over a
    /// `processing` claim whose lease expired. Returns false for a duplicate.
    pub async fn claim(&self, key: &str, entry: &LedgerEntry) -> Result<bool, StoreError> {
        let value = serde_json::to_value(entry)?;
        let now = entry.claimed_at;
        let took_over = AtomicBool::new(false);
        let outcome = self
            .db
            .transaction(&Self::entry_path(key), &|current| match current {
                None => Some(value.clone()),
                Some(existing) if is_stale(existing, now) => {
                    took_over.store(true, Ordering::Relaxed);
                    Some(value.clone())
                }
                Some(_) => None,
            })
            .await?;

        if outcome.committed && took_over.load(Ordering::Relaxed) {
            warn!(ledger_key = %key, "Took over an expired processing claim");
        }
        Ok(outcome.committed)
    }

    /// Mark the entry applied and attach the outcome details
    pub async fn mark_applied(
        &self,
        key: &str,
        user_id: &str,
        details: Map<String, Value>,
    ) -> Result<(), StoreError> {
        let mut fields = details;
        fields.insert("status".to_string(), Value::from(LedgerEntry::APPLIED));
        fields.insert("userId".to_string(), Value::from(user_id));
        self.db.update(&Self::entry_path(key), &fields).await
    }

    /// Forget a claim so the provider's retry can be applied
    pub async fn release(&self, key: &str) -> Result<(), StoreError> {
        self.db.remove(&Self::entry_path(key)).await
    }

    #[cfg(test)]
    pub async fn get(&self, key: &str) -> Result<Option<LedgerEntry>, StoreError> {
        match self.db.get(&Self::entry_path(key)).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }
}

fn is_stale(existing: &Value, now: u64) -> bool {
    let Ok(entry) = serde_json::from_value::<LedgerEntry>(existing.clone()) else {
        return false;
    };
    entry.status == LedgerEntry::PROCESSING
        && entry.claimed_at.saturating_add(CLAIM_LEASE_MILLIS) <= now
}
