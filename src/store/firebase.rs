//! Firebase Realtime Database REST API client

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::database::{
    children_equal, path_segments, Database, StoreError, TransactionFn, TransactionOutcome,
};
use crate::config::Config;

/// Same retry budget as the official SDKs
const MAX_TRANSACTION_ATTEMPTS: usize = 25;

/// Firebase client for server-side database operations.
/// The auth token bypasses security rules - handle with care!
#[derive(Clone)]
pub struct FirebaseClient {
    client: Client,
    base_url: String,
    auth_token: Option<String>,
}

impl FirebaseClient {
    pub fn new(config: &Config) -> Self {
        Self {
            client: Client::new(),
            base_url: config.firebase_database_url.clone(),
            auth_token: config.firebase_auth_token.clone(),
        }
    }

    /// Get the REST URL for a node
    fn node_url(&self, path: &str) -> Result<String, StoreError> {
        let segments = path_segments(path)?;
        Ok(format!("{}/{}.json", self.base_url, segments.join("/")))
    }

    /// Attach the auth query parameter when configured
    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth_token {
            Some(token) => request.query(&[("auth", token.as_str())]),
            None => request,
        }
    }

    async fn check(response: Response) -> Result<Response, StoreError> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Api { status: status.as_u16(), body });
        }
        Ok(response)
    }

    /// Read a node together with its ETag
    async fn get_with_etag(&self, url: &str) -> Result<(String, Option<Value>), StoreError> {
        let response = self
            .authed(self.client.get(url))
            .header("X-Firebase-ETag", "true")
            .send()
            .await?;
        let response = Self::check(response).await?;

        let etag = response
            .headers()
            .get("ETag")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| StoreError::Api {
                status: 200,
                body: "missing ETag header".to_string(),
            })?;

        let value: Value = response.json().await?;
        Ok((etag, (!value.is_null()).then_some(value)))
    }
}

/// Queries on an unindexed child are refused with 400 "Index not defined"
fn is_missing_index(status: u16, body: &str) -> bool {
    status == StatusCode::BAD_REQUEST.as_u16() && body.contains("Index not defined")
}

#[derive(Deserialize)]
struct PushResponse {
    name: String,
}

#[async_trait]
impl Database for FirebaseClient {
    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError> {
        let url = self.node_url(path)?;
        let response = self.authed(self.client.get(&url)).send().await?;
        let value: Value = Self::check(response).await?.json().await?;
        Ok((!value.is_null()).then_some(value))
    }

    async fn set(&self, path: &str, value: &Value) -> Result<(), StoreError> {
        let url = self.node_url(path)?;
        let response = self
            .authed(self.client.put(&url))
            .query(&[("print", "silent")])
            .json(value)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn update(&self, path: &str, fields: &Map<String, Value>) -> Result<(), StoreError> {
        let url = self.node_url(path)?;
        for key in fields.keys() {
            path_segments(key)?;
        }

        let response = self
            .authed(self.client.patch(&url))
            .query(&[("print", "silent")])
            .json(fields)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn push(&self, path: &str, value: &Value) -> Result<String, StoreError> {
        let url = self.node_url(path)?;
        let response = self.authed(self.client.post(&url)).json(value).send().await?;
        let pushed: PushResponse = Self::check(response).await?.json().await?;
        Ok(pushed.name)
    }

    async fn remove(&self, path: &str) -> Result<(), StoreError> {
        let url = self.node_url(path)?;
        let response = self.authed(self.client.delete(&url)).send().await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn query_equal(
        &self,
        path: &str,
        child: &str,
        value: &Value,
    ) -> Result<Map<String, Value>, StoreError> {
        let url = self.node_url(path)?;
        // orderBy/equalTo take JSON-encoded values
        let order_by = serde_json::to_string(child)?;
        let equal_to = serde_json::to_string(value)?;

        let response = self
            .authed(self.client.get(&url))
            .query(&[("orderBy", order_by.as_str()), ("equalTo", equal_to.as_str())])
            .send()
            .await?;
        match Self::check(response).await {
            Ok(response) => match response.json::<Value>().await? {
                Value::Object(map) => Ok(map),
                _ => Ok(Map::new()),
            },
            Err(StoreError::Api { status, body }) if is_missing_index(status, &body) => {
                warn!(
                    path = %path,
                    child = %child,
                    "No .indexOn rule for query, filtering the full node instead"
                );
                let node = self.get(path).await?;
                Ok(children_equal(node.as_ref(), child, value))
            }
            Err(e) => Err(e),
        }
    }

    async fn transaction(
        &self,
        path: &str,
        apply: &TransactionFn<'_>,
    ) -> Result<TransactionOutcome, StoreError> {
        let url = self.node_url(path)?;

        for attempt in 1..=MAX_TRANSACTION_ATTEMPTS {
            let (etag, current) = self.get_with_etag(&url).await?;

            let Some(next) = apply(current.as_ref()) else {
                return Ok(TransactionOutcome {
                    committed: false,
                    value: current,
                });
            };

            let response = self
                .authed(self.client.put(&url))
                .header("if-match", etag)
                .json(&next)
                .send()
                .await?;

            if response.status() == StatusCode::PRECONDITION_FAILED {
                debug!(path = %path, attempt, "Transaction conflict, retrying");
                continue;
            }

            let stored: Value = Self::check(response).await?.json().await?;
            return Ok(TransactionOutcome {
                committed: true,
                value: (!stored.is_null()).then_some(stored),
            });
        }

        warn!(path = %path, "Transaction exhausted retries");
        Err(StoreError::Contention(path.to_string()))
    }

    fn backend(&self) -> &'static str {
        "firebase"
    }
}
