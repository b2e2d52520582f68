//! Remote progress store
//!
//! One document per user: `{ "user_id": ..., "data": <ProgressRecord>, "updated_at": ... }`.
//! The store enforces no schema; `data` is whatever the last writer sent.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

use crate::error::{ProgressError, Result};

/// Document-shaped storage keyed by user id
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetch the stored record, `None` when the user has no row
    async fn get(&self, user_id: &str) -> Result<Option<Value>>;

    /// Replace the stored record, creating the row if needed
    async fn upsert(&self, user_id: &str, record: &Value) -> Result<()>;

    /// Create the row; fails if it already exists
    async fn insert(&self, user_id: &str, record: &Value) -> Result<()>;
}

/// Wire form of a stored row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressRow {
    pub user_id: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            api_key: None,
            request_timeout_secs: 30,
        }
    }
}

/// HTTP client for the progress document API
///
/// `GET`, `PUT` and `POST` on `{base_url}/progress/{user_id}`.
pub struct HttpRemoteStore {
    config: RemoteConfig,
    client: Client,
}

impl HttpRemoteStore {
    pub fn new(config: RemoteConfig) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        if let Some(ref api_key) = config.api_key {
            let value = header::HeaderValue::from_str(&format!("Bearer {}", api_key))
                .map_err(|e| ProgressError::Config(format!("Invalid API key: {}", e)))?;
            headers.insert(header::AUTHORIZATION, value);
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ProgressError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    fn url(&self, user_id: &str) -> String {
        format!(
            "{}/progress/{}",
            self.config.base_url.trim_end_matches('/'),
            urlencoding::encode(user_id)
        )
    }

    fn row(user_id: &str, record: &Value) -> ProgressRow {
        ProgressRow {
            user_id: user_id.to_string(),
            data: record.clone(),
            updated_at: Some(Utc::now()),
        }
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(ProgressError::Server { status, message });
        }
        Ok(response)
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn get(&self, user_id: &str) -> Result<Option<Value>> {
        let response = self.client.get(self.url(user_id)).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let row: ProgressRow = Self::check(response).await?.json().await?;
        debug!(user_id, "Fetched remote progress");
        // A row with no document is the same as no row
        Ok((!row.data.is_null()).then_some(row.data))
    }

    async fn upsert(&self, user_id: &str, record: &Value) -> Result<()> {
        let response = self
            .client
            .put(self.url(user_id))
            .json(&Self::row(user_id, record))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn insert(&self, user_id: &str, record: &Value) -> Result<()> {
        let response = self
            .client
            .post(self.url(user_id))
            .json(&Self::row(user_id, record))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    Upsert,
    Insert,
}

/// A write observed by [`MemoryRemoteStore`]
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteWrite {
    pub kind: WriteKind,
    pub user_id: String,
    pub record: Value,
}

/// In-process remote store with injectable failure and latency
#[derive(Debug, Default)]
pub struct MemoryRemoteStore {
    rows: Mutex<HashMap<String, Value>>,
    writes: Mutex<Vec<RemoteWrite>>,
    failing: AtomicBool,
    latency: Mutex<Option<Duration>>,
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a stored document
    pub fn with_document(self, user_id: impl Into<String>, record: Value) -> Self {
        if let Ok(mut rows) = self.rows.lock() {
            rows.insert(user_id.into(), record);
        }
        self
    }

    /// Make every call fail with a remote error
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Delay every call
    pub fn set_latency(&self, latency: Option<Duration>) {
        if let Ok(mut slot) = self.latency.lock() {
            *slot = latency;
        }
    }

    pub fn document(&self, user_id: &str) -> Option<Value> {
        self.rows.lock().ok()?.get(user_id).cloned()
    }

    /// Writes in completion order
    pub fn writes(&self) -> Vec<RemoteWrite> {
        self.writes.lock().map(|w| w.clone()).unwrap_or_default()
    }

    async fn enter(&self) -> Result<()> {
        let latency = self.latency.lock().ok().and_then(|l| *l);
        if let Some(delay) = latency {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(ProgressError::Remote("remote store unavailable".into()));
        }
        Ok(())
    }

    fn record_write(&self, kind: WriteKind, user_id: &str, record: &Value) -> Result<()> {
        let mut rows = self
            .rows
            .lock()
            .map_err(|_| ProgressError::Remote("remote rows lock poisoned".into()))?;
        if kind == WriteKind::Insert && rows.contains_key(user_id) {
            return Err(ProgressError::Server {
                status: 409,
                message: format!("row for {} already exists", user_id),
            });
        }
        rows.insert(user_id.to_string(), record.clone());
        drop(rows);

        if let Ok(mut writes) = self.writes.lock() {
            writes.push(RemoteWrite {
                kind,
                user_id: user_id.to_string(),
                record: record.clone(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn get(&self, user_id: &str) -> Result<Option<Value>> {
        self.enter().await?;
        Ok(self.document(user_id))
    }

    async fn upsert(&self, user_id: &str, record: &Value) -> Result<()> {
        self.enter().await?;
        self.record_write(WriteKind::Upsert, user_id, record)
    }

    async fn insert(&self, user_id: &str, record: &Value) -> Result<()> {
        self.enter().await?;
        self.record_write(WriteKind::Insert, user_id, record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_memory_store_upsert_and_get() {
        let store = MemoryRemoteStore::new();
        assert_eq!(store.get("u1").await.unwrap(), None);

        store.upsert("u1", &json!({ "xp": 10 })).await.unwrap();
        store.upsert("u1", &json!({ "xp": 20 })).await.unwrap();

        assert_eq!(store.get("u1").await.unwrap(), Some(json!({ "xp": 20 })));
        assert_eq!(store.writes().len(), 2);
    }

    #[tokio::test]
    async fn test_memory_store_insert_conflict() {
        let store = MemoryRemoteStore::new().with_document("u1", json!({ "xp": 0 }));
        let err = store.insert("u1", &json!({})).await.unwrap_err();
        assert!(matches!(err, ProgressError::Server { status: 409, .. }));
    }

    #[tokio::test]
    async fn test_memory_store_failing() {
        let store = MemoryRemoteStore::new();
        store.set_failing(true);
        assert!(store.get("u1").await.is_err());
        assert!(store.upsert("u1", &json!({})).await.is_err());
        assert!(store.writes().is_empty());
    }

    #[test]
    fn test_http_url_encodes_user_id() {
        let store = HttpRemoteStore::new(RemoteConfig {
            base_url: "https://example.test/api/".into(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(store.url("a b/c"), "https://example.test/api/progress/a%20b%2Fc");
    }

    #[test]
    fn test_row_without_data_deserializes() {
        let row: ProgressRow = serde_json::from_str(r#"{"user_id":"u1"}"#).unwrap();
        assert!(row.data.is_null());
    }
}
