use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::clock::Clock;
use crate::error::{Result, SyncError};
use crate::models::{RemoteRatingChange, RemoteSubmission, RemoteUserProfile};

const USER_AGENT: &str = concat!("roster-sync/", env!("CARGO_PKG_VERSION"));
const ERROR_BODY_EXCERPT: usize = 200;

/// Performs a GET against the service and hands back the raw body.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, path_and_query: &str) -> Result<String>;
}

pub struct HttpTransport {
    http_client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, path_and_query: &str) -> Result<String> {
        let url = format!("{}{}", self.base_url, path_and_query);
        tracing::debug!(url = %url, "Querying Codeforces API");

        let response = self.http_client.get(&url).send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let excerpt: String = body.chars().take(ERROR_BODY_EXCERPT).collect();
            return Err(SyncError::Transport(format!("HTTP {status}: {excerpt}")));
        }

        Ok(response.text().await?)
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    status: String,
    comment: Option<String>,
    result: Option<serde_json::Value>,
}

fn unwrap_envelope(body: &str) -> Result<serde_json::Value> {
    let envelope: Envelope = serde_json::from_str(body)
        .map_err(|e| SyncError::RemoteService(format!("malformed response envelope: {e}")))?;

    match envelope.status.as_str() {
        "OK" => {}
        "FAILED" => {
            return Err(SyncError::RemoteService(
                envelope
                    .comment
                    .unwrap_or_else(|| "Codeforces API request failed".to_string()),
            ));
        }
        other => {
            return Err(SyncError::RemoteService(format!(
                "unexpected response status {other:?}"
            )));
        }
    }

    match envelope.result {
        Some(serde_json::Value::Null) | None => Err(SyncError::RemoteService(
            "no result data received from Codeforces API".to_string(),
        )),
        Some(result) => Ok(result),
    }
}

struct CacheEntry {
    payload: serde_json::Value,
    fetched_at: DateTime<Utc>,
}

pub struct CodeforcesClient {
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    ttl: chrono::Duration,
    // TODO: cap the entry count; keys are only replaced on refetch, never swept.
    cache: Mutex<HashMap<String, CacheEntry>>,
}

impl CodeforcesClient {
    pub fn new(transport: Arc<dyn Transport>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        // Out-of-range TTLs behave as "cache for good".
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(365 * 100));
        Self {
            transport,
            clock,
            ttl,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Bulk profile lookup. An empty list never reaches the network.
    pub async fn fetch_profiles(&self, handles: &[String]) -> Result<Vec<RemoteUserProfile>> {
        if handles.is_empty() {
            return Ok(Vec::new());
        }
        self.request(format!("/user.info?handles={}", handles.join(";")))
            .await
    }

    pub async fn fetch_submissions(
        &self,
        handle: &str,
        from: Option<u32>,
        count: Option<u32>,
    ) -> Result<Vec<RemoteSubmission>> {
        let mut endpoint = format!("/user.status?handle={handle}");
        if let Some(from) = from {
            endpoint.push_str(&format!("&from={from}"));
        }
        if let Some(count) = count {
            endpoint.push_str(&format!("&count={count}"));
        }
        self.request(endpoint).await
    }

    pub async fn fetch_rating_history(&self, handle: &str) -> Result<Vec<RemoteRatingChange>> {
        self.request(format!("/user.rating?handle={handle}")).await
    }

    pub fn clear_cache(&self) {
        self.cache.lock().clear();
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.lock().len()
    }

    async fn request<T: DeserializeOwned>(&self, endpoint: String) -> Result<T> {
        if let Some(payload) = self.cached(&endpoint) {
            tracing::debug!(endpoint = %endpoint, "Serving Codeforces response from cache");
            return decode(&endpoint, payload);
        }

        let payload = match self.fetch(&endpoint).await {
            Ok(payload) => payload,
            Err(err) => {
                tracing::warn!(endpoint = %endpoint, error = %err, "Codeforces API request failed");
                return Err(err);
            }
        };

        let decoded = decode(&endpoint, payload.clone())?;
        self.cache.lock().insert(
            endpoint,
            CacheEntry {
                payload,
                fetched_at: self.clock.now(),
            },
        );
        Ok(decoded)
    }

    fn cached(&self, endpoint: &str) -> Option<serde_json::Value> {
        let now = self.clock.now();
        let cache = self.cache.lock();
        cache
            .get(endpoint)
            .filter(|entry| now.signed_duration_since(entry.fetched_at) < self.ttl)
            .map(|entry| entry.payload.clone())
    }

    async fn fetch(&self, endpoint: &str) -> Result<serde_json::Value> {
        let body = self.transport.get(endpoint).await?;
        unwrap_envelope(&body)
    }
}

fn decode<T: DeserializeOwned>(endpoint: &str, payload: serde_json::Value) -> Result<T> {
    serde_json::from_value(payload).map_err(|e| {
        SyncError::RemoteService(format!("unexpected result shape from {endpoint}: {e}"))
    })
}
