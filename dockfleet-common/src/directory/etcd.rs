//! etcd v3 over its JSON gateway (`/v3/kv/*`)
//!
//! Keys and values travel base64-encoded. A prefix scan is a range request
//! whose `range_end` is the prefix with its last byte incremented.

use super::{DirectoryStore, StoreError};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Serialize)]
struct PutRequest {
    key: String,
    value: String,
}

#[derive(Debug, Serialize)]
struct RangeRequest {
    key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    range_end: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RangeResponse {
    #[serde(default)]
    kvs: Vec<KeyValue>,
}

#[derive(Debug, Deserialize)]
struct KeyValue {
    key: String,
    #[serde(default)]
    value: String,
}

/// HTTP client for one etcd cluster. Endpoints are tried in order and the
/// first one that answers wins.
#[derive(Debug, Clone)]
pub struct EtcdGateway {
    http: reqwest::Client,
    endpoints: Vec<String>,
}

impl EtcdGateway {
    pub fn new(endpoints: &[String], dial_timeout: Duration) -> Result<Self, StoreError> {
        let endpoints: Vec<String> = endpoints
            .iter()
            .map(|e| e.trim())
            .filter(|e| !e.is_empty())
            .map(normalize_endpoint)
            .collect();
        if endpoints.is_empty() {
            return Err(StoreError::Rejected("no etcd endpoint configured".into()));
        }

        let http = reqwest::Client::builder()
            .connect_timeout(dial_timeout)
            .build()
            .map_err(|e| StoreError::Unavailable(format!("http client: {e}")))?;

        Ok(Self { http, endpoints })
    }

    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    async fn call<B: Serialize>(&self, path: &str, body: &B) -> Result<Vec<u8>, StoreError> {
        let mut last_err = StoreError::Unavailable("no endpoint tried".into());
        for endpoint in &self.endpoints {
            let url = format!("{endpoint}{path}");
            match self.http.post(&url).json(body).send().await {
                Ok(resp) if resp.status().is_success() => {
                    let bytes = resp
                        .bytes()
                        .await
                        .map_err(|e| StoreError::Malformed(format!("{url}: {e}")))?;
                    return Ok(bytes.to_vec());
                }
                Ok(resp) => {
                    let status = resp.status();
                    let text = resp.text().await.unwrap_or_default();
                    // a rejection is the cluster's answer, no point asking another member
                    return Err(StoreError::Rejected(format!("{url}: {status} {text}")));
                }
                Err(e) => {
                    warn!(endpoint = %endpoint, error = %e, "etcd endpoint unreachable");
                    last_err = StoreError::Unavailable(format!("{url}: {e}"));
                }
            }
        }
        Err(last_err)
    }

    async fn range(&self, request: RangeRequest) -> Result<Vec<(String, Vec<u8>)>, StoreError> {
        let body = self.call("/v3/kv/range", &request).await?;
        let parsed: RangeResponse = serde_json::from_slice(&body)
            .map_err(|e| StoreError::Malformed(format!("range response: {e}")))?;

        let mut out = Vec::with_capacity(parsed.kvs.len());
        for kv in parsed.kvs {
            let key = B64
                .decode(&kv.key)
                .map_err(|e| StoreError::Malformed(format!("key encoding: {e}")))?;
            let value = B64
                .decode(&kv.value)
                .map_err(|e| StoreError::Malformed(format!("value encoding: {e}")))?;
            out.push((String::from_utf8_lossy(&key).into_owned(), value));
        }
        Ok(out)
    }
}

#[async_trait]
impl DirectoryStore for EtcdGateway {
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        let request = PutRequest {
            key: B64.encode(key.as_bytes()),
            value: B64.encode(&value),
        };
        self.call("/v3/kv/put", &request).await?;
        debug!(key = %key, "etcd put");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let request = RangeRequest {
            key: B64.encode(key.as_bytes()),
            range_end: None,
        };
        Ok(self.range(request).await?.into_iter().next().map(|(_, v)| v))
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StoreError> {
        let request = RangeRequest {
            key: B64.encode(prefix.as_bytes()),
            range_end: Some(B64.encode(prefix_range_end(prefix.as_bytes()))),
        };
        self.range(request).await
    }
}

fn normalize_endpoint(endpoint: &str) -> String {
    let endpoint = endpoint.trim_end_matches('/');
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        endpoint.to_string()
    } else {
        format!("http://{endpoint}")
    }
}

/// Smallest key greater than every key starting with `prefix`.
/// An all-0xff (or empty) prefix scans to the end of the keyspace ("\0").
fn prefix_range_end(prefix: &[u8]) -> Vec<u8> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < 0xff {
            end.push(last + 1);
            return end;
        }
    }
    vec![0]
}
