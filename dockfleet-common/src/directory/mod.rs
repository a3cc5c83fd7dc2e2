//! FLEET DIRECTORY - host snapshots over an external key-value store
//!
//! Agents `publish` their `HostRecord` under `KEY_PREFIX + ip`; the kernel
//! reads them back with `list_all` / `get_by_ip`. The store itself is external
//! (etcd in production, see `etcd::EtcdGateway`); this layer only:
//! - bounds every read by a deadline, the store future is dropped when it
//!   expires so a late answer can never reach a caller that already moved on
//! - isolates per-entry corruption, one bad value never aborts a listing
//! - converts heartbeats into ages using an injected `Clock`
//!
//! Stale records are never deleted here; readers get `HostView::stale`.

mod etcd;

pub use etcd::EtcdGateway;

use crate::clock::{Clock, SystemClock};
use crate::host::{HostRecord, HostView};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Every host record lives under this prefix, keyed by ip.
pub const KEY_PREFIX: &str = "/dockfleet/hosts/";

pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_STALE_AFTER_SECS: u64 = 10;

/// Failure reported by a `DirectoryStore` implementation
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store rejected request: {0}")]
    Rejected(String),
    #[error("malformed store response: {0}")]
    Malformed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("directory did not answer within {0:?}")]
    Timeout(Duration),
    #[error("directory read failed: {0}")]
    Read(#[source] StoreError),
    #[error("directory write failed: {0}")]
    Write(#[source] StoreError),
    #[error("host record serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl DirectoryError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, DirectoryError::Timeout(_))
    }
}

/// Minimal key-value surface the fleet directory needs
#[async_trait]
pub trait DirectoryStore: Send + Sync {
    /// Upsert, last writer wins
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError>;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// All entries whose key starts with `prefix`, in store order
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StoreError>;
}

pub fn host_key(ip: &str) -> String {
    format!("{KEY_PREFIX}{ip}")
}

pub struct FleetDirectory {
    store: Arc<dyn DirectoryStore>,
    clock: Arc<dyn Clock>,
    publish_timeout: Duration,
    stale_after_secs: u64,
}

impl FleetDirectory {
    pub fn new(store: Arc<dyn DirectoryStore>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            publish_timeout: DEFAULT_PUBLISH_TIMEOUT,
            stale_after_secs: DEFAULT_STALE_AFTER_SECS,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_publish_timeout(mut self, timeout: Duration) -> Self {
        self.publish_timeout = timeout;
        self
    }

    pub fn with_stale_after(mut self, secs: u64) -> Self {
        self.stale_after_secs = secs;
        self
    }

    /// Best-effort publish: failures are logged and swallowed so the
    /// periodic publisher keeps running.
    pub async fn publish(&self, record: &HostRecord) {
        if let Err(e) = self.try_publish(record).await {
            error!(op = "directory.publish", ip = %record.info.ip, error = %e, "host record not published");
        }
    }

    pub async fn try_publish(&self, record: &HostRecord) -> Result<(), DirectoryError> {
        let payload = serde_json::to_vec(record)?;
        let key = host_key(&record.info.ip);

        match tokio::time::timeout(self.publish_timeout, self.store.put(&key, payload)).await {
            Ok(Ok(())) => {
                debug!(key = %key, heartbeat = record.heartbeat, "host record published");
                Ok(())
            }
            Ok(Err(e)) => Err(DirectoryError::Write(e)),
            Err(_) => Err(DirectoryError::Timeout(self.publish_timeout)),
        }
    }

    /// Every readable record under the prefix, in store order.
    pub async fn list_all(&self, timeout: Duration) -> Result<Vec<HostView>, DirectoryError> {
        let entries = match tokio::time::timeout(timeout, self.store.scan_prefix(KEY_PREFIX)).await {
            Ok(Ok(entries)) => entries,
            Ok(Err(e)) => {
                error!(op = "directory.list_all", prefix = KEY_PREFIX, error = %e, "prefix scan failed");
                return Err(DirectoryError::Read(e));
            }
            Err(_) => {
                warn!(op = "directory.list_all", prefix = KEY_PREFIX, ?timeout, "prefix scan timed out");
                return Err(DirectoryError::Timeout(timeout));
            }
        };

        let now = self.clock.now_epoch_secs();
        let mut hosts = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            match serde_json::from_slice::<HostRecord>(&value) {
                Ok(record) => hosts.push(record.into_view(now, self.stale_after_secs)),
                Err(e) => {
                    error!(op = "directory.list_all", key = %key, error = %e, "skipping unreadable host record");
                }
            }
        }
        Ok(hosts)
    }

    /// `Ok(None)` when no record exists for `ip`.
    pub async fn get_by_ip(&self, ip: &str, timeout: Duration) -> Result<Option<HostView>, DirectoryError> {
        let key = host_key(ip);
        let value = match tokio::time::timeout(timeout, self.store.get(&key)).await {
            Ok(Ok(Some(value))) => value,
            Ok(Ok(None)) => return Ok(None),
            Ok(Err(e)) => {
                error!(op = "directory.get_by_ip", key = %key, error = %e, "single key read failed");
                return Err(DirectoryError::Read(e));
            }
            Err(_) => {
                warn!(op = "directory.get_by_ip", key = %key, ?timeout, "single key read timed out");
                return Err(DirectoryError::Timeout(timeout));
            }
        };

        let record: HostRecord = serde_json::from_slice(&value).map_err(|e| {
            error!(op = "directory.get_by_ip", key = %key, error = %e, "unreadable host record");
            DirectoryError::Read(StoreError::Malformed(format!("{key}: {e}")))
        })?;
        Ok(Some(record.into_view(self.clock.now_epoch_secs(), self.stale_after_secs)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_key_appends_ip_to_prefix() {
        assert_eq!(host_key("10.0.0.5"), "/dockfleet/hosts/10.0.0.5");
    }

    #[test]
    fn timeout_is_distinguishable_from_read_error() {
        assert!(DirectoryError::Timeout(Duration::from_secs(2)).is_timeout());
        assert!(!DirectoryError::Read(StoreError::Unavailable("down".into())).is_timeout());
    }
}
