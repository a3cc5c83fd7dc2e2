/*!
RUNTIME CONNECTION POOL - one live runtime API handle per host ip

Lazily filled by `add`, refreshed by `reconnect`, torn down by `remove` and,
once at shutdown, by `close_all`.

The map holds one slot per ip. The map lock is only taken to fetch, insert or
swap a slot and is never held across a dial; each slot is a `OnceCell`, so
concurrent `add`s for the same ip dial exactly once while other ips carry on.
A slot whose dial is still running reads as absent.

Dialing is delegated to a `RuntimeConnector` (Docker in production, devkit
fakes in tests).
*/

use dockfleet_common::runtime::{RuntimeConnector, RuntimeError, RuntimeHandle};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{OnceCell, RwLock};
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("cannot connect to runtime on {ip}: {source}")]
    Connect {
        ip: String,
        #[source]
        source: RuntimeError,
    },
    #[error("no pooled runtime connection for {0}")]
    NotFound(String),
    #[error("connection pool is closed")]
    Closed,
}

type Slot = Arc<OnceCell<Arc<dyn RuntimeHandle>>>;

pub struct PoolRegistry {
    connector: Arc<dyn RuntimeConnector>,
    entries: RwLock<HashMap<String, Slot>>,
    closed: AtomicBool,
}

impl PoolRegistry {
    pub fn new(connector: Arc<dyn RuntimeConnector>) -> Self {
        Self {
            connector,
            entries: RwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Returns the pooled handle for `ip`, dialing `ip:port` only if none exists.
    pub async fn add(&self, ip: &str, port: u16) -> Result<Arc<dyn RuntimeHandle>, PoolError> {
        let slot = {
            let mut entries = self.entries.write().await;
            if self.closed.load(Ordering::SeqCst) {
                return Err(PoolError::Closed);
            }
            entries.entry(ip.to_string()).or_default().clone()
        };

        if let Some(handle) = slot.get() {
            return Ok(handle.clone());
        }
        let handle = self.fill(ip, port, &slot).await?;
        info!(op = "pool.add", ip = %ip, port, "runtime connection pooled");
        Ok(handle)
    }

    pub async fn get(&self, ip: &str) -> Result<Arc<dyn RuntimeHandle>, PoolError> {
        self.entries
            .read()
            .await
            .get(ip)
            .and_then(|slot| slot.get().cloned())
            .ok_or_else(|| PoolError::NotFound(ip.to_string()))
    }

    /// Closes the existing handle (if any) and always dials a fresh one.
    /// When the new dial fails the old entry stays removed.
    pub async fn reconnect(&self, ip: &str, port: u16) -> Result<Arc<dyn RuntimeHandle>, PoolError> {
        let slot: Slot = Arc::new(OnceCell::new());
        let old = {
            let mut entries = self.entries.write().await;
            if self.closed.load(Ordering::SeqCst) {
                return Err(PoolError::Closed);
            }
            entries.insert(ip.to_string(), slot.clone())
        };

        if let Some(old) = old.as_ref().and_then(|s| s.get()) {
            if let Err(e) = old.close().await {
                warn!(op = "pool.reconnect", ip = %ip, error = %e, "closing previous connection failed");
            }
        }

        let handle = self.fill(ip, port, &slot).await?;
        info!(op = "pool.reconnect", ip = %ip, port, "runtime connection replaced");
        Ok(handle)
    }

    /// Returns whether an entry existed.
    pub async fn remove(&self, ip: &str) -> bool {
        let slot = self.entries.write().await.remove(ip);
        let Some(handle) = slot.as_ref().and_then(|s| s.get()) else {
            return false;
        };
        if let Err(e) = handle.close().await {
            warn!(op = "pool.remove", ip = %ip, error = %e, "closing connection failed");
        }
        info!(op = "pool.remove", ip = %ip, "runtime connection dropped");
        true
    }

    /// Closes every handle; only the first call does anything.
    pub async fn close_all(&self) {
        let slots: Vec<(String, Slot)> = {
            let mut entries = self.entries.write().await;
            if self.closed.swap(true, Ordering::SeqCst) {
                return;
            }
            entries.drain().collect()
        };

        let mut count = 0;
        for (ip, slot) in slots {
            let Some(handle) = slot.get() else { continue };
            count += 1;
            if let Err(e) = handle.close().await {
                warn!(op = "pool.close_all", ip = %ip, error = %e, "closing connection failed");
            }
        }
        info!(op = "pool.close_all", closed = count, "connection pool shut down");
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.values().filter(|s| s.initialized()).count()
    }

    pub async fn ips(&self) -> Vec<String> {
        let mut ips: Vec<String> = self
            .entries
            .read()
            .await
            .iter()
            .filter(|(_, s)| s.initialized())
            .map(|(ip, _)| ip.clone())
            .collect();
        ips.sort();
        ips
    }

    /// Dials into `slot` unless another caller already did. A failed dial
    /// drops the slot from the map if it is still the current one.
    async fn fill(&self, ip: &str, port: u16, slot: &Slot) -> Result<Arc<dyn RuntimeHandle>, PoolError> {
        match slot.get_or_try_init(|| self.dial(ip, port)).await {
            Ok(handle) => {
                let handle = handle.clone();
                if self.closed.load(Ordering::SeqCst) {
                    // close_all drained the map while this dial was in flight
                    if let Err(e) = handle.close().await {
                        warn!(op = "pool.dial", ip = %ip, error = %e, "closing late connection failed");
                    }
                    return Err(PoolError::Closed);
                }
                Ok(handle)
            }
            Err(e) => {
                let mut entries = self.entries.write().await;
                if entries.get(ip).is_some_and(|s| Arc::ptr_eq(s, slot) && !s.initialized()) {
                    entries.remove(ip);
                }
                Err(e)
            }
        }
    }

    async fn dial(&self, ip: &str, port: u16) -> Result<Arc<dyn RuntimeHandle>, PoolError> {
        self.connector.connect(ip, port).await.map_err(|source| {
            warn!(op = "pool.dial", ip = %ip, port, error = %source, "runtime dial failed");
            PoolError::Connect { ip: ip.to_string(), source }
        })
    }
}
