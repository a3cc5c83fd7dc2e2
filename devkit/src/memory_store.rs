/*!
In-memory directory store

Keys are kept sorted, so prefix scans come back in the same order etcd would
return them. A configured delay is applied before the store is touched:
a caller that gives up early leaves no trace of its write.
*/

use async_trait::async_trait;
use dockfleet_common::directory::{DirectoryStore, StoreError};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
struct Inner {
    entries: Mutex<BTreeMap<String, Vec<u8>>>,
    delay: Mutex<Option<Duration>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    puts: AtomicUsize,
}

#[derive(Clone, Default)]
pub struct MemoryDirectory {
    inner: Arc<Inner>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores bytes as-is, bypassing serialization (for corrupt entries).
    pub fn put_raw(&self, key: &str, value: impl Into<Vec<u8>>) {
        self.inner.entries.lock().insert(key.to_string(), value.into());
    }

    pub fn get_raw(&self, key: &str) -> Option<Vec<u8>> {
        self.inner.entries.lock().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.inner.entries.lock().keys().cloned().collect()
    }

    /// Latency applied to every call, `None` to answer immediately.
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.inner.delay.lock() = delay;
    }

    pub fn fail_reads(&self, fail: bool) {
        self.inner.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.inner.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Completed puts only.
    pub fn put_count(&self) -> usize {
        self.inner.puts.load(Ordering::SeqCst)
    }

    async fn wait(&self) {
        let delay = *self.inner.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn check_read(&self) -> Result<(), StoreError> {
        if self.inner.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store: reads disabled".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl DirectoryStore for MemoryDirectory {
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        self.wait().await;
        if self.inner.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store: writes disabled".into()));
        }
        self.inner.entries.lock().insert(key.to_string(), value);
        self.inner.puts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.wait().await;
        self.check_read()?;
        Ok(self.get_raw(key))
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StoreError> {
        self.wait().await;
        self.check_read()?;
        Ok(self
            .inner
            .entries
            .lock()
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}
