/*!
Test harness

Wires a `FleetDirectory` to a `MemoryDirectory` and a `FixedClock`, next to a
`FakeConnector`, so a test gets the whole backing world in one line.
*/

use crate::fake_runtime::FakeConnector;
use crate::memory_store::MemoryDirectory;
use dockfleet_common::clock::Clock;
use dockfleet_common::directory::FleetDirectory;
use dockfleet_common::host::{HostInfo, HostRecord};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Clock frozen at a settable instant
#[derive(Debug, Default)]
pub struct FixedClock {
    now: AtomicI64,
}

impl FixedClock {
    pub fn at(epoch_secs: i64) -> Self {
        Self { now: AtomicI64::new(epoch_secs) }
    }

    pub fn set(&self, epoch_secs: i64) {
        self.now.store(epoch_secs, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: i64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now_epoch_secs(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Plausible snapshot of a host at `ip`
pub fn sample_record(ip: &str, heartbeat: i64) -> HostRecord {
    HostRecord {
        info: HostInfo {
            host_name: format!("node-{}", ip.replace('.', "-")),
            os: "linux".to_string(),
            ip: ip.to_string(),
            api_port: 2375,
            grpc_port: 19876,
            cpu_cores: 4,
            cpu_usage_pct: 7.5,
            total_mem_gb: 15.5,
            free_mem_gb: 9.25,
            total_disk_gb: 256,
            free_disk_gb: 120,
        },
        heartbeat,
    }
}

pub struct TestHarness {
    pub store: MemoryDirectory,
    pub clock: Arc<FixedClock>,
    pub directory: Arc<FleetDirectory>,
    pub connector: Arc<FakeConnector>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::at(1_000)
    }

    /// Harness whose clock reads `epoch_secs`.
    pub fn at(epoch_secs: i64) -> Self {
        init_tracing();

        let store = MemoryDirectory::new();
        let clock = Arc::new(FixedClock::at(epoch_secs));
        let directory = FleetDirectory::new(Arc::new(store.clone())).with_clock(clock.clone());

        Self {
            store,
            clock,
            directory: Arc::new(directory),
            connector: Arc::new(FakeConnector::new()),
        }
    }

    /// Publishes a sample record for `ip` through the directory.
    pub async fn publish_host(&self, ip: &str, heartbeat: i64) -> anyhow::Result<HostRecord> {
        let record = sample_record(ip, heartbeat);
        self.directory.try_publish(&record).await?;
        Ok(record)
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Test logging, filtered by `RUST_LOG`; repeated calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
