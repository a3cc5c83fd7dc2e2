//! Periodic host record publisher

use crate::metrics::HostCollector;
use dockfleet_common::directory::FleetDirectory;
use dockfleet_common::host::HostRecord;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::info;

/// Something that can produce a fresh snapshot on every tick
pub trait SnapshotSource: Send {
    fn snapshot(&mut self) -> HostRecord;
}

impl SnapshotSource for HostCollector {
    fn snapshot(&mut self) -> HostRecord {
        self.collect()
    }
}

/// Publishes right away, then once per `every`. Never returns; publish
/// failures are logged by the directory and the loop carries on.
pub async fn run<S: SnapshotSource>(directory: Arc<FleetDirectory>, mut source: S, every: Duration) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(interval_secs = every.as_secs(), "heartbeat started");

    loop {
        ticker.tick().await;
        let record = source.snapshot();
        directory.publish(&record).await;
    }
}
