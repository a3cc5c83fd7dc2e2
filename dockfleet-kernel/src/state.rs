use crate::config::KernelConfig;
use crate::health::HealthTracker;
use crate::pool::PoolRegistry;
use dockfleet_common::directory::FleetDirectory;
use dockfleet_common::provision::Provisioner;
use std::sync::Arc;

/// Everything a request handler can reach
#[derive(Clone)]
pub struct AppState {
    pub directory: Arc<FleetDirectory>,
    pub pool: Arc<PoolRegistry>,
    pub provisioner: Provisioner,
    pub health: HealthTracker,
    pub cfg: Arc<KernelConfig>,
}

impl AppState {
    pub fn new(directory: Arc<FleetDirectory>, pool: Arc<PoolRegistry>, cfg: KernelConfig) -> Self {
        Self {
            directory,
            pool,
            provisioner: Provisioner::new(cfg.provision.timeout()),
            health: HealthTracker::new(),
            cfg: Arc::new(cfg),
        }
    }
}
