//! dockfleet agent - per-host companion of the fleet kernel
//!
//! Runs on every container host:
//! - publishes a host snapshot (identity, CPU, memory, disk) to the fleet
//!   directory every few seconds
//! - serves the provisioning RPC that writes container entry-point scripts

mod config;
mod heartbeat;
mod metrics;
mod rpc;
mod script;

use anyhow::{Context, Result};
use config::AgentConfig;
use dockfleet_common::directory::{EtcdGateway, FleetDirectory};
use metrics::{HostCollector, HostIdentity};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let (config, path) = AgentConfig::load().await?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    info!("dockfleet agent v{}", env!("CARGO_PKG_VERSION"));
    info!(path = %path.display(), exists = path.exists(), "configuration");

    let export_ip = config.resolve_export_ip()?;
    let identity = HostIdentity::detect(export_ip, config.api_port, config.rpc_port);
    info!(
        host = %identity.host_name,
        ip = %identity.ip,
        api_port = identity.api_port,
        rpc_port = identity.grpc_port,
        "host identity"
    );

    let gateway = EtcdGateway::new(&config.etcd.endpoints, config.dial_timeout())
        .context("cannot build directory client")?;
    let directory = Arc::new(FleetDirectory::new(Arc::new(gateway)).with_publish_timeout(config.publish_timeout()));

    // bind before the first heartbeat so a host never advertises a dead rpc port
    let listener = rpc::bind(config.rpc_port).await?;

    let collector = HostCollector::new(identity);
    let beat = tokio::spawn(heartbeat::run(directory, collector, config.heartbeat_interval()));

    tokio::select! {
        res = rpc::serve(listener, config.rpc_read_timeout()) => {
            if let Err(e) = &res {
                error!(error = %e, "provisioning rpc stopped");
            }
            res?;
        }
        _ = tokio::signal::ctrl_c() => info!("shutdown requested"),
    }

    beat.abort();
    info!("agent stopped");
    Ok(())
}
