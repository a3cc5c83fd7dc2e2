/*!
DOCKFLEET KERNEL - fleet coordinator entry point

Bootstraps the directory client (etcd), the runtime connection pool (Docker
Engine API) and the HTTP surface. On ctrl-c the server stops and every
pooled connection is closed exactly once.
*/

mod config;
mod containers;
mod docker;
mod health;
mod http;
mod models;
mod pool;
mod state;

use crate::config::{load_config, ConfigOrigin};
use crate::docker::DockerConnector;
use crate::pool::PoolRegistry;
use crate::state::AppState;
use anyhow::Context;
use dockfleet_common::directory::{EtcdGateway, FleetDirectory};
use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is optional
    dotenvy::dotenv().ok();

    let (cfg, origin) = load_config().await;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    match &origin {
        ConfigOrigin::File(path) => info!(path = %path, "configuration loaded"),
        ConfigOrigin::Missing(path) => warn!(path = %path, "no configuration file, using defaults"),
        ConfigOrigin::Invalid { path, error } => {
            error!(path = %path, error = %error, "invalid configuration, using defaults")
        }
    }

    let gateway = EtcdGateway::new(&cfg.directory.endpoints, cfg.directory.dial_timeout())
        .context("cannot build directory client")?;
    info!(endpoints = ?gateway.endpoints(), "directory client ready");
    let directory = FleetDirectory::new(Arc::new(gateway)).with_stale_after(cfg.directory.stale_after_secs);

    let connector = DockerConnector::new(Duration::from_secs(cfg.runtime.dial_timeout_secs));
    let pool = Arc::new(PoolRegistry::new(Arc::new(connector)));

    let addr = cfg.listen;
    let app_state = AppState::new(Arc::new(directory), pool.clone(), cfg);
    let app = http::build_router(app_state);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("cannot listen on {addr}"))?;
    info!(addr = %addr, "kernel listening");

    // in-flight requests are abandoned, not drained
    let server = axum::serve(listener, app).into_future();
    tokio::select! {
        res = server => res.context("http server failed")?,
        _ = shutdown_signal() => {}
    }

    pool.close_all().await;
    info!("kernel stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "cannot listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
