//! Docker Engine API connector (bollard over plain TCP)

use async_trait::async_trait;
use bollard::errors::Error as BollardError;
use bollard::models::{ContainerCreateBody, ContainerInspectResponse, ContainerSummary, ImageSummary};
use bollard::query_parameters::{
    CreateContainerOptionsBuilder, InspectContainerOptions, ListContainersOptionsBuilder,
    ListImagesOptionsBuilder, LogsOptionsBuilder, RemoveContainerOptions, StartContainerOptions,
    StopContainerOptionsBuilder,
};
use bollard::{Docker, API_DEFAULT_VERSION};
use dockfleet_common::runtime::{LogOptions, RuntimeConnector, RuntimeError, RuntimeHandle};
use futures_util::TryStreamExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub struct DockerConnector {
    timeout_secs: u64,
}

impl DockerConnector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout_secs: timeout.as_secs().max(1) }
    }
}

#[async_trait]
impl RuntimeConnector for DockerConnector {
    /// A handle is only returned once the engine answered a ping.
    async fn connect(&self, ip: &str, port: u16) -> Result<Arc<dyn RuntimeHandle>, RuntimeError> {
        let endpoint = format!("tcp://{ip}:{port}");
        let docker = Docker::connect_with_http(&endpoint, self.timeout_secs, API_DEFAULT_VERSION)
            .map_err(|e| RuntimeError::Connect { endpoint: endpoint.clone(), message: e.to_string() })?;

        let version = docker
            .ping()
            .await
            .map_err(|e| RuntimeError::Connect { endpoint: endpoint.clone(), message: e.to_string() })?;
        debug!(endpoint = %endpoint, ping = %version, "docker engine reachable");

        Ok(Arc::new(DockerHandle { docker, endpoint }))
    }
}

pub struct DockerHandle {
    docker: Docker,
    endpoint: String,
}

fn call_error(operation: &'static str, target: &str, source: BollardError) -> RuntimeError {
    let message = match &source {
        BollardError::DockerResponseServerError { status_code, message } => {
            format!("{target}: {status_code} {message}")
        }
        other => format!("{target}: {other}"),
    };
    RuntimeError::Call { operation, message }
}

/// Docker takes whole seconds as i32; 0 means "unbounded".
fn clamp_secs(secs: i64) -> i32 {
    secs.clamp(0, i32::MAX as i64) as i32
}

#[async_trait]
impl RuntimeHandle for DockerHandle {
    async fn list_containers(&self) -> Result<Vec<ContainerSummary>, RuntimeError> {
        let options = ListContainersOptionsBuilder::new().all(true).build();
        self.docker
            .list_containers(Some(options))
            .await
            .map_err(|e| call_error("list_containers", &self.endpoint, e))
    }

    async fn list_images(&self) -> Result<Vec<ImageSummary>, RuntimeError> {
        let options = ListImagesOptionsBuilder::new().all(true).build();
        self.docker
            .list_images(Some(options))
            .await
            .map_err(|e| call_error("list_images", &self.endpoint, e))
    }

    async fn create_container(&self, name: &str, body: ContainerCreateBody) -> Result<String, RuntimeError> {
        let options = CreateContainerOptionsBuilder::new().name(name).build();
        let created = self
            .docker
            .create_container(Some(options), body)
            .await
            .map_err(|e| call_error("create_container", name, e))?;
        Ok(created.id)
    }

    async fn start_container(&self, id: &str) -> Result<(), RuntimeError> {
        self.docker
            .start_container(id, None::<StartContainerOptions>)
            .await
            .map_err(|e| call_error("start_container", id, e))
    }

    async fn stop_container(&self, id: &str, grace: Duration) -> Result<(), RuntimeError> {
        let options = StopContainerOptionsBuilder::new().t(clamp_secs(grace.as_secs() as i64)).build();
        self.docker
            .stop_container(id, Some(options))
            .await
            .map_err(|e| call_error("stop_container", id, e))
    }

    async fn remove_container(&self, id: &str) -> Result<(), RuntimeError> {
        self.docker
            .remove_container(id, None::<RemoveContainerOptions>)
            .await
            .map_err(|e| call_error("remove_container", id, e))
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerInspectResponse, RuntimeError> {
        self.docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
            .map_err(|e| call_error("inspect_container", id, e))
    }

    async fn container_logs(&self, id: &str, options: &LogOptions) -> Result<Vec<u8>, RuntimeError> {
        let mut builder = LogsOptionsBuilder::new()
            .follow(false)
            .stdout(options.show_stdout)
            .stderr(options.show_stderr)
            .since(clamp_secs(options.since))
            .until(clamp_secs(options.until))
            .timestamps(options.timestamps);
        if let Some(tail) = options.tail.as_deref() {
            builder = builder.tail(tail);
        }

        let chunks: Vec<_> = self
            .docker
            .logs(id, Some(builder.build()))
            .try_collect()
            .await
            .map_err(|e| call_error("container_logs", id, e))?;

        let mut buf = Vec::new();
        for chunk in chunks {
            buf.extend_from_slice(&chunk.into_bytes());
        }
        Ok(buf)
    }

    /// The HTTP client holds no session; dropping the handle releases its sockets.
    async fn close(&self) -> Result<(), RuntimeError> {
        debug!(endpoint = %self.endpoint, "docker handle released");
        Ok(())
    }
}
