//! Container runtime seam
//!
//! The kernel pools one `RuntimeHandle` per host ip and dials new ones through
//! a `RuntimeConnector`. Production code plugs in the Docker Engine API
//! (bollard); tests plug in the devkit fakes.

use async_trait::async_trait;
use bollard::models::{ContainerCreateBody, ContainerInspectResponse, ContainerSummary, ImageSummary};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("cannot reach runtime at {endpoint}: {message}")]
    Connect { endpoint: String, message: String },
    #[error("runtime call {operation} failed: {message}")]
    Call { operation: &'static str, message: String },
    #[error("runtime close failed: {0}")]
    Close(String),
}

/// Options for fetching a container's log stream
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LogOptions {
    pub show_stdout: bool,
    pub show_stderr: bool,
    /// Unix seconds, 0 = from the beginning
    pub since: i64,
    /// Unix seconds, 0 = up to now
    pub until: i64,
    pub timestamps: bool,
    /// Number of lines from the end, or "all"
    pub tail: Option<String>,
}

/// One open connection to a host's runtime control API
#[async_trait]
pub trait RuntimeHandle: Send + Sync {
    async fn list_containers(&self) -> Result<Vec<ContainerSummary>, RuntimeError>;

    async fn list_images(&self) -> Result<Vec<ImageSummary>, RuntimeError>;

    /// Returns the new container id.
    async fn create_container(&self, name: &str, body: ContainerCreateBody) -> Result<String, RuntimeError>;

    async fn start_container(&self, id: &str) -> Result<(), RuntimeError>;

    async fn stop_container(&self, id: &str, grace: Duration) -> Result<(), RuntimeError>;

    async fn remove_container(&self, id: &str) -> Result<(), RuntimeError>;

    async fn inspect_container(&self, id: &str) -> Result<ContainerInspectResponse, RuntimeError>;

    /// Whole log stream, buffered.
    async fn container_logs(&self, id: &str, options: &LogOptions) -> Result<Vec<u8>, RuntimeError>;

    async fn close(&self) -> Result<(), RuntimeError>;
}

/// Dials a host's runtime control API
#[async_trait]
pub trait RuntimeConnector: Send + Sync {
    async fn connect(&self, ip: &str, port: u16) -> Result<Arc<dyn RuntimeHandle>, RuntimeError>;
}
