//! Lifecycle operations against one resolved runtime handle.
//!
//! Every failure is logged here with its operation and target, then returned
//! tagged so the HTTP layer can turn it into a short message.

use super::spec::{ContainerSpec, CreateStage};
use bollard::models::{ContainerInspectResponse, ContainerSummary, ImageSummary};
use dockfleet_common::runtime::{LogOptions, RuntimeError, RuntimeHandle};
use std::time::Duration;
use tracing::{error, info};

pub const STOP_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("{stage} error")]
    Create { stage: CreateStage, detail: String },
    #[error("{operation} container error")]
    Operation {
        operation: &'static str,
        id: String,
        #[source]
        source: RuntimeError,
    },
    #[error("{operation} error")]
    Read {
        operation: &'static str,
        #[source]
        source: RuntimeError,
    },
}

impl DispatchError {
    /// Full cause chain, for logs only.
    pub fn detail(&self) -> String {
        match self {
            DispatchError::Create { detail, .. } => detail.clone(),
            DispatchError::Operation { source, .. } | DispatchError::Read { source, .. } => source.to_string(),
        }
    }
}

fn op_error(operation: &'static str, id: &str, source: RuntimeError) -> DispatchError {
    error!(op = operation, container = %id, error = %source, "container operation failed");
    DispatchError::Operation { operation, id: id.to_string(), source }
}

fn stage_error(stage: CreateStage, name: &str, detail: String) -> DispatchError {
    error!(op = "create", stage = %stage, container = %name, error = %detail, "container create failed");
    DispatchError::Create { stage, detail }
}

/// Returns the new container id. Nothing is cleaned up on failure.
pub async fn create(handle: &dyn RuntimeHandle, spec: &ContainerSpec) -> Result<String, DispatchError> {
    let name = &spec.container_name;
    let mut body = spec
        .container_config()
        .map_err(|e| stage_error(CreateStage::ConfigInit, name, e.to_string()))?;
    let host = spec
        .host_config()
        .map_err(|e| stage_error(CreateStage::HostConfigInit, name, e.to_string()))?;
    body.host_config = Some(host);

    let id = handle
        .create_container(name, body)
        .await
        .map_err(|e| stage_error(CreateStage::CreateCall, name, e.to_string()))?;
    info!(op = "create", container = %name, id = %id, "container created");
    Ok(id)
}

pub async fn start(handle: &dyn RuntimeHandle, id: &str) -> Result<(), DispatchError> {
    handle.start_container(id).await.map_err(|e| op_error("start", id, e))
}

pub async fn stop(handle: &dyn RuntimeHandle, id: &str) -> Result<(), DispatchError> {
    handle
        .stop_container(id, STOP_GRACE)
        .await
        .map_err(|e| op_error("stop", id, e))
}

/// Stops first; a failed stop aborts the remove.
pub async fn remove(handle: &dyn RuntimeHandle, id: &str) -> Result<(), DispatchError> {
    stop(handle, id).await?;
    handle.remove_container(id).await.map_err(|e| op_error("remove", id, e))
}

pub async fn list(handle: &dyn RuntimeHandle) -> Result<Vec<ContainerSummary>, DispatchError> {
    handle.list_containers().await.map_err(|source| {
        error!(op = "list containers", error = %source, "runtime read failed");
        DispatchError::Read { operation: "list containers", source }
    })
}

pub async fn list_images(handle: &dyn RuntimeHandle) -> Result<Vec<ImageSummary>, DispatchError> {
    handle.list_images().await.map_err(|source| {
        error!(op = "list images", error = %source, "runtime read failed");
        DispatchError::Read { operation: "list images", source }
    })
}

pub async fn inspect(handle: &dyn RuntimeHandle, id: &str) -> Result<ContainerInspectResponse, DispatchError> {
    handle.inspect_container(id).await.map_err(|e| op_error("inspect", id, e))
}

/// Buffers the whole log stream, then splits it on CRLF.
pub async fn fetch_logs(
    handle: &dyn RuntimeHandle,
    id: &str,
    options: &LogOptions,
) -> Result<Vec<String>, DispatchError> {
    let raw = handle
        .container_logs(id, options)
        .await
        .map_err(|e| op_error("logs", id, e))?;
    Ok(split_log_lines(&raw))
}

fn split_log_lines(raw: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(raw).split("\r\n").map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::containers::spec::{ContainerRequest, DecimalInput};
    use dockfleet_devkit::FakeRuntime;

    fn spec() -> ContainerSpec {
        ContainerRequest {
            container_name: "api".into(),
            source_dirs: vec!["/data/api".into()],
            container_ports: vec!["8000".into()],
            host_ports: vec!["18000".into()],
            image_name: "api:latest".into(),
            max_cpu: DecimalInput::Text("1".into()),
            max_mem: DecimalInput::Text("0.5".into()),
        }
        .validate()
        .unwrap()
    }

    #[tokio::test]
    async fn create_sends_translated_body() {
        let rt = FakeRuntime::new("10.0.0.1:2375");
        let id = create(&rt, &spec()).await.unwrap();

        let created = rt.created();
        assert_eq!(created.len(), 1);
        let (name, body) = &created[0];
        assert_eq!(name, "api");
        assert_eq!(body.image.as_deref(), Some("api:latest"));
        let host = body.host_config.as_ref().unwrap();
        assert_eq!(host.memory, Some(536_870_912));
        assert_eq!(rt.calls(), vec![format!("create:api")]);
        assert!(!id.is_empty());
    }

    #[tokio::test]
    async fn bad_port_fails_before_any_runtime_call() {
        let rt = FakeRuntime::new("10.0.0.1:2375");
        let mut spec = spec();
        spec.container_ports = vec!["abc".into()];

        let err = create(&rt, &spec).await.unwrap_err();
        assert!(matches!(err, DispatchError::Create { stage: CreateStage::ConfigInit, .. }));
        assert!(rt.calls().is_empty());
    }

    #[tokio::test]
    async fn create_call_failure_is_stage_tagged() {
        let rt = FakeRuntime::new("10.0.0.1:2375");
        rt.fail_on("create");
        let err = create(&rt, &spec()).await.unwrap_err();
        assert!(matches!(err, DispatchError::Create { stage: CreateStage::CreateCall, .. }));
        assert_eq!(err.to_string(), "create container error");
    }

    #[tokio::test]
    async fn stop_uses_five_second_grace() {
        let rt = FakeRuntime::new("10.0.0.1:2375");
        stop(&rt, "c1").await.unwrap();
        assert_eq!(rt.last_grace(), Some(Duration::from_secs(5)));
    }

    #[tokio::test]
    async fn remove_stops_first() {
        let rt = FakeRuntime::new("10.0.0.1:2375");
        remove(&rt, "c1").await.unwrap();
        assert_eq!(rt.calls(), vec!["stop:c1", "remove:c1"]);
    }

    #[tokio::test]
    async fn failed_stop_aborts_remove() {
        let rt = FakeRuntime::new("10.0.0.1:2375");
        rt.fail_on("stop");
        let err = remove(&rt, "c1").await.unwrap_err();
        assert!(matches!(err, DispatchError::Operation { operation: "stop", .. }));
        assert_eq!(rt.calls(), vec!["stop:c1"]);
    }

    #[tokio::test]
    async fn start_failure_names_the_operation() {
        let rt = FakeRuntime::new("10.0.0.1:2375");
        rt.fail_on("start");
        let err = start(&rt, "c9").await.unwrap_err();
        assert_eq!(err.to_string(), "start container error");
        assert!(err.detail().contains("injected failure"));
    }

    #[tokio::test]
    async fn logs_are_split_on_crlf() {
        let rt = FakeRuntime::new("10.0.0.1:2375");
        rt.set_logs("booting\r\nready\r\nserving");
        let opts = LogOptions { show_stdout: true, ..Default::default() };

        let lines = fetch_logs(&rt, "c1", &opts).await.unwrap();
        assert_eq!(lines, vec!["booting", "ready", "serving"]);
        assert_eq!(rt.last_log_options(), Some(opts));
    }

    #[test]
    fn bare_newlines_stay_inside_a_line() {
        assert_eq!(split_log_lines(b"a\nb\r\nc"), vec!["a\nb", "c"]);
        assert_eq!(split_log_lines(b""), vec![""]);
    }
}
