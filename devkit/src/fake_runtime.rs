/*!
Fake container runtime

`FakeConnector` hands out a fresh `FakeRuntime` per dial and keeps a clone of
each one so tests can look at what the kernel did with it. Every runtime call
is appended to a call log as `"<op>"` or `"<op>:<target>"`; any op can be made
to fail with `fail_on`.
*/

use async_trait::async_trait;
use bollard::models::{ContainerCreateBody, ContainerInspectResponse, ContainerSummary, ImageSummary};
use dockfleet_common::runtime::{LogOptions, RuntimeConnector, RuntimeError, RuntimeHandle};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub struct FakeRuntime {
    endpoint: String,
    calls: Mutex<Vec<String>>,
    failing: Mutex<HashSet<&'static str>>,
    containers: Mutex<Vec<ContainerSummary>>,
    images: Mutex<Vec<ImageSummary>>,
    created: Mutex<Vec<(String, ContainerCreateBody)>>,
    logs: Mutex<Vec<u8>>,
    last_log_options: Mutex<Option<LogOptions>>,
    last_grace: Mutex<Option<Duration>>,
    next_id: AtomicUsize,
    closed: AtomicBool,
}

impl FakeRuntime {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            calls: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
            containers: Mutex::new(Vec::new()),
            images: Mutex::new(Vec::new()),
            created: Mutex::new(Vec::new()),
            logs: Mutex::new(Vec::new()),
            last_log_options: Mutex::new(None),
            last_grace: Mutex::new(None),
            next_id: AtomicUsize::new(1),
            closed: AtomicBool::new(false),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Makes `op` ("create", "start", "stop", "remove", "inspect", "logs",
    /// "list_containers", "list_images", "close") fail from now on.
    pub fn fail_on(&self, op: &'static str) {
        self.failing.lock().insert(op);
    }

    pub fn set_logs(&self, bytes: impl Into<Vec<u8>>) {
        *self.logs.lock() = bytes.into();
    }

    pub fn set_images(&self, images: Vec<ImageSummary>) {
        *self.images.lock() = images;
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn created(&self) -> Vec<(String, ContainerCreateBody)> {
        self.created.lock().clone()
    }

    pub fn last_log_options(&self) -> Option<LogOptions> {
        self.last_log_options.lock().clone()
    }

    pub fn last_grace(&self) -> Option<Duration> {
        *self.last_grace.lock()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn record(&self, op: &'static str, target: Option<&str>) -> Result<(), RuntimeError> {
        let entry = match target {
            Some(t) => format!("{op}:{t}"),
            None => op.to_string(),
        };
        self.calls.lock().push(entry);

        if self.failing.lock().contains(op) {
            return Err(RuntimeError::Call {
                operation: op,
                message: format!("injected failure at {}", self.endpoint),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RuntimeHandle for FakeRuntime {
    async fn list_containers(&self) -> Result<Vec<ContainerSummary>, RuntimeError> {
        self.record("list_containers", None)?;
        Ok(self.containers.lock().clone())
    }

    async fn list_images(&self) -> Result<Vec<ImageSummary>, RuntimeError> {
        self.record("list_images", None)?;
        Ok(self.images.lock().clone())
    }

    async fn create_container(&self, name: &str, body: ContainerCreateBody) -> Result<String, RuntimeError> {
        self.record("create", Some(name))?;
        let id = format!("c{:04}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.containers.lock().push(ContainerSummary {
            id: Some(id.clone()),
            names: Some(vec![format!("/{name}")]),
            image: body.image.clone(),
            ..Default::default()
        });
        self.created.lock().push((name.to_string(), body));
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> Result<(), RuntimeError> {
        self.record("start", Some(id))
    }

    async fn stop_container(&self, id: &str, grace: Duration) -> Result<(), RuntimeError> {
        *self.last_grace.lock() = Some(grace);
        self.record("stop", Some(id))
    }

    async fn remove_container(&self, id: &str) -> Result<(), RuntimeError> {
        self.record("remove", Some(id))?;
        self.containers.lock().retain(|c| c.id.as_deref() != Some(id));
        Ok(())
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerInspectResponse, RuntimeError> {
        self.record("inspect", Some(id))?;
        Ok(ContainerInspectResponse {
            id: Some(id.to_string()),
            ..Default::default()
        })
    }

    async fn container_logs(&self, id: &str, options: &LogOptions) -> Result<Vec<u8>, RuntimeError> {
        *self.last_log_options.lock() = Some(options.clone());
        self.record("logs", Some(id))?;
        Ok(self.logs.lock().clone())
    }

    async fn close(&self) -> Result<(), RuntimeError> {
        self.closed.store(true, Ordering::SeqCst);
        self.record("close", None)
    }
}

/// Counts dials; every successful dial yields a new `FakeRuntime`.
#[derive(Default)]
pub struct FakeConnector {
    dials: AtomicUsize,
    fail: AtomicBool,
    dial_delay: Mutex<Option<Duration>>,
    handles: Mutex<Vec<Arc<FakeRuntime>>>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_dials(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn set_dial_delay(&self, delay: Option<Duration>) {
        *self.dial_delay.lock() = delay;
    }

    /// Attempts, failed ones included.
    pub fn dial_count(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }

    pub fn handles(&self) -> Vec<Arc<FakeRuntime>> {
        self.handles.lock().clone()
    }

    pub fn last_handle(&self) -> Option<Arc<FakeRuntime>> {
        self.handles.lock().last().cloned()
    }

    pub fn handle_for(&self, ip: &str) -> Option<Arc<FakeRuntime>> {
        let prefix = format!("{ip}:");
        self.handles
            .lock()
            .iter()
            .rev()
            .find(|h| h.endpoint().starts_with(&prefix))
            .cloned()
    }
}

#[async_trait]
impl RuntimeConnector for FakeConnector {
    async fn connect(&self, ip: &str, port: u16) -> Result<Arc<dyn RuntimeHandle>, RuntimeError> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        let delay = *self.dial_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let endpoint = format!("{ip}:{port}");
        if self.fail.load(Ordering::SeqCst) {
            return Err(RuntimeError::Connect {
                endpoint,
                message: "connection refused".into(),
            });
        }

        let runtime = Arc::new(FakeRuntime::new(endpoint));
        self.handles.lock().push(runtime.clone());
        Ok(runtime)
    }
}
