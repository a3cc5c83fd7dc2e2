/*!
KERNEL HTTP API

Every route answers HTTP 200 with an `ApiResponse` envelope; failures are
carried by `errorCode` (see `models`). Handlers only resolve the target and
pick the pool policy:
- listing routes and create dial lazily (`pool.add`)
- start/stop/remove/inspect/logs need an already pooled connection
  (`pool.get`) and never contact a runtime otherwise

Routes:
- `GET  /health`, `GET /system/health`
- `GET  /hosts/list`, `GET /hosts/{ip}`
- `GET  /containers/list?ip&port`, `GET /images/list?ip&port`
- `POST /containers/{ip}/{port}/create`
- `POST /containers/{ip}/{id}/start|stop|remove|logs`, `GET /containers/{ip}/{id}/inspect`
- `POST /pool/{ip}/reconnect?port`, `DELETE /pool/{ip}`
*/

use crate::containers::dispatch;
use crate::containers::ContainerRequest;
use crate::models::{ApiError, ApiResponse};
use crate::state::AppState;
use axum::body::Bytes;
use axum::extract::{Path, Query, Request, State};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use dockfleet_common::directory::DirectoryError;
use dockfleet_common::runtime::LogOptions;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info_span, warn, Instrument};
use uuid::Uuid;

type ApiResult<T> = Result<T, ApiError>;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        Json(ApiResponse::from(self)).into_response()
    }
}

fn reply<T: Serialize>(data: T) -> ApiResult<Json<ApiResponse>> {
    Ok(Json(ApiResponse::ok(data)))
}

fn reply_empty() -> ApiResult<Json<ApiResponse>> {
    Ok(Json(ApiResponse::empty()))
}

async fn trace_request(req: Request, next: Next) -> Response {
    let span = info_span!(
        "request",
        id = %Uuid::new_v4(),
        method = %req.method(),
        path = %req.uri().path(),
    );
    let started = Instant::now();
    let resp = next.run(req).instrument(span.clone()).await;
    span.in_scope(|| debug!(elapsed_ms = started.elapsed().as_millis() as u64, "request handled"));
    resp
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/system/health", get(get_system_health))
        .route("/hosts/list", get(list_hosts))
        .route("/hosts/{ip}", get(get_host))
        .route("/containers/list", get(list_containers))
        .route("/images/list", get(list_images))
        .route("/containers/{ip}/{target}/create", post(create_container))
        .route("/containers/{ip}/{target}/start", post(start_container))
        .route("/containers/{ip}/{target}/stop", post(stop_container))
        .route("/containers/{ip}/{target}/remove", post(remove_container))
        .route("/containers/{ip}/{target}/inspect", get(inspect_container))
        .route("/containers/{ip}/{target}/logs", post(container_logs))
        .route("/pool/{ip}/reconnect", post(reconnect_host))
        .route("/pool/{ip}", delete(drop_host))
        .with_state(app_state)
        .layer(middleware::from_fn(trace_request))
}

fn parse_port(raw: Option<&str>) -> ApiResult<u16> {
    raw.and_then(|p| p.trim().parse::<u16>().ok())
        .filter(|p| *p > 0)
        .ok_or_else(|| ApiError::BadRequest("param error, host ip and a valid port are required".into()))
}

#[derive(Debug, Deserialize)]
struct TargetParams {
    ip: Option<String>,
    port: Option<String>,
}

impl TargetParams {
    fn resolve(self) -> ApiResult<(String, u16)> {
        let ip = self
            .ip
            .filter(|ip| !ip.trim().is_empty())
            .ok_or_else(|| ApiError::BadRequest("param error, host ip and a valid port are required".into()))?;
        let port = parse_port(self.port.as_deref())?;
        Ok((ip, port))
    }
}

fn track_directory<T>(app: &AppState, result: Result<T, DirectoryError>) -> ApiResult<T> {
    match &result {
        Ok(_) => app.health.mark_directory_ok(),
        Err(e) if e.is_timeout() => app.health.mark_directory_timeout(),
        Err(_) => app.health.mark_directory_error(),
    }
    Ok(result?)
}

// GET /health
async fn get_health() -> ApiResult<Json<ApiResponse>> {
    reply("ok")
}

// GET /system/health
async fn get_system_health(State(app): State<AppState>) -> ApiResult<Json<ApiResponse>> {
    let hosts = app.pool.ips().await;
    reply(app.health.get_health(hosts))
}

// GET /hosts/list
async fn list_hosts(State(app): State<AppState>) -> ApiResult<Json<ApiResponse>> {
    let timeout = app.cfg.directory.read_timeout();
    let result = app.directory.list_all(timeout).await;
    reply(track_directory(&app, result)?)
}

// GET /hosts/{ip}
async fn get_host(State(app): State<AppState>, Path(ip): Path<String>) -> ApiResult<Json<ApiResponse>> {
    let timeout = app.cfg.directory.read_timeout();
    let result = app.directory.get_by_ip(&ip, timeout).await;
    let host = track_directory(&app, result)?.ok_or(ApiError::HostNotFound(ip))?;
    reply(host)
}

// GET /containers/list?ip&port
async fn list_containers(
    State(app): State<AppState>,
    Query(params): Query<TargetParams>,
) -> ApiResult<Json<ApiResponse>> {
    let (ip, port) = params.resolve()?;
    let handle = app.pool.add(&ip, port).await?;
    reply(dispatch::list(handle.as_ref()).await?)
}

// GET /images/list?ip&port
async fn list_images(
    State(app): State<AppState>,
    Query(params): Query<TargetParams>,
) -> ApiResult<Json<ApiResponse>> {
    let (ip, port) = params.resolve()?;
    let handle = app.pool.add(&ip, port).await?;
    reply(dispatch::list_images(handle.as_ref()).await?)
}

/// Script written by the host agent before the container is created
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EntrypointRequest {
    working_dir: String,
    #[serde(default)]
    commands: Vec<String>,
    rpc_port: Option<u16>,
}

#[derive(Debug, Deserialize)]
struct CreateBody {
    container: ContainerRequest,
    entrypoint: Option<EntrypointRequest>,
}

#[derive(Debug, Serialize)]
struct Created {
    id: String,
}

/// Explicit port first, then the port the host advertises, then the default.
async fn resolve_rpc_port(app: &AppState, ip: &str, explicit: Option<u16>) -> u16 {
    if let Some(port) = explicit {
        return port;
    }
    match app.directory.get_by_ip(ip, app.cfg.directory.read_timeout()).await {
        Ok(Some(host)) if host.info.grpc_port > 0 => host.info.grpc_port,
        Ok(_) => app.cfg.provision.default_rpc_port,
        Err(e) => {
            debug!(ip = %ip, error = %e, "rpc port lookup failed, using default");
            app.cfg.provision.default_rpc_port
        }
    }
}

// POST /containers/{ip}/{port}/create
async fn create_container(
    State(app): State<AppState>,
    Path((ip, port)): Path<(String, String)>,
    body: Bytes,
) -> ApiResult<Json<ApiResponse>> {
    let port = parse_port(Some(&port))?;
    let body: CreateBody = serde_json::from_slice(&body).map_err(|e| {
        warn!(op = "create", ip = %ip, error = %e, "unreadable create request");
        ApiError::BadRequest("request data error".into())
    })?;
    let spec = body.container.validate()?;

    let handle = app.pool.add(&ip, port).await?;

    if let Some(entry) = body.entrypoint {
        let rpc_port = resolve_rpc_port(&app, &ip, entry.rpc_port).await;
        if let Err(e) = app
            .provisioner
            .provision(&ip, rpc_port, &entry.working_dir, &entry.commands)
            .await
        {
            warn!(op = "provision", ip = %ip, rpc_port, error = %e, "entry point provisioning failed");
            return Err(e.into());
        }
    }

    let id = dispatch::create(handle.as_ref(), &spec).await?;
    reply(Created { id })
}

// POST /containers/{ip}/{id}/start
async fn start_container(
    State(app): State<AppState>,
    Path((ip, id)): Path<(String, String)>,
) -> ApiResult<Json<ApiResponse>> {
    let handle = app.pool.get(&ip).await?;
    dispatch::start(handle.as_ref(), &id).await?;
    reply_empty()
}

// POST /containers/{ip}/{id}/stop
async fn stop_container(
    State(app): State<AppState>,
    Path((ip, id)): Path<(String, String)>,
) -> ApiResult<Json<ApiResponse>> {
    let handle = app.pool.get(&ip).await?;
    dispatch::stop(handle.as_ref(), &id).await?;
    reply_empty()
}

// POST /containers/{ip}/{id}/remove
async fn remove_container(
    State(app): State<AppState>,
    Path((ip, id)): Path<(String, String)>,
) -> ApiResult<Json<ApiResponse>> {
    let handle = app.pool.get(&ip).await?;
    dispatch::remove(handle.as_ref(), &id).await?;
    reply_empty()
}

// GET /containers/{ip}/{id}/inspect
async fn inspect_container(
    State(app): State<AppState>,
    Path((ip, id)): Path<(String, String)>,
) -> ApiResult<Json<ApiResponse>> {
    let handle = app.pool.get(&ip).await?;
    reply(dispatch::inspect(handle.as_ref(), &id).await?)
}

// POST /containers/{ip}/{id}/logs
async fn container_logs(
    State(app): State<AppState>,
    Path((ip, id)): Path<(String, String)>,
    body: Bytes,
) -> ApiResult<Json<ApiResponse>> {
    let options = if body.is_empty() {
        LogOptions { show_stdout: true, show_stderr: true, ..Default::default() }
    } else {
        serde_json::from_slice::<LogOptions>(&body).map_err(|e| {
            warn!(op = "logs", container = %id, error = %e, "unreadable log options");
            ApiError::BadRequest("request container log options error".into())
        })?
    };
    let handle = app.pool.get(&ip).await?;
    reply(dispatch::fetch_logs(handle.as_ref(), &id, &options).await?)
}

#[derive(Debug, Deserialize)]
struct ReconnectParams {
    port: Option<String>,
}

// POST /pool/{ip}/reconnect?port
async fn reconnect_host(
    State(app): State<AppState>,
    Path(ip): Path<String>,
    Query(params): Query<ReconnectParams>,
) -> ApiResult<Json<ApiResponse>> {
    let port = match params.port.as_deref() {
        Some(raw) => parse_port(Some(raw))?,
        None => app.cfg.runtime.default_port,
    };
    app.pool.reconnect(&ip, port).await?;
    reply_empty()
}

#[derive(Debug, Serialize)]
struct Removed {
    removed: bool,
}

// DELETE /pool/{ip}
async fn drop_host(State(app): State<AppState>, Path(ip): Path<String>) -> ApiResult<Json<ApiResponse>> {
    let removed = app.pool.remove(&ip).await;
    reply(Removed { removed })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KernelConfig;
    use crate::pool::PoolRegistry;
    use axum::body::Body;
    use axum::http::{Method, Request as HttpRequest, StatusCode};
    use dockfleet_common::provision::wire::{read_frame, write_frame};
    use dockfleet_common::provision::{ScriptRequest, ScriptResponse};
    use dockfleet_devkit::TestHarness;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    fn app(harness: &TestHarness) -> (AppState, Router) {
        let mut cfg = KernelConfig::default();
        cfg.directory.read_timeout_ms = 200;
        cfg.provision.timeout_ms = 2_000;
        let pool = Arc::new(PoolRegistry::new(harness.connector.clone()));
        let state = AppState::new(harness.directory.clone(), pool, cfg);
        (state.clone(), build_router(state))
    }

    async fn call(router: &Router, method: Method, uri: &str, body: Option<Value>) -> Value {
        let body = match body {
            Some(v) => Body::from(serde_json::to_vec(&v).unwrap()),
            None => Body::empty(),
        };
        let req = HttpRequest::builder().method(method).uri(uri).body(body).unwrap();
        let resp = router.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn container_body() -> Value {
        json!({
            "container": {
                "containerName": "web",
                "containerPorts": ["80"],
                "hostPorts": ["8080"],
                "imageName": "nginx",
                "maxCpu": "0.5",
                "maxMem": "1"
            }
        })
    }

    #[tokio::test]
    async fn liveness_uses_the_envelope() {
        let harness = TestHarness::new();
        let (_, router) = app(&harness);
        let resp = call(&router, Method::GET, "/health", None).await;
        assert_eq!(resp, json!({"errorCode": 0, "data": "ok"}));
    }

    #[tokio::test]
    async fn hosts_list_reports_ages() {
        let harness = TestHarness::at(1_030);
        harness.publish_host("10.0.0.5", 1_000).await.unwrap();
        let (_, router) = app(&harness);

        let resp = call(&router, Method::GET, "/hosts/list", None).await;
        assert_eq!(resp["errorCode"], 0);
        assert_eq!(resp["data"][0]["ip"], "10.0.0.5");
        assert_eq!(resp["data"][0]["ageSecs"], 30);
    }

    #[tokio::test]
    async fn unknown_host_is_not_found() {
        let harness = TestHarness::new();
        let (_, router) = app(&harness);
        let resp = call(&router, Method::GET, "/hosts/10.9.9.9", None).await;
        assert_eq!(resp["errorCode"], 4);
    }

    #[tokio::test]
    async fn slow_directory_is_a_timeout_code() {
        let harness = TestHarness::new();
        harness.store.set_delay(Some(Duration::from_secs(5)));
        let (state, router) = app(&harness);

        let resp = call(&router, Method::GET, "/hosts/list", None).await;
        assert_eq!(resp["errorCode"], 100);
        assert_eq!(state.health.directory_status(), "timeout");
    }

    #[tokio::test]
    async fn stop_without_pool_entry_never_dials() {
        let harness = TestHarness::new();
        let (_, router) = app(&harness);

        let resp = call(&router, Method::POST, "/containers/10.0.0.9/abc/stop", None).await;
        assert_eq!(resp["errorCode"], 4);
        assert_eq!(harness.connector.dial_count(), 0);
    }

    #[tokio::test]
    async fn list_dials_lazily_then_reuses() {
        let harness = TestHarness::new();
        let (_, router) = app(&harness);

        for _ in 0..2 {
            let resp = call(&router, Method::GET, "/containers/list?ip=10.0.0.1&port=2375", None).await;
            assert_eq!(resp["errorCode"], 0);
        }
        assert_eq!(harness.connector.dial_count(), 1);
    }

    #[tokio::test]
    async fn list_without_port_is_a_param_error() {
        let harness = TestHarness::new();
        let (_, router) = app(&harness);
        let resp = call(&router, Method::GET, "/images/list?ip=10.0.0.1", None).await;
        assert_eq!(resp["errorCode"], 1);
        assert_eq!(harness.connector.dial_count(), 0);
    }

    #[tokio::test]
    async fn invalid_request_fails_before_dialing() {
        let harness = TestHarness::new();
        let (_, router) = app(&harness);
        let mut body = container_body();
        body["container"]["hostPorts"] = json!([]);

        let resp = call(&router, Method::POST, "/containers/10.0.0.1/2375/create", Some(body)).await;
        assert_eq!(resp["errorCode"], 1);
        assert!(resp["data"].as_str().unwrap().contains("does not match"));
        assert_eq!(harness.connector.dial_count(), 0);
    }

    #[tokio::test]
    async fn dial_failure_is_a_connection_code() {
        let harness = TestHarness::new();
        harness.connector.fail_dials(true);
        let (_, router) = app(&harness);

        let resp = call(&router, Method::POST, "/containers/10.0.0.1/2375/create", Some(container_body())).await;
        assert_eq!(resp["errorCode"], 2);
    }

    #[tokio::test]
    async fn create_then_lifecycle_on_pooled_host() {
        let harness = TestHarness::new();
        let (_, router) = app(&harness);

        let resp = call(&router, Method::POST, "/containers/10.0.0.1/2375/create", Some(container_body())).await;
        assert_eq!(resp["errorCode"], 0);
        let id = resp["data"]["id"].as_str().unwrap().to_string();

        let resp = call(&router, Method::POST, &format!("/containers/10.0.0.1/{id}/start"), None).await;
        assert_eq!(resp["errorCode"], 0);
        let resp = call(&router, Method::POST, &format!("/containers/10.0.0.1/{id}/remove"), None).await;
        assert_eq!(resp["errorCode"], 0);

        let rt = harness.connector.handle_for("10.0.0.1").unwrap();
        assert_eq!(
            rt.calls(),
            vec!["create:web".to_string(), format!("start:{id}"), format!("stop:{id}"), format!("remove:{id}")]
        );
    }

    #[tokio::test]
    async fn runtime_failure_is_a_call_code() {
        let harness = TestHarness::new();
        let (_, router) = app(&harness);
        call(&router, Method::GET, "/containers/list?ip=10.0.0.1&port=2375", None).await;
        harness.connector.last_handle().unwrap().fail_on("start");

        let resp = call(&router, Method::POST, "/containers/10.0.0.1/c1/start", None).await;
        assert_eq!(resp["errorCode"], 3);
        assert_eq!(resp["data"], "start container error");
    }

    #[tokio::test]
    async fn logs_come_back_as_lines() {
        let harness = TestHarness::new();
        let (_, router) = app(&harness);
        call(&router, Method::GET, "/containers/list?ip=10.0.0.1&port=2375", None).await;
        harness.connector.last_handle().unwrap().set_logs("one\r\ntwo");

        let resp = call(
            &router,
            Method::POST,
            "/containers/10.0.0.1/c1/logs",
            Some(json!({"showStdout": true, "tail": "10"})),
        )
        .await;
        assert_eq!(resp["data"], json!(["one", "two"]));
    }

    #[tokio::test]
    async fn pool_routes_reconnect_and_drop() {
        let harness = TestHarness::new();
        let (state, router) = app(&harness);

        let resp = call(&router, Method::POST, "/pool/10.0.0.1/reconnect?port=2376", None).await;
        assert_eq!(resp["errorCode"], 0);
        assert_eq!(state.pool.len().await, 1);

        let resp = call(&router, Method::DELETE, "/pool/10.0.0.1", None).await;
        assert_eq!(resp["data"]["removed"], true);
        let resp = call(&router, Method::DELETE, "/pool/10.0.0.1", None).await;
        assert_eq!(resp["data"]["removed"], false);
    }

    #[tokio::test]
    async fn create_provisions_entry_point_first() {
        let harness = TestHarness::new();
        let (_, router) = app(&harness);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let rpc_port = listener.local_addr().unwrap().port();
        let agent = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let req: ScriptRequest = read_frame(&mut socket).await.unwrap();
            write_frame(&mut socket, &ScriptResponse::ok()).await.unwrap();
            req
        });

        let mut body = container_body();
        body["entrypoint"] = json!({"workingDir": "/srv/web", "commands": ["./serve"], "rpcPort": rpc_port});
        let resp = call(&router, Method::POST, "/containers/127.0.0.1/2375/create", Some(body)).await;
        assert_eq!(resp["errorCode"], 0);

        let seen = agent.await.unwrap();
        assert_eq!(seen.working_dir, "/srv/web");
        assert_eq!(seen.commands, vec!["./serve"]);
    }

    #[tokio::test]
    async fn failed_provisioning_skips_create() {
        let harness = TestHarness::new();
        let (_, router) = app(&harness);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let rpc_port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let _: ScriptRequest = read_frame(&mut socket).await.unwrap();
            write_frame(&mut socket, &ScriptResponse::failed("permission denied")).await.unwrap();
        });

        let mut body = container_body();
        body["entrypoint"] = json!({"workingDir": "/srv/web", "commands": [], "rpcPort": rpc_port});
        let resp = call(&router, Method::POST, "/containers/127.0.0.1/2375/create", Some(body)).await;
        assert_eq!(resp["errorCode"], 5);

        let rt = harness.connector.handle_for("127.0.0.1").unwrap();
        assert!(rt.calls().is_empty());
    }
}
