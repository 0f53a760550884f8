//! In-memory stand-in for the Incus REST API.
//!
//! Implements the handful of `/1.0` endpoints the client is exercised
//! against. Background operations complete as soon as they are created, so
//! `operations/{id}/wait` answers immediately with the finished operation.

use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::{
    net::{TcpListener, UnixListener},
    sync::RwLock,
};
use uuid::Uuid;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Instance {
    pub name: String,
    pub status: String,
    pub status_code: u64,
    #[serde(default)]
    pub config: Map<String, Value>,
    #[serde(default)]
    pub devices: Map<String, Value>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Operation {
    pub id: Uuid,
    pub class: String,
    pub description: String,
    pub status: String,
    pub status_code: u64,
    pub err: String,
    pub may_cancel: bool,
    pub resources: HashMap<String, Vec<String>>,
    pub metadata: Option<Value>,
}

#[derive(Deserialize)]
pub struct CreateInstance {
    pub name: String,
    #[serde(default)]
    pub source: Option<Value>,
    #[serde(default)]
    pub start: bool,
    #[serde(default)]
    pub config: Map<String, Value>,
}

#[derive(Deserialize)]
pub struct StateChange {
    pub action: String,
}

#[derive(Deserialize)]
pub struct ExecRequest {
    pub command: Vec<String>,
    #[serde(default, rename = "record-output")]
    pub record_output: bool,
}

#[derive(Default)]
pub struct MockState {
    pub instances: HashMap<String, Instance>,
    pub operations: HashMap<Uuid, Operation>,
    /// Recorded exec output, keyed by instance then file name.
    pub logs: HashMap<String, HashMap<String, String>>,
}

pub type Db = Arc<RwLock<MockState>>;

pub fn app() -> Router {
    app_with_state(Arc::new(RwLock::new(MockState::default())))
}

pub fn app_with_state(db: Db) -> Router {
    Router::new()
        .route("/1.0", get(server_info))
        .route("/1.0/instances", get(list_instances).post(create_instance))
        .route(
            "/1.0/instances/{name}",
            get(get_instance).patch(patch_instance).delete(delete_instance),
        )
        .route("/1.0/instances/{name}/state", put(change_state))
        .route("/1.0/instances/{name}/exec", post(exec_instance))
        .route(
            "/1.0/instances/{name}/logs/exec-output/{file}",
            get(get_exec_output).delete(delete_exec_output),
        )
        .route("/1.0/operations/{id}", get(get_operation))
        .route("/1.0/operations/{id}/wait", get(wait_operation))
        .fallback(|| async { error(StatusCode::NOT_FOUND, "not found") })
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

pub async fn run_unix(listener: UnixListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

// ---------------------------------------------------------------------------
// Envelopes
// ---------------------------------------------------------------------------

fn sync(metadata: Value) -> Response {
    (
        StatusCode::OK,
        Json(json!({
            "type": "sync",
            "status": "Success",
            "status_code": 200,
            "operation": "",
            "error_code": 0,
            "error": "",
            "metadata": metadata,
        })),
    )
        .into_response()
}

fn background(op: &Operation) -> Response {
    let mut running = op.clone();
    running.status = "Running".to_string();
    running.status_code = 103;
    running.err = String::new();
    (
        StatusCode::ACCEPTED,
        Json(json!({
            "type": "async",
            "status": "Operation created",
            "status_code": 100,
            "operation": format!("/1.0/operations/{}", op.id),
            "error_code": 0,
            "error": "",
            "metadata": running,
        })),
    )
        .into_response()
}

fn error(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(json!({
            "type": "error",
            "status": "",
            "status_code": 0,
            "operation": "",
            "error_code": status.as_u16(),
            "error": message,
            "metadata": null,
        })),
    )
        .into_response()
}

fn finished(description: &str, instance: &str, failure: Option<&str>) -> Operation {
    let (status, status_code, err) = match failure {
        Some(err) => ("Failure", 400, err.to_string()),
        None => ("Success", 200, String::new()),
    };
    Operation {
        id: Uuid::new_v4(),
        class: "task".to_string(),
        description: description.to_string(),
        status: status.to_string(),
        status_code,
        err,
        may_cancel: false,
        resources: HashMap::from([(
            "instances".to_string(),
            vec![format!("/1.0/instances/{instance}")],
        )]),
        metadata: None,
    }
}

fn store(state: &mut MockState, op: Operation) -> Response {
    tracing::debug!(id = %op.id, description = %op.description, status = %op.status, "operation recorded");
    let response = background(&op);
    state.operations.insert(op.id, op);
    response
}

async fn record(db: &Db, op: Operation) -> Response {
    let mut state = db.write().await;
    store(&mut *state, op)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn server_info() -> Response {
    sync(json!({
        "api_version": "1.0",
        "api_status": "stable",
        "auth": "trusted",
        "api_extensions": [],
    }))
}

async fn list_instances(
    State(db): State<Db>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let state = db.read().await;
    let recursive = params.get("recursion").is_some_and(|r| r != "0");
    let mut names: Vec<&String> = state.instances.keys().collect();
    names.sort();
    let metadata = if recursive {
        json!(names.iter().map(|n| &state.instances[*n]).collect::<Vec<_>>())
    } else {
        json!(names
            .iter()
            .map(|n| format!("/1.0/instances/{n}"))
            .collect::<Vec<_>>())
    };
    sync(metadata)
}

async fn create_instance(State(db): State<Db>, Json(input): Json<CreateInstance>) -> Response {
    {
        let mut state = db.write().await;
        if state.instances.contains_key(&input.name) {
            tracing::info!(name = %input.name, "instance already exists");
            return error(StatusCode::CONFLICT, "Instance already exists");
        }
        let (status, status_code) = if input.start {
            ("Running", 103)
        } else {
            ("Stopped", 102)
        };
        let mut config = input.config;
        if let Some(alias) = input.source.as_ref().and_then(|s| s.get("alias")) {
            config.insert("image.alias".to_string(), alias.clone());
        }
        state.instances.insert(
            input.name.clone(),
            Instance {
                name: input.name.clone(),
                status: status.to_string(),
                status_code,
                config,
                devices: Map::new(),
            },
        );
    }
    record(&db, finished("Creating instance", &input.name, None)).await
}

async fn get_instance(State(db): State<Db>, Path(name): Path<String>) -> Response {
    let state = db.read().await;
    match state.instances.get(&name) {
        Some(instance) => sync(json!(instance)),
        None => error(StatusCode::NOT_FOUND, "Instance not found"),
    }
}

async fn patch_instance(
    State(db): State<Db>,
    Path(name): Path<String>,
    Json(patch): Json<Value>,
) -> Response {
    let mut state = db.write().await;
    let Some(instance) = state.instances.get_mut(&name) else {
        return error(StatusCode::NOT_FOUND, "Instance not found");
    };
    if let Some(config) = patch.get("config").and_then(Value::as_object) {
        instance.config.extend(config.clone());
    }
    if let Some(devices) = patch.get("devices").and_then(Value::as_object) {
        instance.devices.extend(devices.clone());
    }
    sync(json!({}))
}

async fn change_state(
    State(db): State<Db>,
    Path(name): Path<String>,
    Json(change): Json<StateChange>,
) -> Response {
    let mut state = db.write().await;
    if !state.instances.contains_key(&name) {
        return error(StatusCode::NOT_FOUND, "Instance not found");
    }
    let description = format!("Running {} action", change.action);
    let (status, status_code) = match change.action.as_str() {
        "start" | "restart" | "unfreeze" => ("Running", 103),
        "stop" => ("Stopped", 102),
        "freeze" => ("Frozen", 110),
        "fail" => {
            let op = finished(&description, &name, Some("action failed"));
            return store(&mut *state, op);
        }
        other => {
            tracing::info!(%name, action = other, "unknown state action");
            return error(StatusCode::BAD_REQUEST, &format!("Unknown action {other}"));
        }
    };
    if let Some(instance) = state.instances.get_mut(&name) {
        instance.status = status.to_string();
        instance.status_code = status_code;
    }
    store(&mut *state, finished(&description, &name, None))
}

async fn delete_instance(State(db): State<Db>, Path(name): Path<String>) -> Response {
    if db.write().await.instances.remove(&name).is_none() {
        return error(StatusCode::NOT_FOUND, "Instance not found");
    }
    record(&db, finished("Deleting instance", &name, None)).await
}

async fn exec_instance(
    State(db): State<Db>,
    Path(name): Path<String>,
    Json(exec): Json<ExecRequest>,
) -> Response {
    let mut state = db.write().await;
    if !state.instances.contains_key(&name) {
        return error(StatusCode::NOT_FOUND, "Instance not found");
    }
    let mut op = finished("Executing command", &name, None);
    if exec.record_output {
        let stdout = format!("exec_{}.stdout", op.id);
        let stderr = format!("exec_{}.stderr", op.id);
        let logs = state.logs.entry(name.clone()).or_default();
        logs.insert(stdout.clone(), format!("{}\n", exec.command.join(" ")));
        logs.insert(stderr.clone(), String::new());
        op.metadata = Some(json!({
            "return": 0,
            "output": {
                "1": format!("/1.0/instances/{name}/logs/exec-output/{stdout}"),
                "2": format!("/1.0/instances/{name}/logs/exec-output/{stderr}"),
            },
        }));
    } else {
        op.metadata = Some(json!({ "return": 0 }));
    }
    store(&mut *state, op)
}

async fn get_exec_output(
    State(db): State<Db>,
    Path((name, file)): Path<(String, String)>,
) -> Response {
    let state = db.read().await;
    match state.logs.get(&name).and_then(|logs| logs.get(&file)) {
        Some(content) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/octet-stream")],
            content.clone(),
        )
            .into_response(),
        None => error(StatusCode::NOT_FOUND, "Log file not found"),
    }
}

async fn delete_exec_output(
    State(db): State<Db>,
    Path((name, file)): Path<(String, String)>,
) -> Response {
    let mut state = db.write().await;
    match state.logs.get_mut(&name).and_then(|logs| logs.remove(&file)) {
        Some(_) => sync(json!({})),
        None => error(StatusCode::NOT_FOUND, "Log file not found"),
    }
}

async fn find_operation(db: &Db, id: &str) -> Option<Operation> {
    let id = Uuid::parse_str(id).ok()?;
    db.read().await.operations.get(&id).cloned()
}

async fn get_operation(State(db): State<Db>, Path(id): Path<String>) -> Response {
    match find_operation(&db, &id).await {
        Some(op) => sync(json!(op)),
        None => error(StatusCode::NOT_FOUND, "Operation not found"),
    }
}

async fn wait_operation(
    State(db): State<Db>,
    Path(id): Path<String>,
    Query(_params): Query<HashMap<String, String>>,
) -> Response {
    get_operation(State(db), Path(id)).await
}
