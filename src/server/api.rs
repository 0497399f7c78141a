use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::{Value, json};
use tokio::sync::Mutex;

use crate::config::Config;
use crate::github::GitHubApi;
use crate::oauth::GatewayClient;
use crate::project;
use crate::session::{self, Session};
use crate::submit::{self, scaffold::Scaffolder};

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub config: Config,
    pub session: Mutex<Session>,
    pub gateway: GatewayClient,
    pub github: Arc<dyn GitHubApi>,
    pub scaffolder: Arc<dyn Scaffolder>,
    pub notebook_dir: Option<PathBuf>,
}

pub type SharedState = Arc<AppState>;

// ── Error handling ────────────────────────────────────────────────────

pub enum ApiError {
    NotFound(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(json!({"error": message}))).into_response()
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/status", get(status))
        .route("/version", get(version))
        .route("/config", get(config_dump))
        .route("/config/{key}", get(config_item))
        .route("/submit", post(submit_code))
        .route("/auth/authorize", get(auth_authorize))
        .route("/auth/token", post(auth_token))
        .route("/auth/authenticated", get(auth_authenticated))
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn status() -> Json<Value> {
    Json(json!({"status": "OK"}))
}

/// Versions of this extension, the scaffolding framework, and the detected
/// project; the latter two are null when unknown.
async fn version(State(state): State<SharedState>) -> Json<Value> {
    let project = project::resolve(
        &state.config.project_config_path,
        state.notebook_dir.as_deref(),
    )
    .ok();
    Json(json!({
        "extension": env!("CARGO_PKG_VERSION"),
        "framework": project.as_ref().and_then(|p| p.framework_version.clone()),
        "project": project.as_ref().and_then(|p| p.version.clone()),
    }))
}

async fn config_dump(State(state): State<SharedState>) -> Json<Value> {
    let mut dump = serde_json::Map::new();
    for (key, value) in state.config.entries() {
        dump.insert(key.to_string(), value);
    }
    Json(Value::Object(dump))
}

async fn config_item(
    State(state): State<SharedState>,
    Path(key): Path<String>,
) -> Result<Json<Value>, ApiError> {
    match state.config.get(&key) {
        Some(value) => Ok(Json(json!({ key: value }))),
        None => Err(ApiError::NotFound(format!(
            "Unrecognized configuration option: {key}"
        ))),
    }
}

/// The submit endpoint always answers 200 with a `SubmissionResult` body;
/// every failure mode is inside the result, never an HTTP error.
async fn submit_code(
    State(state): State<SharedState>,
    Json(input): Json<Value>,
) -> Json<submit::SubmissionResult> {
    let result = submit::create_pull_request_for_code_content(
        &state.config,
        &state.session,
        state.github.as_ref(),
        state.scaffolder.clone(),
        state.notebook_dir.as_deref(),
        input,
    )
    .await;
    Json(result)
}

/// Redirect the browser to GitHub's authorize endpoint, warming the gateway
/// on the way so its first token exchange does not hit a cold start.
async fn auth_authorize(State(state): State<SharedState>) -> Result<Response, ApiError> {
    state.gateway.warm();

    let nonce = state.session.lock().await.state();
    let url = state
        .gateway
        .authorize_url(&nonce)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok((StatusCode::FOUND, [(header::LOCATION, url)]).into_response())
}

/// Drive the token polling loop to completion. The session nonce is cleared
/// on every exit path; a new attempt starts the state machine over.
async fn auth_token(State(state): State<SharedState>) -> Response {
    let nonce = state.session.lock().await.state();
    let outcome = state.gateway.poll_access_token(&nonce).await;

    let mut session = state.session.lock().await;
    session.reset_state();
    match outcome {
        Ok(token) => {
            session.set_access_token(token);
            StatusCode::OK.into_response()
        }
        // Timeout and gateway-reported failures both answer 400; the reason
        // string distinguishes them ("timeout" vs. the gateway's message).
        Err(e) => (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    }
}

async fn auth_authenticated(State(state): State<SharedState>) -> Json<Value> {
    let authenticated = session::is_authenticated(&state.session, state.github.as_ref()).await;
    Json(json!({"result": authenticated, "message": null}))
}
