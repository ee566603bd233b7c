//! Thin REST adapter over the orchestrator.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;

use crate::errors::OrchestratorError;
use crate::orchestrator::{DeploySpec, Orchestrator};
use crate::project::ProjectSnapshot;

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
}

pub type SharedState = Arc<AppState>;

// ── Request payload types ─────────────────────────────────────────────

#[derive(Deserialize)]
pub struct DeployRequest {
    pub name: String,
    pub repo_url: String,
    pub build_command: String,
    pub start_command: String,
}

/// GitHub-style push webhook: only the repository URL is consulted.
#[derive(Deserialize)]
pub struct WebhookPayload {
    pub repository: WebhookRepository,
}

#[derive(Deserialize)]
pub struct WebhookRepository {
    pub html_url: String,
}

// ── Error handling ────────────────────────────────────────────────────

pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

impl From<OrchestratorError> for ApiError {
    fn from(err: OrchestratorError) -> Self {
        let message = err.to_string();
        match err {
            OrchestratorError::DuplicateName { .. } => ApiError::Conflict(message),
            OrchestratorError::ProjectNotFound { .. } | OrchestratorError::RepoNotFound { .. } => {
                ApiError::NotFound(message)
            }
            _ => ApiError::Internal(message),
        }
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/api/projects", get(list_projects).post(create_project))
        .route(
            "/api/projects/{name}",
            get(get_project).delete(delete_project),
        )
        .route("/webhook", post(webhook))
        .route("/health", get(health_check))
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

async fn list_projects(State(state): State<SharedState>) -> Json<Vec<ProjectSnapshot>> {
    Json(state.orchestrator.list_projects())
}

async fn create_project(
    State(state): State<SharedState>,
    Json(req): Json<DeployRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_name(&req.name)?;
    state.orchestrator.create_and_deploy(DeploySpec {
        name: req.name.clone(),
        repo_url: req.repo_url,
        build_command: req.build_command,
        start_command: req.start_command,
    })?;
    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({"name": req.name, "state": "pending"})),
    ))
}

async fn get_project(
    State(state): State<SharedState>,
    Path(name): Path<String>,
) -> Result<Json<ProjectSnapshot>, ApiError> {
    state
        .orchestrator
        .get_project(&name)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Project {} not found", name)))
}

async fn delete_project(
    State(state): State<SharedState>,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.orchestrator.delete_project(&name).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn webhook(
    State(state): State<SharedState>,
    Json(payload): Json<WebhookPayload>,
) -> Result<impl IntoResponse, ApiError> {
    state.orchestrator.trigger_update(&payload.repository.html_url)?;
    Ok("Webhook received and update triggered.")
}

/// Project names become directory names under the deployments dir; reject
/// anything that could escape it or confuse the shell.
fn validate_name(name: &str) -> Result<(), ApiError> {
    if name.is_empty() {
        return Err(ApiError::BadRequest("Project name must not be empty".to_string()));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        || name.starts_with('.')
    {
        return Err(ApiError::BadRequest(format!(
            "Invalid project name '{}': use letters, digits, '-', '_' or '.'",
            name
        )));
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────
