//! HTTP surface of the migration engine
//!
//! A thin axum adapter: every handler validates its input, calls into
//! [`MigrationEngine`] and serializes the outcome as JSON.

use axum::{
    extract::{Path as UrlPath, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::{error, info};

use crate::migration::backup::DEFAULT_RETENTION_DAYS;
use crate::migration::{
    BackupFilter, CleanupSummary, HealthReport, LegacyWorkspaceData, MigrationBackup,
    MigrationEngine, MigrationError, MigrationRecord, MigrationRequest, MigrationResult,
    MigrationStats, ReportFormat, ReportRequest, RollbackRequest, RollbackResult,
    ValidationReport,
};

/// Upper bound for `?limit=` on the history endpoint
const MAX_HISTORY_LIMIT: usize = 1000;

#[derive(Debug, Clone)]
pub struct AppState {
    pub engine: MigrationEngine,
}

/// Error body returned by every failing endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl From<MigrationError> for ApiError {
    fn from(err: MigrationError) -> Self {
        let message = err.to_string();
        match err {
            MigrationError::InvalidRequest(_) => ApiError::BadRequest(message),
            MigrationError::SourceNotFound(_) | MigrationError::BackupNotFound(_) => {
                ApiError::NotFound(message)
            }
            MigrationError::WorkspaceMismatch { .. } => ApiError::Conflict(message),
            MigrationError::BackupFailed(_)
            | MigrationError::KvStore(_)
            | MigrationError::Json(_)
            | MigrationError::Yaml(_)
            | MigrationError::Io(_)
            | MigrationError::Join(_) => ApiError::Internal(message),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Internal(msg) => {
                error!("Request failed: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

// Request and response bodies

#[derive(Debug, Default, Deserialize)]
pub struct DetectParams {
    #[serde(default)]
    pub search_paths: Vec<PathBuf>,
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeParams {
    pub source_path: PathBuf,
}

#[derive(Debug, Deserialize)]
pub struct StartParams {
    #[serde(flatten)]
    pub request: MigrationRequest,
    /// Run on a background task and answer immediately
    #[serde(default)]
    pub background: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartStatus {
    Scheduled,
    Completed,
    Failed,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StartResponse {
    pub status: StartStatus,
    pub migration_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<MigrationResult>,
}

#[derive(Debug, Deserialize)]
pub struct BulkParams {
    pub requests: Vec<MigrationRequest>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BulkResponse {
    pub status: StartStatus,
    pub migration_ids: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryParams {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct ValidateParams {
    pub target_path: Option<PathBuf>,
    pub workspace_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CleanupParams {
    pub days_to_keep: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct ReportParams {
    #[serde(flatten)]
    pub request: ReportRequest,
    #[serde(default)]
    pub format: ReportFormat,
}

pub fn router(engine: MigrationEngine) -> Router {
    Router::new()
        .route("/migration/detect", post(detect))
        .route("/migration/analyze", post(analyze))
        .route("/migration/start", post(start))
        .route("/migration/bulk", post(bulk))
        .route("/migration/status", get(active_runs))
        .route("/migration/status/{id}", get(run_status))
        .route("/migration/history", get(history))
        .route("/migration/validate", post(validate))
        .route("/migration/rollback", post(rollback))
        .route("/migration/cleanup", post(cleanup))
        .route("/migration/health", get(health))
        .route("/migration/report", post(report))
        .route("/migration/stats", get(stats))
        .route("/migration/backups", get(backups))
        .with_state(AppState { engine })
}

/// Serve the router until `shutdown` resolves
pub async fn serve(
    engine: MigrationEngine,
    addr: SocketAddr,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Migration API listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(engine))
        .with_graceful_shutdown(shutdown)
        .await?;
    info!("Migration API shut down cleanly");
    Ok(())
}

async fn detect(
    State(state): State<AppState>,
    Json(params): Json<DetectParams>,
) -> ApiResult<Vec<LegacyWorkspaceData>> {
    Ok(Json(state.engine.detect(params.search_paths).await?))
}

async fn analyze(
    State(state): State<AppState>,
    Json(params): Json<AnalyzeParams>,
) -> ApiResult<LegacyWorkspaceData> {
    Ok(Json(state.engine.analyze(&params.source_path).await?))
}

async fn start(
    State(state): State<AppState>,
    Json(params): Json<StartParams>,
) -> Result<(StatusCode, Json<StartResponse>), ApiError> {
    if params.background {
        let migration_id = state.engine.schedule(params.request)?;
        return Ok((
            StatusCode::ACCEPTED,
            Json(StartResponse {
                status: StartStatus::Scheduled,
                migration_id,
                result: None,
            }),
        ));
    }

    let run = state.engine.start(params.request).await?;
    let status = if run.result.success {
        StartStatus::Completed
    } else {
        StartStatus::Failed
    };
    Ok((
        StatusCode::OK,
        Json(StartResponse {
            status,
            migration_id: run.migration_id,
            result: Some(run.result),
        }),
    ))
}

async fn bulk(
    State(state): State<AppState>,
    Json(params): Json<BulkParams>,
) -> Result<(StatusCode, Json<BulkResponse>), ApiError> {
    if params.requests.is_empty() {
        return Err(ApiError::BadRequest("requests must not be empty".to_string()));
    }
    let migration_ids = state.engine.schedule_bulk(params.requests)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(BulkResponse {
            status: StartStatus::Scheduled,
            migration_ids,
        }),
    ))
}

async fn active_runs(State(state): State<AppState>) -> Json<Vec<MigrationRecord>> {
    Json(state.engine.active())
}

async fn run_status(
    State(state): State<AppState>,
    UrlPath(id): UrlPath<String>,
) -> ApiResult<MigrationRecord> {
    state
        .engine
        .status(&id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("unknown migration id '{id}'")))
}

async fn history(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Json<Vec<MigrationRecord>> {
    let limit = params.limit.map(|limit| limit.min(MAX_HISTORY_LIMIT));
    Json(state.engine.history(limit))
}

async fn validate(
    State(state): State<AppState>,
    Json(params): Json<ValidateParams>,
) -> ApiResult<ValidationReport> {
    let target = match (params.target_path, params.workspace_name) {
        (Some(path), _) => path,
        (None, Some(name)) => state.engine.settings().workspace_dir(&name),
        (None, None) => {
            return Err(ApiError::BadRequest(
                "either target_path or workspace_name is required".to_string(),
            ))
        }
    };
    Ok(Json(state.engine.validate_workspace(&target).await?))
}

async fn rollback(
    State(state): State<AppState>,
    Json(request): Json<RollbackRequest>,
) -> ApiResult<RollbackResult> {
    Ok(Json(state.engine.rollback(&request).await?))
}

async fn cleanup(
    State(state): State<AppState>,
    Json(params): Json<CleanupParams>,
) -> ApiResult<CleanupSummary> {
    let days = params.days_to_keep.unwrap_or(DEFAULT_RETENTION_DAYS);
    Ok(Json(state.engine.cleanup_backups(days).await?))
}

async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthReport>) {
    let report = state.engine.health().await;
    let status = if report.healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}

async fn report(
    State(state): State<AppState>,
    Json(params): Json<ReportParams>,
) -> Result<Response, ApiError> {
    let report = state.engine.report(&params.request).await?;
    match params.format {
        ReportFormat::Json => Ok(Json(report).into_response()),
        ReportFormat::Markdown => Ok((
            [(header::CONTENT_TYPE, "text/markdown; charset=utf-8")],
            report.to_markdown(),
        )
            .into_response()),
    }
}

async fn stats(State(state): State<AppState>) -> ApiResult<MigrationStats> {
    Ok(Json(state.engine.stats()?))
}

async fn backups(
    State(state): State<AppState>,
    Query(filter): Query<BackupFilter>,
) -> ApiResult<Vec<MigrationBackup>> {
    Ok(Json(state.engine.list_backups(&filter)?))
}
