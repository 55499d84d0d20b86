use anyhow::Result;
use std::time::{Duration, Instant};

use tracing::{error, info};

use crate::background_jobs::{CronSchedule, JobError, SchedulerHandle};
use crate::dedupe::GroupingStrategy;
use crate::library::TagUpdate;
use crate::service::{LibraryService, ServiceError};
use tokio_util::sync::CancellationToken;
use tower_http::services::ServeDir;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    response::{Html, IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{log_requests, metrics, state::*, ServerConfig};

const DEFAULT_PAGE_SIZE: usize = 100;
const DEFAULT_SEARCH_LIMIT: usize = 50;

#[derive(Serialize)]
struct ServerStats {
    pub name: &'static str,
    pub version: &'static str,
    pub uptime: String,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = match &self {
            ServiceError::Busy
            | ServiceError::NoApiKey
            | ServiceError::OutsideLibrary(_)
            | ServiceError::Invalid(_) => StatusCode::BAD_REQUEST,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Internal(e) => {
                error!("Internal error: {:#}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        error_response(status, self.to_string())
    }
}

/// Runs filesystem-heavy service calls off the async workers.
async fn blocking<T, F>(work: F) -> Result<T, ServiceError>
where
    F: FnOnce() -> Result<T, ServiceError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ServiceError::Internal(e.into()))?
}

fn started() -> Json<serde_json::Value> {
    Json(json!({ "status": "started" }))
}

fn ok() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn home(State(state): State<ServerState>) -> impl IntoResponse {
    let stats = ServerStats {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        uptime: format_uptime(state.start_time.elapsed()),
    };
    Json(stats)
}

async fn health(State(state): State<ServerState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "uptime": format_uptime(state.start_time.elapsed()),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn get_status(State(service): State<LibraryService>) -> impl IntoResponse {
    Json(service.status())
}

#[derive(Serialize)]
struct ConfigView {
    api_key: String,
    has_key: bool,
    model_name: String,
    proxy_url: String,
    music_dir: String,
    task_target_path: String,
}

async fn get_config(State(service): State<LibraryService>) -> impl IntoResponse {
    let settings = service.settings().get();
    Json(ConfigView {
        api_key: settings.masked_api_key(),
        has_key: settings.has_key(),
        model_name: settings.model_name,
        proxy_url: settings.proxy_url,
        music_dir: settings.music_dir,
        task_target_path: settings.task_target_path,
    })
}

#[derive(Deserialize, Debug, Default)]
struct ConfigBody {
    pub api_key: Option<String>,
    pub model_name: Option<String>,
    pub proxy_url: Option<String>,
    pub music_dir: Option<String>,
    pub task_target_path: Option<String>,
}

async fn post_config(
    State(service): State<LibraryService>,
    State(scheduler): State<SchedulerHandle>,
    Json(body): Json<ConfigBody>,
) -> Response {
    let music_dir = body
        .music_dir
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty());
    if let Some(dir) = &music_dir {
        if !std::path::Path::new(dir).is_dir() {
            return error_response(
                StatusCode::BAD_REQUEST,
                format!("Directory not found: {}", dir),
            );
        }
    }

    let result = service.settings().update(|settings| {
        // The masked key is echoed back by clients that did not change it.
        if let Some(api_key) = body.api_key.filter(|k| !k.contains("****")) {
            settings.api_key = api_key.trim().to_string();
        }
        if let Some(model_name) = body.model_name.filter(|m| !m.trim().is_empty()) {
            settings.model_name = model_name.trim().to_string();
        }
        if let Some(proxy_url) = body.proxy_url {
            settings.proxy_url = proxy_url.trim().to_string();
        }
        if let Some(music_dir) = music_dir {
            settings.music_dir = music_dir;
        }
        if let Some(target) = body.task_target_path {
            let target = target.trim();
            settings.task_target_path = if target.is_empty() {
                settings.music_dir.clone()
            } else {
                target.to_string()
            };
        }
    });

    match result {
        Ok(_) => {
            service.activity_log().add("Settings updated");
            scheduler.reschedule().await;
            ok().into_response()
        }
        Err(e) => error_response(StatusCode::BAD_REQUEST, format!("{:#}", e)),
    }
}

async fn get_models(State(service): State<LibraryService>) -> Response {
    match service.list_models().await {
        Ok(models) => Json(json!({ "models": models })).into_response(),
        Err(e) => e.into_response(),
    }
}

#[derive(Deserialize, Debug, Default)]
struct ScanBody {
    pub target_path: Option<String>,
    #[serde(default)]
    pub strategy: GroupingStrategy,
}

async fn post_scan(State(service): State<LibraryService>, body: Bytes) -> Response {
    let body: ScanBody = if body.iter().all(u8::is_ascii_whitespace) {
        ScanBody::default()
    } else {
        match serde_json::from_slice(&body) {
            Ok(body) => body,
            Err(e) => {
                return error_response(StatusCode::BAD_REQUEST, format!("Invalid body: {}", e))
            }
        }
    };

    match service.start_scan(body.target_path.as_deref(), body.strategy) {
        Ok(()) => started().into_response(),
        Err(e) => e.into_response(),
    }
}

async fn post_analyze(State(service): State<LibraryService>) -> Response {
    match service.start_analysis() {
        Ok(()) => started().into_response(),
        Err(e) => e.into_response(),
    }
}

async fn get_candidates(State(service): State<LibraryService>) -> impl IntoResponse {
    Json(json!({ "candidates": service.candidates() }))
}

async fn get_results(State(service): State<LibraryService>) -> impl IntoResponse {
    Json(json!({ "results": service.results() }))
}

async fn get_report(State(service): State<LibraryService>) -> impl IntoResponse {
    Html(service.duplicate_report_html())
}

#[derive(Deserialize, Debug)]
struct PathsBody {
    pub paths: Vec<String>,
}

async fn post_delete(
    State(service): State<LibraryService>,
    Json(body): Json<PathsBody>,
) -> Response {
    match blocking(move || Ok(service.delete_files(&body.paths))).await {
        Ok(outcome) => Json(outcome).into_response(),
        Err(e) => e.into_response(),
    }
}

#[derive(Deserialize, Debug)]
struct PageQuery {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

async fn get_library(
    State(service): State<LibraryService>,
    Query(query): Query<PageQuery>,
) -> Response {
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE);
    let offset = query.offset.unwrap_or(0);
    match blocking(move || Ok(service.library_page(limit, offset)?)).await {
        Ok(page) => Json(page).into_response(),
        Err(e) => e.into_response(),
    }
}

#[derive(Deserialize, Debug)]
struct SearchQuery {
    #[serde(default)]
    pub q: String,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

async fn search_library(
    State(service): State<LibraryService>,
    Query(query): Query<SearchQuery>,
) -> Response {
    let limit = query.limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
    let offset = query.offset.unwrap_or(0);
    match blocking(move || Ok(service.search_library(&query.q, limit, offset)?)).await {
        Ok(items) => Json(json!({ "items": items })).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn optimize_library(State(service): State<LibraryService>) -> Response {
    match blocking(move || Ok(service.optimize_store()?)).await {
        Ok(()) => ok().into_response(),
        Err(e) => e.into_response(),
    }
}

#[derive(Deserialize, Debug)]
struct DirsQuery {
    pub path: Option<String>,
}

async fn get_dirs(
    State(service): State<LibraryService>,
    Query(query): Query<DirsQuery>,
) -> Response {
    match blocking(move || Ok(service.browse_dirs(query.path.as_deref()))).await {
        Ok(listing) => Json(listing).into_response(),
        Err(e) => e.into_response(),
    }
}

#[derive(Deserialize, Debug)]
struct MetadataUpdateBody {
    pub paths: Vec<String>,
    #[serde(flatten)]
    pub update: TagUpdate,
}

async fn post_metadata_update(
    State(service): State<LibraryService>,
    Json(body): Json<MetadataUpdateBody>,
) -> Response {
    if body.update.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "No tag values given");
    }
    match blocking(move || Ok(service.update_tags(&body.paths, &body.update))).await {
        Ok(updated) => Json(json!({ "updated": updated })).into_response(),
        Err(e) => e.into_response(),
    }
}

#[derive(Deserialize, Debug)]
struct MetadataFixBody {
    pub path: String,
}

async fn post_metadata_fix(
    State(service): State<LibraryService>,
    Json(body): Json<MetadataFixBody>,
) -> Response {
    match service.fix_metadata_with_ai(&body.path).await {
        Ok(suggestion) => Json(json!({ "status": "success", "data": suggestion })).into_response(),
        Err(e) => e.into_response(),
    }
}

#[derive(Deserialize, Debug)]
struct RenameBody {
    pub paths: Vec<String>,
    pub pattern: String,
}

async fn post_rename(
    State(service): State<LibraryService>,
    Json(body): Json<RenameBody>,
) -> Response {
    match blocking(move || service.rename_files(&body.paths, &body.pattern)).await {
        Ok(renamed) => Json(json!({ "renamed": renamed })).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn get_tasks(State(scheduler): State<SchedulerHandle>) -> impl IntoResponse {
    Json(json!({ "tasks": scheduler.list_jobs().await }))
}

#[derive(Deserialize, Debug)]
struct TaskUpdateBody {
    pub enabled: Option<bool>,
    pub cron: Option<String>,
    pub min_duration: Option<u32>,
}

async fn put_task(
    State(service): State<LibraryService>,
    State(scheduler): State<SchedulerHandle>,
    Path(id): Path<String>,
    Json(body): Json<TaskUpdateBody>,
) -> Response {
    if !scheduler.job_exists(&id).await {
        return error_response(StatusCode::NOT_FOUND, format!("Unknown task: {}", id));
    }

    let cron = match body.cron.as_deref().map(str::trim) {
        Some(expression) => match CronSchedule::parse(expression) {
            Ok(schedule) => Some(schedule.expression().to_string()),
            Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
        },
        None => None,
    };
    if body.min_duration == Some(0) {
        return error_response(StatusCode::BAD_REQUEST, "min_duration must be positive");
    }

    let result = service.settings().update(|settings| {
        if let Some(task) = settings.tasks_config.get_mut(&id) {
            if let Some(enabled) = body.enabled {
                task.enabled = enabled;
            }
            if let Some(cron) = cron {
                task.cron = cron;
            }
            if body.min_duration.is_some() {
                task.min_duration = body.min_duration;
            }
        }
    });
    if let Err(e) = result {
        return error_response(StatusCode::BAD_REQUEST, format!("{:#}", e));
    }

    scheduler.reschedule().await;
    info!("Task {} updated", id);
    match scheduler.get_job(&id).await {
        Some(job) => Json(job).into_response(),
        None => error_response(StatusCode::NOT_FOUND, format!("Unknown task: {}", id)),
    }
}

async fn run_task(
    State(scheduler): State<SchedulerHandle>,
    Path(id): Path<String>,
) -> Response {
    match scheduler.trigger_job(&id).await {
        Ok(()) => (StatusCode::ACCEPTED, started()).into_response(),
        Err(JobError::NotFound) => {
            error_response(StatusCode::NOT_FOUND, format!("Unknown task: {}", id))
        }
        Err(JobError::AlreadyRunning) => {
            error_response(StatusCode::CONFLICT, JobError::AlreadyRunning.to_string())
        }
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

async fn get_logs(State(service): State<LibraryService>) -> impl IntoResponse {
    Json(json!({ "logs": service.activity_log().entries() }))
}

pub fn make_app(
    config: ServerConfig,
    service: LibraryService,
    scheduler_handle: SchedulerHandle,
) -> Router {
    let state = ServerState {
        config: config.clone(),
        start_time: Instant::now(),
        service,
        scheduler_handle,
    };

    let api_routes: Router = Router::new()
        .route("/health", get(health))
        .route("/status", get(get_status))
        .route("/config", get(get_config).post(post_config))
        .route("/models", get(get_models))
        .route("/scan", post(post_scan))
        .route("/analyze", post(post_analyze))
        .route("/candidates", get(get_candidates))
        .route("/results", get(get_results))
        .route("/report", get(get_report))
        .route("/delete", post(post_delete))
        .route("/library", get(get_library))
        .route("/library/search", get(search_library))
        .route("/library/optimize", post(optimize_library))
        .route("/dirs", get(get_dirs))
        .route("/metadata/update", post(post_metadata_update))
        .route("/metadata/fix", post(post_metadata_fix))
        .route("/rename", post(post_rename))
        .route("/tasks", get(get_tasks))
        .route("/tasks/{id}", put(put_task))
        .route("/tasks/{id}/run", post(run_task))
        .route("/logs", get(get_logs))
        .with_state(state.clone());

    let home_router: Router = match config.frontend_dir_path {
        Some(frontend_path) => {
            let static_files_service =
                ServeDir::new(frontend_path).append_index_html_on_directories(true);
            Router::new().fallback_service(static_files_service)
        }
        None => Router::new()
            .route("/", get(home))
            .with_state(state.clone()),
    };

    home_router
        .nest("/api", api_routes)
        .route("/metrics", get(metrics::metrics_handler))
        .layer(middleware::from_fn_with_state(state, log_requests))
}

pub async fn run_server(
    config: ServerConfig,
    service: LibraryService,
    scheduler_handle: SchedulerHandle,
    shutdown_token: CancellationToken,
) -> Result<()> {
    let address = format!("{}:{}", config.bind_address, config.port);
    let app = make_app(config, service, scheduler_handle);

    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!("Listening on {}", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_token.cancelled_owned())
        .await?;
    Ok(())
}
