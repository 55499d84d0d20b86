use axum::{http::StatusCode, response::IntoResponse};
use lazy_static::lazy_static;
use prometheus::{
    CounterVec, Encoder, Gauge, GaugeVec, HistogramOpts, HistogramVec, IntCounter, Opts,
    Registry, TextEncoder,
};
use std::time::Duration;

/// Metric name prefix for all librarian metrics
const PREFIX: &str = "music_librarian";

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // HTTP Request Metrics
    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_http_requests_total"), "Total number of HTTP requests"),
        &["method", "path", "status"]
    ).expect("Failed to create http_requests_total metric");

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_http_request_duration_seconds"),
            "HTTP request duration in seconds"
        )
        .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
        &["method", "path"]
    ).expect("Failed to create http_request_duration_seconds metric");

    // Library Metrics
    pub static ref FILES_SCANNED_TOTAL: IntCounter = IntCounter::new(
        format!("{PREFIX}_files_scanned_total"),
        "Total audio files read by library scans"
    ).expect("Failed to create files_scanned_total metric");

    pub static ref DUPLICATE_GROUPS: GaugeVec = GaugeVec::new(
        Opts::new(format!("{PREFIX}_duplicate_groups"), "Duplicate groups found by the last run"),
        &["stage"]
    ).expect("Failed to create duplicate_groups metric");

    pub static ref LIBRARY_TRACKS: Gauge = Gauge::new(
        format!("{PREFIX}_library_tracks"),
        "Tracks in the metadata store"
    ).expect("Failed to create library_tracks metric");

    // AI Metrics
    pub static ref AI_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_ai_requests_total"), "Model requests by purpose and outcome"),
        &["purpose", "outcome"]
    ).expect("Failed to create ai_requests_total metric");

    // Background Job Metrics
    pub static ref BACKGROUND_JOB_EXECUTIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_background_job_executions_total"), "Background job executions"),
        &["job_id", "status"]
    ).expect("Failed to create background_job_executions_total metric");

    pub static ref BACKGROUND_JOB_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_background_job_duration_seconds"),
            "Background job duration in seconds"
        )
        .buckets(vec![0.1, 1.0, 10.0, 60.0, 300.0, 1800.0, 3600.0]),
        &["job_id"]
    ).expect("Failed to create background_job_duration_seconds metric");

    pub static ref BACKGROUND_JOB_RUNNING: GaugeVec = GaugeVec::new(
        Opts::new(format!("{PREFIX}_background_job_running"), "Whether a background job is running"),
        &["job_id"]
    ).expect("Failed to create background_job_running metric");
}

/// Initialize all metrics and register them with the Prometheus registry
pub fn init_metrics() {
    // Ignore errors if already registered (for tests)
    let _ = REGISTRY.register(Box::new(HTTP_REQUESTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(FILES_SCANNED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(DUPLICATE_GROUPS.clone()));
    let _ = REGISTRY.register(Box::new(LIBRARY_TRACKS.clone()));
    let _ = REGISTRY.register(Box::new(AI_REQUESTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(BACKGROUND_JOB_EXECUTIONS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(BACKGROUND_JOB_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(BACKGROUND_JOB_RUNNING.clone()));

    tracing::info!("Metrics system initialized successfully");
}

/// Record an HTTP request
pub fn record_http_request(method: &str, path: &str, status: u16, duration: Duration) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();

    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(duration.as_secs_f64());
}

pub fn record_files_scanned(count: usize) {
    FILES_SCANNED_TOTAL.inc_by(count as u64);
}

/// Record the number of groups produced by a scan ("candidate") or an analysis ("confirmed")
pub fn record_duplicate_groups(stage: &str, count: usize) {
    DUPLICATE_GROUPS
        .with_label_values(&[stage])
        .set(count as f64);
}

pub fn set_library_size(tracks: usize) {
    LIBRARY_TRACKS.set(tracks as f64);
}

/// Record a model request; `outcome` is "success" or an error kind
pub fn record_ai_request(purpose: &str, outcome: &str) {
    AI_REQUESTS_TOTAL
        .with_label_values(&[purpose, outcome])
        .inc();
}

pub fn record_background_job_execution(job_id: &str, status: &str, duration: Duration) {
    BACKGROUND_JOB_EXECUTIONS_TOTAL
        .with_label_values(&[job_id, status])
        .inc();

    BACKGROUND_JOB_DURATION_SECONDS
        .with_label_values(&[job_id])
        .observe(duration.as_secs_f64());
}

pub fn set_background_job_running(job_id: &str, running: bool) {
    BACKGROUND_JOB_RUNNING
        .with_label_values(&[job_id])
        .set(if running { 1.0 } else { 0.0 });
}

/// Handler for the /metrics endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = vec![];
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => {
            let response = String::from_utf8(buffer).unwrap_or_default();
            (StatusCode::OK, response)
        }
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
        }
    }
}
