use axum::{http::StatusCode, response::IntoResponse};
use lazy_static::lazy_static;
use prometheus::{CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};
use std::time::Duration;

/// Metric name prefix for all SeekTune metrics
const PREFIX: &str = "seektune";

lazy_static! {
    // Global Prometheus registry
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
        .buckets(vec![0.01, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]),
        &["method", "path"]
    ).expect("Failed to create http_request_duration_seconds metric");

    // Workflow Metrics
    pub static ref WORKFLOWS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_workflows_total"), "Finished workflows by terminal outcome"),
        &["workflow", "outcome"]
    ).expect("Failed to create workflows_total metric");

    // Engine Metrics
    pub static ref ENGINE_INVOCATION_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_engine_invocation_duration_seconds"),
            "External process run time in seconds"
        )
        .buckets(vec![0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 120.0]),
        &["engine"]
    ).expect("Failed to create engine_invocation_duration_seconds metric");

    pub static ref ENGINE_INVOCATIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_engine_invocations_total"), "External process calls by exit class"),
        &["engine", "result"]
    ).expect("Failed to create engine_invocations_total metric");

    pub static ref TRANSCODES_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_transcodes_total"), "Transcode attempts"),
        &["status"]
    ).expect("Failed to create transcodes_total metric");

    // Catalog Metrics
    pub static ref CATALOG_READ_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_catalog_read_duration_seconds"),
            "Catalog listing duration in seconds"
        )
        .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        &["backend"]
    ).expect("Failed to create catalog_read_duration_seconds metric");
}

/// Initialize all metrics and register them with the Prometheus registry
pub fn init_metrics() {
    // Register all metrics - ignore errors if already registered (for tests)
    let _ = REGISTRY.register(Box::new(HTTP_REQUESTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(WORKFLOWS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(ENGINE_INVOCATION_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(ENGINE_INVOCATIONS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(TRANSCODES_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(CATALOG_READ_DURATION_SECONDS.clone()));

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

/// Record the terminal outcome of a workflow ("identify"/"add")
pub fn record_workflow(workflow: &str, outcome: &str) {
    WORKFLOWS_TOTAL.with_label_values(&[workflow, outcome]).inc();
}

/// Record one external process call
pub fn record_engine_invocation(engine: &str, exit_status: i32, duration: Duration) {
    let result = if exit_status == 0 { "success" } else { "nonzero" };
    ENGINE_INVOCATIONS_TOTAL
        .with_label_values(&[engine, result])
        .inc();
    ENGINE_INVOCATION_DURATION_SECONDS
        .with_label_values(&[engine])
        .observe(duration.as_secs_f64());
}

pub fn record_transcode(status: &str) {
    TRANSCODES_TOTAL.with_label_values(&[status]).inc();
}

pub fn record_catalog_read(backend: &str, duration: Duration) {
    CATALOG_READ_DURATION_SECONDS
        .with_label_values(&[backend])
        .observe(duration.as_secs_f64());
}

/// Handler for the /metrics endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = vec![];

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => match String::from_utf8(buffer) {
            Ok(metrics) => (StatusCode::OK, metrics).into_response(),
            Err(e) => {
                tracing::error!("Failed to convert metrics to UTF-8: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics").into_response()
            }
        },
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics").into_response()
        }
    }
}
