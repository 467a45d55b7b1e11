use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, Encoder,
    HistogramVec, IntCounter, IntCounterVec, TextEncoder,
};

lazy_static! {
    // HTTP Metrics
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .unwrap();

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds",
        &["method", "path"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .unwrap();

    // Database Metrics (MongoDB)
    pub static ref DB_OPERATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "db_operations_total",
        "Total number of database operations",
        &["operation", "collection", "status"]
    )
    .unwrap();

    pub static ref DB_OPERATION_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "db_operation_duration_seconds",
        "Database operation duration in seconds",
        &["operation", "collection"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .unwrap();

    // Selection Metrics
    pub static ref SNAPSHOT_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "snapshot_requests_total",
        "Snapshot lookups by outcome",
        &["result"]
    )
    .unwrap();

    pub static ref QUESTION_SHORTFALL_TOTAL: IntCounterVec = register_int_counter_vec!(
        "question_shortfall_total",
        "Draws clamped because fewer active questions were available than requested",
        &["difficulty"]
    )
    .unwrap();

    pub static ref SHARED_POOL_ACTIVATIONS_TOTAL: IntCounter = register_int_counter!(
        "shared_pool_activations_total",
        "Master selections drawn once from a shared pool across topics"
    )
    .unwrap();

    pub static ref SNAPSHOT_STORE_CONFLICTS_TOTAL: IntCounter = register_int_counter!(
        "snapshot_store_conflicts_total",
        "First-insert races resolved by re-reading the committed row"
    )
    .unwrap();

    pub static ref SNAPSHOT_EXPORTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "snapshot_exports_total",
        "Recorded exports of exam variants",
        &["kind"]
    )
    .unwrap();
}

/// Renders all metrics in Prometheus text format
pub fn render_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer)
        .map_err(|e| prometheus::Error::Msg(format!("Failed to convert metrics to UTF-8: {}", e)))
}

/// Helper: track database operation with metrics
pub async fn track_db_operation<F, T, E>(
    operation: &str,
    collection: &str,
    future: F,
) -> Result<T, E>
where
    F: std::future::Future<Output = Result<T, E>>,
{
    let start = std::time::Instant::now();
    let result = future.await;
    let duration = start.elapsed().as_secs_f64();

    let status = if result.is_ok() { "success" } else { "error" };

    DB_OPERATIONS_TOTAL
        .with_label_values(&[operation, collection, status])
        .inc();

    DB_OPERATION_DURATION_SECONDS
        .with_label_values(&[operation, collection])
        .observe(duration);

    result
}

pub fn record_snapshot_request(result: &str) {
    SNAPSHOT_REQUESTS_TOTAL.with_label_values(&[result]).inc();
}
