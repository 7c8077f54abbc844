/// Metrics for the rental pool
///
/// Prometheus-compatible metrics for monitoring:
/// - HTTP request counts and latencies
/// - Checkouts and reclaims
/// - External provider calls
/// - Expiry sweeps
/// - Pool occupancy

use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge,
    register_int_gauge_vec, Encoder, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec,
    TextEncoder,
};

lazy_static! {
    // ========== HTTP Metrics ==========

    /// Total HTTP requests by method, path, and status
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .unwrap();

    /// HTTP request duration in seconds
    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "http_request_duration_seconds",
        "HTTP request latencies in seconds",
        &["method", "path"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .unwrap();

    // ========== Rental Metrics ==========

    /// Checkout attempts by outcome
    pub static ref CHECKOUTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "rental_checkouts_total",
        "Total number of checkout attempts",
        &["outcome"]
    )
    .unwrap();

    /// Reclaimed rentals by reason
    pub static ref RECLAIMS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "rental_reclaims_total",
        "Total number of reclaimed rentals",
        &["reason"]
    )
    .unwrap();

    /// Orders received from the marketplace by outcome
    pub static ref ORDERS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "rental_orders_total",
        "Total number of order events received",
        &["outcome"]
    )
    .unwrap();

    // ========== Provider Metrics ==========

    /// Remote provider calls by operation and outcome
    pub static ref PROVIDER_CALLS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "provider_calls_total",
        "Total number of external provider calls",
        &["operation", "outcome"]
    )
    .unwrap();

    // ========== Background Job Metrics ==========

    /// Background job executions by job type and status
    pub static ref BACKGROUND_JOBS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "background_jobs_total",
        "Total number of background job executions",
        &["job_type", "status"]
    )
    .unwrap();

    /// Background job duration in seconds
    pub static ref BACKGROUND_JOB_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "background_job_duration_seconds",
        "Background job execution time in seconds",
        &["job_type"],
        vec![0.001, 0.01, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0]
    )
    .unwrap();

    // ========== Pool Metrics ==========

    /// Accounts by status
    pub static ref ACCOUNTS_BY_STATUS: IntGaugeVec = register_int_gauge_vec!(
        "rental_accounts",
        "Number of pooled accounts by status",
        &["status"]
    )
    .unwrap();

    /// Active rentals
    pub static ref RENTALS_ACTIVE: IntGauge = register_int_gauge!(
        "rental_rentals_active",
        "Number of active rentals"
    )
    .unwrap();
}

/// Render metrics in Prometheus text format
pub fn render_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Record an HTTP request
pub fn record_http_request(method: &str, path: &str, status: u16, duration: f64) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(duration);
}

/// Record a checkout attempt
pub fn record_checkout(outcome: &str) {
    CHECKOUTS_TOTAL.with_label_values(&[outcome]).inc();
}

/// Record a reclaimed rental
pub fn record_reclaim(reason: &str) {
    RECLAIMS_TOTAL.with_label_values(&[reason]).inc();
}

/// Record an order event
pub fn record_order(outcome: &str) {
    ORDERS_TOTAL.with_label_values(&[outcome]).inc();
}

/// Record an external provider call
pub fn record_provider_call(operation: &str, outcome: &str) {
    PROVIDER_CALLS_TOTAL
        .with_label_values(&[operation, outcome])
        .inc();
}

/// Record a background job execution
pub fn record_background_job(job_type: &str, status: &str, duration: f64) {
    BACKGROUND_JOBS_TOTAL
        .with_label_values(&[job_type, status])
        .inc();
    BACKGROUND_JOB_DURATION_SECONDS
        .with_label_values(&[job_type])
        .observe(duration);
}

/// Publish pool occupancy
pub fn set_pool_gauges(available: usize, rented: usize, disabled: usize, active_rentals: usize) {
    ACCOUNTS_BY_STATUS
        .with_label_values(&["available"])
        .set(available as i64);
    ACCOUNTS_BY_STATUS
        .with_label_values(&["rented"])
        .set(rented as i64);
    ACCOUNTS_BY_STATUS
        .with_label_values(&["disabled"])
        .set(disabled as i64);
    RENTALS_ACTIVE.set(active_rentals as i64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_http_request() {
        record_http_request("GET", "/health", 200, 0.05);
        let metrics = render_metrics();
        assert!(metrics.contains("http_requests_total"));
        assert!(metrics.contains("http_request_duration_seconds"));
    }

    #[test]
    fn test_record_rental_events() {
        record_checkout("success");
        record_reclaim("expired");
        record_order("ignored");
        let metrics = render_metrics();
        assert!(metrics.contains("rental_checkouts_total"));
        assert!(metrics.contains("rental_reclaims_total"));
        assert!(metrics.contains("rental_orders_total"));
    }

    #[test]
    fn test_record_provider_call() {
        record_provider_call("change_password", "failed");
        let metrics = render_metrics();
        assert!(metrics.contains("provider_calls_total"));
    }

    #[test]
    fn test_pool_gauges() {
        set_pool_gauges(3, 1, 0, 1);
        let metrics = render_metrics();
        assert!(metrics.contains("rental_accounts"));
        assert!(metrics.contains("rental_rentals_active"));
    }
}
