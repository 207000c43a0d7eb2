//! Prometheus metrics for ledger-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, HistogramVec, TextEncoder,
};

/// Payment counter by resulting allocation status.
pub static PAYMENTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "ledger_payments_total",
        "Total number of payments created by status",
        &["status"]
    )
    .expect("Failed to register payments_total")
});

/// Allocation mutation counter by operation and outcome.
pub static ALLOCATIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "ledger_allocations_total",
        "Total number of allocation mutations",
        &["operation", "outcome"] // allocate/remove, ok/rejected
    )
    .expect("Failed to register allocations_total")
});

/// Document-number conflicts retried by document type.
pub static NUMBER_CONFLICTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "ledger_number_conflicts_total",
        "Duplicate document-number collisions detected at insert",
        &["document_type"] // invoice, payment
    )
    .expect("Failed to register number_conflicts_total")
});

/// Error counter for alerting.
pub static ERRORS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "ledger_errors_total",
        "Total number of errors by type",
        &["error_type"]
    )
    .expect("Failed to register errors_total")
});

/// Database query duration histogram.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "ledger_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register db_query_duration")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&PAYMENTS_TOTAL);
    Lazy::force(&ALLOCATIONS_TOTAL);
    Lazy::force(&NUMBER_CONFLICTS_TOTAL);
    Lazy::force(&ERRORS_TOTAL);
    Lazy::force(&DB_QUERY_DURATION);
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_default()
}
