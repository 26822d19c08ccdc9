//! Prometheus metrics for the forward-callback pipeline.
//!
//! Tracks which path each forward took, classified diagnostics, and upstream
//! call duration.
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

lazy_static! {
    /// Forwards by pipeline path
    pub static ref FORWARDS_TOTAL: CounterVec = register_counter_vec!(
        "rift_callback_forwards_total",
        "Total number of forward-callback invocations by path",
        &["path"]  // path: plain|transform|not_found
    )
    .expect("rift_callback_forwards_total registers once");

    /// Diagnostics emitted, by classification tag
    pub static ref DIAGNOSTICS_TOTAL: CounterVec = register_counter_vec!(
        "rift_callback_diagnostics_total",
        "Total number of diagnostic events emitted by the forward-callback pipeline",
        &["kind"]
    )
    .expect("rift_callback_diagnostics_total registers once");

    /// Upstream call duration, as seen by the transport
    pub static ref UPSTREAM_DURATION_MS: HistogramVec = register_histogram_vec!(
        "rift_callback_upstream_duration_ms",
        "Duration of upstream calls made for forward-callback actions",
        &["method", "status"],
        vec![1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0]
    )
    .expect("rift_callback_upstream_duration_ms registers once");
}

/// Collect and return all metrics in Prometheus text format
pub fn collect_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

pub fn record_forward(path: &str) {
    FORWARDS_TOTAL.with_label_values(&[path]).inc();
}

pub fn record_diagnostic(kind: &str) {
    DIAGNOSTICS_TOTAL.with_label_values(&[kind]).inc();
}

/// Standard methods keep their own label; anything else is `OTHER`.
fn method_label(method: &str) -> &'static str {
    const STANDARD: [&str; 9] = [
        "GET", "HEAD", "POST", "PUT", "DELETE", "CONNECT", "OPTIONS", "TRACE", "PATCH",
    ];
    STANDARD
        .iter()
        .find(|standard| method.eq_ignore_ascii_case(standard))
        .copied()
        .unwrap_or("OTHER")
}

/// `status` is `"error"` when the call produced no response.
pub fn record_upstream_duration(method: &str, status: &str, duration_ms: f64) {
    UPSTREAM_DURATION_MS
        .with_label_values(&[method_label(method), status])
        .observe(duration_ms);
}
