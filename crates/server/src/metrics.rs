//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the modelbridge server:
//! - HTTP request metrics (latency, counts, in flight)
//! - Record counts by lifecycle status (collected on scrape)
//! - Core lifecycle and gateway metrics (registered from `modelbridge_core::metrics`)

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};
use regex_lite::Regex;
use tracing::warn;

use modelbridge_core::{RecordFilter, RecordStatus};

use crate::state::AppState;

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "modelbridge_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("modelbridge_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "modelbridge_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// Record Metrics
// =============================================================================

/// Records by current lifecycle status (collected dynamically).
pub static RECORDS_BY_STATUS: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new(
            "modelbridge_records_by_status",
            "Current model record count by lifecycle status",
        ),
        &["status"],
    )
    .unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();

    // Records
    registry
        .register(Box::new(RECORDS_BY_STATUS.clone()))
        .unwrap();

    // Core metrics (lifecycle, gateway)
    for metric in modelbridge_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Refresh gauges that mirror the record store before a scrape.
pub fn collect_dynamic_metrics(state: &AppState) {
    let lifecycle = state.lifecycle();
    for status in RecordStatus::ALL {
        let filter = RecordFilter::new().with_status(status);
        match lifecycle.count(&filter) {
            Ok(count) => RECORDS_BY_STATUS
                .with_label_values(&[status.as_str()])
                .set(count),
            Err(e) => warn!("Failed to count {} records: {}", status, e),
        }
    }
}

static UUID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}")
        .unwrap()
});

static MODEL_ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(/api/v1/models/)[^/]+").unwrap());

/// Normalize a path for metric labels (replace IDs with placeholders).
pub fn normalize_path(path: &str) -> String {
    let result = UUID_RE.replace_all(path, "{id}");
    // Unknown ids that are not UUIDs still must not create new label values
    let result = MODEL_ID_RE.replace(&result, "${1}{id}");
    result.into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_uuid() {
        let path = "/api/v1/models/550e8400-e29b-41d4-a716-446655440000";
        assert_eq!(normalize_path(path), "/api/v1/models/{id}");
    }

    #[test]
    fn test_normalize_path_action() {
        let path = "/api/v1/models/550e8400-e29b-41d4-a716-446655440000/download";
        assert_eq!(normalize_path(path), "/api/v1/models/{id}/download");
    }

    #[test]
    fn test_normalize_path_non_uuid_id() {
        assert_eq!(
            normalize_path("/api/v1/models/not-a-real-id/poll"),
            "/api/v1/models/{id}/poll"
        );
    }

    #[test]
    fn test_normalize_path_no_ids() {
        assert_eq!(normalize_path("/api/v1/health"), "/api/v1/health");
        assert_eq!(normalize_path("/api/v1/models"), "/api/v1/models");
    }

    #[test]
    fn test_encode_metrics_returns_prometheus_format() {
        HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", "/test", "200"])
            .inc();

        let output = encode_metrics();
        assert!(output.contains("modelbridge_http_requests_total"));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE"));
    }

    #[test]
    fn test_registry_contains_core_metrics() {
        RECORDS_BY_STATUS.with_label_values(&["needConvert"]).set(0);
        modelbridge_core::metrics::LIFECYCLE_OPERATIONS
            .with_label_values(&["ingest", "ok"])
            .inc();

        let output = encode_metrics();
        assert!(output.contains("modelbridge_records_by_status"));
        assert!(output.contains("modelbridge_lifecycle_operations_total"));
    }
}
