//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Lifecycle operations (ingest, submit, poll, download, metadata)
//! - Translation gateway calls

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Lifecycle Metrics
// =============================================================================

/// Lifecycle operations total by operation and outcome.
pub static LIFECYCLE_OPERATIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "modelbridge_lifecycle_operations_total",
            "Total lifecycle operations",
        ),
        &["operation", "outcome"], // outcome: "ok" or a LifecycleError kind
    )
    .unwrap()
});

/// Terminal translation statuses observed by polling.
pub static TRANSLATION_OUTCOMES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "modelbridge_translation_outcomes_total",
            "Terminal translation statuses observed while polling",
        ),
        &["status"], // "success", "failed", "timeout"
    )
    .unwrap()
});

/// Bytes uploaded to the translation service.
pub static UPLOADED_BYTES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "modelbridge_uploaded_bytes_total",
        "Total source bytes uploaded",
    )
    .unwrap()
});

/// Bytes of derivative artifacts written to disk.
pub static ARTIFACT_BYTES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "modelbridge_artifact_bytes_total",
        "Total derivative bytes downloaded",
    )
    .unwrap()
});

// =============================================================================
// Gateway Metrics
// =============================================================================

/// Gateway request duration in seconds.
pub static GATEWAY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "modelbridge_gateway_request_duration_seconds",
            "Duration of translation gateway calls",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
        &["gateway", "operation"],
    )
    .unwrap()
});

/// Gateway requests total by operation and result.
pub static GATEWAY_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "modelbridge_gateway_requests_total",
            "Total translation gateway calls",
        ),
        &["gateway", "operation", "result"], // result: "success", "error"
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Lifecycle
        Box::new(LIFECYCLE_OPERATIONS.clone()),
        Box::new(TRANSLATION_OUTCOMES.clone()),
        Box::new(UPLOADED_BYTES.clone()),
        Box::new(ARTIFACT_BYTES.clone()),
        // Gateway
        Box::new(GATEWAY_DURATION.clone()),
        Box::new(GATEWAY_REQUESTS.clone()),
    ]
}
