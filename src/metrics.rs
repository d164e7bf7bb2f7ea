// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Prometheus metrics for the egress operator and DNS plane.
//!
//! All metrics carry the namespace prefix `egress_operator_`.
//!
//! # Metrics Categories
//!
//! - **Reconciliation Metrics** - Reconcile passes per `ExternalService` and their outcome
//! - **Generated Object Metrics** - Writes issued per generated kind (created, patched, unchanged, gone)
//! - **DNS Metrics** - Active rewrite rules and query outcomes
//!
//! # Example
//!
//! ```rust,no_run
//! use egress_operator::metrics::{gather_metrics, record_reconciliation_success};
//!
//! record_reconciliation_success(std::time::Duration::from_millis(120));
//! let text = gather_metrics().unwrap();
//! ```

use prometheus::{CounterVec, Encoder, Gauge, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};
use std::sync::LazyLock;
use std::time::Duration;

/// Namespace prefix for all metrics (prometheus-safe)
const METRICS_NAMESPACE: &str = "egress_operator";

/// Global Prometheus metrics registry
///
/// All metrics are registered in this registry and exposed via `/metrics` endpoint.
pub static METRICS_REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// ============================================================================
// Reconciliation Metrics
// ============================================================================

/// Total number of `ExternalService` reconciliations by status
///
/// Labels:
/// - `status`: Outcome (`success`, `error`)
pub static RECONCILIATION_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_reconciliations_total"),
        "Total number of ExternalService reconciliations by status",
    );
    let counter = CounterVec::new(opts, &["status"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Duration of `ExternalService` reconciliations in seconds
///
/// Labels:
/// - `status`: Outcome (`success`, `error`)
pub static RECONCILIATION_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    let opts = HistogramOpts::new(
        format!("{METRICS_NAMESPACE}_reconciliation_duration_seconds"),
        "Duration of ExternalService reconciliations in seconds",
    )
    .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]);
    let histogram = HistogramVec::new(opts, &["status"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(histogram.clone()))
        .unwrap();
    histogram
});

// ============================================================================
// Generated Object Metrics
// ============================================================================

/// Total number of generated-object reconciliations by kind and outcome
///
/// Labels:
/// - `kind`: Kubernetes kind (e.g., `Deployment`, `Service`)
/// - `outcome`: `created`, `patched`, `unchanged`, `gone`
pub static OBJECT_OUTCOMES_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_objects_total"),
        "Generated objects reconciled by kind and outcome",
    );
    let counter = CounterVec::new(opts, &["kind", "outcome"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// DNS Metrics
// ============================================================================

/// Number of rewrite rules currently active in the DNS plane
pub static DNS_REWRITE_RULES: LazyLock<Gauge> = LazyLock::new(|| {
    let gauge = Gauge::new(
        format!("{METRICS_NAMESPACE}_dns_rewrite_rules"),
        "Number of DNS rewrite rules currently active",
    )
    .unwrap();
    METRICS_REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

/// Total number of DNS queries served by outcome
///
/// Labels:
/// - `outcome`: `rewritten`, `passthrough`, `error`
pub static DNS_QUERIES_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_dns_queries_total"),
        "DNS queries served by outcome",
    );
    let counter = CounterVec::new(opts, &["outcome"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Record a successful reconciliation
pub fn record_reconciliation_success(duration: Duration) {
    RECONCILIATION_TOTAL.with_label_values(&["success"]).inc();
    RECONCILIATION_DURATION_SECONDS
        .with_label_values(&["success"])
        .observe(duration.as_secs_f64());
}

/// Record a failed reconciliation
pub fn record_reconciliation_error(duration: Duration) {
    RECONCILIATION_TOTAL.with_label_values(&["error"]).inc();
    RECONCILIATION_DURATION_SECONDS
        .with_label_values(&["error"])
        .observe(duration.as_secs_f64());
}

/// Record the outcome of reconciling one generated object
///
/// # Arguments
/// * `kind` - Kubernetes kind of the object
/// * `outcome` - `created`, `patched`, `unchanged` or `gone`
pub fn record_object_outcome(kind: &str, outcome: &str) {
    OBJECT_OUTCOMES_TOTAL
        .with_label_values(&[kind, outcome])
        .inc();
}

/// Record the size of the active rewrite rule set
#[allow(clippy::cast_precision_loss)]
pub fn record_rewrite_rules(count: usize) {
    DNS_REWRITE_RULES.set(count as f64);
}

/// Record one served DNS query
pub fn record_dns_query(outcome: &str) {
    DNS_QUERIES_TOTAL.with_label_values(&[outcome]).inc();
}

/// Gather and encode all metrics in Prometheus text format
///
/// # Errors
/// Returns error if encoding fails
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = METRICS_REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(format!("UTF-8 error: {e}")))
}
