//! Prometheus metrics for the klusterlet addon controller.
//!
//! All metrics carry the `klusterlet_addon_controller` prefix and are
//! registered in [`METRICS_REGISTRY`], served on `/metrics`.

use prometheus::{
    CounterVec, Encoder, Histogram, HistogramOpts, IntGauge, Opts, Registry, TextEncoder,
};
use std::sync::LazyLock;
use std::time::Duration;

const METRICS_NAMESPACE: &str = "klusterlet_addon_controller";

/// Global Prometheus metrics registry
pub static METRICS_REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

/// Reconciliation passes by result
///
/// Labels:
/// - `result`: `converged`, `requeue`, `terminated`, `error`
pub static RECONCILIATION_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_reconciliations_total"),
        "Total number of reconciliation passes by result",
    );
    let counter = CounterVec::new(opts, &["result"]).unwrap();
    METRICS_REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

pub static RECONCILIATION_DURATION_SECONDS: LazyLock<Histogram> = LazyLock::new(|| {
    let opts = HistogramOpts::new(
        format!("{METRICS_NAMESPACE}_reconciliation_duration_seconds"),
        "Duration of reconciliation passes in seconds",
    )
    .buckets(vec![0.001, 0.01, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]);
    let histogram = Histogram::with_opts(opts).unwrap();
    METRICS_REGISTRY.register(Box::new(histogram.clone())).unwrap();
    histogram
});

/// Addon installations created or deleted
///
/// Labels:
/// - `addon`: addon identifier
/// - `action`: `created`, `deleted`
pub static ADDON_OPERATIONS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_addon_operations_total"),
        "Total number of addon installations created or deleted",
    );
    let counter = CounterVec::new(opts, &["addon", "action"]).unwrap();
    METRICS_REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

/// Configuration writes
///
/// Labels:
/// - `action`: `created`, `recreated`, `repaired`
pub static CONFIG_OPERATIONS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_config_operations_total"),
        "Total number of addon configuration writes by action",
    );
    let counter = CounterVec::new(opts, &["action"]).unwrap();
    METRICS_REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

/// Clusters currently surfacing `ConvergenceStalled`
pub static STALLED_CLUSTERS: LazyLock<IntGauge> = LazyLock::new(|| {
    let gauge = IntGauge::new(
        format!("{METRICS_NAMESPACE}_stalled_clusters"),
        "Number of clusters whose convergence is stalled",
    )
    .unwrap();
    METRICS_REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

/// Record the outcome of a reconciliation pass
pub fn record_reconciliation(result: &str, duration: Duration) {
    RECONCILIATION_TOTAL.with_label_values(&[result]).inc();
    RECONCILIATION_DURATION_SECONDS.observe(duration.as_secs_f64());
}

pub fn record_addon_created(addon: &str) {
    ADDON_OPERATIONS_TOTAL.with_label_values(&[addon, "created"]).inc();
}

pub fn record_addon_deleted(addon: &str) {
    ADDON_OPERATIONS_TOTAL.with_label_values(&[addon, "deleted"]).inc();
}

pub fn record_config_write(action: &str) {
    CONFIG_OPERATIONS_TOTAL.with_label_values(&[action]).inc();
}

pub fn set_stalled_clusters(count: usize) {
    STALLED_CLUSTERS.set(i64::try_from(count).unwrap_or(i64::MAX));
}

/// Gather and encode all metrics in Prometheus text format
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = METRICS_REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(format!("UTF-8 error: {e}")))
}
