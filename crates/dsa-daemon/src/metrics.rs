//! Prometheus metrics for the DSP connection engine.
//!
//! # Metrics Families
//!
//! | Metric | Type | Description | Labels |
//! |--------|------|-------------|--------|
//! | `dsa_dsp_operations_total` | Counter | Completed invocations | `operation`, `outcome` |
//! | `dsa_dsp_operation_duration_seconds` | Histogram | Receipt-to-response latency | `operation` |
//! | `dsa_dsp_binds_total` | Counter | Bind attempts | `outcome` |
//! | `dsa_dsp_aborts_total` | Counter | Abort PDUs sent | `reason` |
//! | `dsa_dsp_unrecognized_faults_total` | Counter | Faults of unknown shape | - |
//! | `dsa_dsp_connections_closed_total` | Counter | Connections torn down | - |
//!
//! # Usage
//!
//! ```rust,ignore
//! use dsa_daemon::metrics::MetricsRegistry;
//!
//! let registry = MetricsRegistry::new()?;
//! registry.dsp_metrics().operation_completed("chainedRead", "result", 0.004);
//! let output = registry.encode_text()?;
//! ```

use std::sync::Arc;

use prometheus::{
    Counter, CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use thiserror::Error;

/// Maximum length for label values to prevent denial-of-service via unbounded
/// labels.
pub const MAX_LABEL_VALUE_LEN: usize = 64;

/// Histogram buckets for operation latency (in seconds).
pub const OPERATION_LATENCY_BUCKETS: &[f64] = &[0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0];

/// Errors that can occur during metrics operations.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// Failed to register a metric with Prometheus.
    #[error("failed to register metric: {0}")]
    RegistrationFailed(#[from] prometheus::Error),

    /// Failed to encode metrics output.
    #[error("failed to encode metrics: {0}")]
    EncodingFailed(String),
}

/// Result type for metrics operations.
pub type MetricsResult<T> = Result<T, MetricsError>;

/// DSP engine metrics.
///
/// # Thread Safety
///
/// All metrics use interior mutability and are safe to share across threads.
#[derive(Clone)]
pub struct DspMetrics {
    operations_total: CounterVec,
    operation_duration: HistogramVec,
    binds_total: CounterVec,
    aborts_total: CounterVec,
    unrecognized_faults_total: Counter,
    connections_closed_total: Counter,
}

impl DspMetrics {
    /// Creates the metrics and registers them with the given registry.
    ///
    /// # Errors
    ///
    /// Returns an error if any metric fails to register (e.g., duplicate name).
    pub fn new(registry: &Registry) -> MetricsResult<Self> {
        let operations_total = CounterVec::new(
            Opts::new(
                "dsa_dsp_operations_total",
                "Completed DSP invocations by operation and outcome",
            ),
            &["operation", "outcome"],
        )?;
        registry.register(Box::new(operations_total.clone()))?;

        let operation_duration = HistogramVec::new(
            HistogramOpts::new(
                "dsa_dsp_operation_duration_seconds",
                "Time from request receipt to response",
            )
            .buckets(OPERATION_LATENCY_BUCKETS.to_vec()),
            &["operation"],
        )?;
        registry.register(Box::new(operation_duration.clone()))?;

        let binds_total = CounterVec::new(
            Opts::new("dsa_dsp_binds_total", "DSP bind attempts by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(binds_total.clone()))?;

        let aborts_total = CounterVec::new(
            Opts::new("dsa_dsp_aborts_total", "Abort PDUs sent by reason"),
            &["reason"],
        )?;
        registry.register(Box::new(aborts_total.clone()))?;

        let unrecognized_faults_total = Counter::new(
            "dsa_dsp_unrecognized_faults_total",
            "Faults of unrecognized shape escalated to telemetry",
        )?;
        registry.register(Box::new(unrecognized_faults_total.clone()))?;

        let connections_closed_total = Counter::new(
            "dsa_dsp_connections_closed_total",
            "DSP connections torn down",
        )?;
        registry.register(Box::new(connections_closed_total.clone()))?;

        Ok(Self {
            operations_total,
            operation_duration,
            binds_total,
            aborts_total,
            unrecognized_faults_total,
            connections_closed_total,
        })
    }

    // ========================================================================
    // Operation Metrics
    // ========================================================================

    /// Records a completed invocation.
    ///
    /// # Arguments
    ///
    /// * `operation` - Operation label (e.g., `chainedRead`)
    /// * `outcome` - One of `result`, `error`, `reject`, `abort`
    /// * `latency_secs` - Receipt-to-response latency in seconds
    pub fn operation_completed(&self, operation: &str, outcome: &str, latency_secs: f64) {
        let operation = truncate_label(operation);
        let outcome = truncate_label(outcome);
        self.operations_total
            .with_label_values(&[operation, outcome])
            .inc();
        self.operation_duration
            .with_label_values(&[operation])
            .observe(latency_secs);
    }

    /// Returns the completed invocation count for testing purposes.
    #[must_use]
    pub fn operation_count(&self, operation: &str, outcome: &str) -> f64 {
        let operation = truncate_label(operation);
        let outcome = truncate_label(outcome);
        self.operations_total
            .with_label_values(&[operation, outcome])
            .get()
    }

    // ========================================================================
    // Connection Metrics
    // ========================================================================

    /// Records a bind attempt.
    pub fn bind_completed(&self, outcome: &str) {
        let outcome = truncate_label(outcome);
        self.binds_total.with_label_values(&[outcome]).inc();
    }

    /// Returns the bind count for testing purposes.
    #[must_use]
    pub fn bind_count(&self, outcome: &str) -> f64 {
        let outcome = truncate_label(outcome);
        self.binds_total.with_label_values(&[outcome]).get()
    }

    /// Records an abort PDU.
    pub fn abort_sent(&self, reason: &str) {
        let reason = truncate_label(reason);
        self.aborts_total.with_label_values(&[reason]).inc();
    }

    /// Returns the abort count for testing purposes.
    #[must_use]
    pub fn abort_count(&self, reason: &str) -> f64 {
        let reason = truncate_label(reason);
        self.aborts_total.with_label_values(&[reason]).get()
    }

    /// Records a fault of unrecognized shape.
    pub fn unrecognized_fault(&self) {
        self.unrecognized_faults_total.inc();
    }

    /// Returns the unrecognized fault count for testing purposes.
    #[must_use]
    pub fn unrecognized_fault_count(&self) -> f64 {
        self.unrecognized_faults_total.get()
    }

    /// Records a connection teardown.
    pub fn connection_closed(&self) {
        self.connections_closed_total.inc();
    }
}

/// Metrics registry wrapper that holds the Prometheus registry and the DSP
/// metrics.
#[derive(Clone)]
pub struct MetricsRegistry {
    registry: Registry,
    dsp_metrics: DspMetrics,
}

impl MetricsRegistry {
    /// Creates a new metrics registry with all DSP metrics registered.
    ///
    /// # Errors
    ///
    /// Returns an error if metric registration fails.
    pub fn new() -> MetricsResult<Self> {
        let registry = Registry::new();
        let dsp_metrics = DspMetrics::new(&registry)?;
        Ok(Self {
            registry,
            dsp_metrics,
        })
    }

    /// Returns a reference to the DSP metrics.
    #[must_use]
    pub const fn dsp_metrics(&self) -> &DspMetrics {
        &self.dsp_metrics
    }

    /// Encodes all metrics in Prometheus text format.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub fn encode_text(&self) -> MetricsResult<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| MetricsError::EncodingFailed(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| MetricsError::EncodingFailed(e.to_string()))
    }
}

/// Shared metrics registry.
pub type SharedMetricsRegistry = Arc<MetricsRegistry>;

/// Creates a new shared metrics registry.
///
/// # Errors
///
/// Returns an error if metric registration fails.
pub fn new_shared_registry() -> MetricsResult<SharedMetricsRegistry> {
    Ok(Arc::new(MetricsRegistry::new()?))
}

/// Truncates a label value on a UTF-8 character boundary.
fn truncate_label(value: &str) -> &str {
    if value.len() <= MAX_LABEL_VALUE_LEN {
        return value;
    }
    let mut end = MAX_LABEL_VALUE_LEN;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}
