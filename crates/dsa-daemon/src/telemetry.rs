//! Telemetry sink for connection and operation events.
//!
//! The engine never decides where telemetry goes. It hands every event to a
//! [`TelemetrySink`] shared by all connections, so sinks must tolerate
//! concurrent appends.
//!
//! Two sinks are provided:
//!
//! - [`InMemoryTelemetry`] keeps every event for later inspection.
//! - [`MetricsTelemetry`] folds events into the Prometheus families of
//!   [`crate::metrics`] and logs each one as a JSON line at `debug`.

use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::metrics::SharedMetricsRegistry;
use crate::protocol::pdu::{AbortReason, InvokeId};
use crate::statistics::OperationStatistics;

/// Receiver of telemetry events.
pub trait TelemetrySink: Send + Sync {
    /// Records one event. Must not block for long and must not fail.
    fn record(&self, event: TelemetryEvent);
}

/// A telemetry event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TelemetryEvent {
    /// Flushed statistics of one invocation.
    Operation(OperationStatistics),
    /// A fault the error mapper did not recognise.
    UnrecognizedFault(FaultEvent),
    /// Outcome of a bind handshake.
    Bind(BindEvent),
    /// An abort PDU was sent.
    Abort(AbortEvent),
    /// A connection finished teardown.
    ConnectionClosed {
        /// Connection that closed.
        connection_id: String,
    },
}

/// Full record of an unrecognized fault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultEvent {
    /// Connection the fault occurred on.
    pub connection_id: String,
    /// Invocation being handled, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoke_id: Option<InvokeId>,
    /// `Display` rendering of the fault.
    pub display: String,
    /// `Debug` rendering of the fault.
    pub debug: String,
    /// Messages of the fault and its sources, outermost first.
    pub chain: Vec<String>,
}

/// How a bind handshake ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindDisposition {
    /// The peer authenticated and the connection is bound.
    Bound,
    /// Authentication failed; a bind error was sent.
    Rejected,
    /// The authenticator faulted; the connection was aborted.
    Faulted,
}

impl BindDisposition {
    /// Returns the metric label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Bound => "bound",
            Self::Rejected => "rejected",
            Self::Faulted => "faulted",
        }
    }
}

/// Bind handshake telemetry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindEvent {
    /// Connection that bound.
    pub connection_id: String,
    /// How the handshake ended.
    pub outcome: BindDisposition,
    /// Time from bind receipt to the bind response.
    pub latency: Duration,
}

/// What caused an abort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortTrigger {
    /// A connection-fatal fault while handling an invocation.
    Fault,
    /// The fragment buffer ceiling was exceeded.
    FragmentCeiling,
    /// The authenticator faulted during bind.
    AuthenticationFault,
}

/// Abort telemetry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbortEvent {
    /// Connection that was aborted.
    pub connection_id: String,
    /// Reason sent on the wire.
    pub reason: AbortReason,
    /// What caused the abort.
    pub trigger: AbortTrigger,
}

// ============================================================================
// In-memory sink
// ============================================================================

/// Sink that keeps every event in memory.
#[derive(Debug, Default)]
pub struct InMemoryTelemetry {
    events: Mutex<Vec<TelemetryEvent>>,
}

impl InMemoryTelemetry {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all events recorded so far.
    #[must_use]
    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events.lock().expect("lock poisoned").clone()
    }

    /// Returns the flushed operation records.
    #[must_use]
    pub fn operations(&self) -> Vec<OperationStatistics> {
        self.events
            .lock()
            .expect("lock poisoned")
            .iter()
            .filter_map(|event| match event {
                TelemetryEvent::Operation(stats) => Some(stats.clone()),
                _ => None,
            })
            .collect()
    }

    /// Returns the unrecognized fault records.
    #[must_use]
    pub fn unrecognized_faults(&self) -> Vec<FaultEvent> {
        self.events
            .lock()
            .expect("lock poisoned")
            .iter()
            .filter_map(|event| match event {
                TelemetryEvent::UnrecognizedFault(fault) => Some(fault.clone()),
                _ => None,
            })
            .collect()
    }

    /// Returns the number of events recorded.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().expect("lock poisoned").len()
    }

    /// Returns `true` if nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TelemetrySink for InMemoryTelemetry {
    fn record(&self, event: TelemetryEvent) {
        self.events.lock().expect("lock poisoned").push(event);
    }
}

// ============================================================================
// Metrics sink
// ============================================================================

/// Sink that updates Prometheus metrics and logs each event.
#[derive(Clone)]
pub struct MetricsTelemetry {
    registry: SharedMetricsRegistry,
}

impl MetricsTelemetry {
    /// Creates a sink backed by the given registry.
    #[must_use]
    pub const fn new(registry: SharedMetricsRegistry) -> Self {
        Self { registry }
    }

    /// Returns the backing registry.
    #[must_use]
    pub const fn registry(&self) -> &SharedMetricsRegistry {
        &self.registry
    }
}

impl TelemetrySink for MetricsTelemetry {
    fn record(&self, event: TelemetryEvent) {
        match serde_json::to_string(&event) {
            Ok(json) => debug!(target: "dsa_daemon::telemetry", event = %json, "telemetry"),
            Err(e) => debug!(error = %e, "telemetry event not serializable"),
        }

        let metrics = self.registry.dsp_metrics();
        match &event {
            TelemetryEvent::Operation(stats) => {
                let latency = stats.duration.unwrap_or_default().as_secs_f64();
                metrics.operation_completed(&stats.opcode.label(), stats.outcome_label(), latency);
            },
            TelemetryEvent::UnrecognizedFault(_) => metrics.unrecognized_fault(),
            TelemetryEvent::Bind(bind) => metrics.bind_completed(bind.outcome.as_str()),
            TelemetryEvent::Abort(abort) => metrics.abort_sent(abort.reason.name()),
            TelemetryEvent::ConnectionClosed { .. } => metrics.connection_closed(),
        }
    }
}
