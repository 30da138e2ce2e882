//! DSP connection engine.
//!
//! A [`DspConnection`] owns one inbound DSP association from bind to
//! teardown. It subscribes to its transport, runs the bind handshake, and
//! answers every request with exactly one of result, error, reject, or
//! abort.
//!
//! # Request Lifecycle
//!
//! ```text
//! request ─▶ open statistics ─▶ register invoke ID ──dup──▶ reject
//!                                   │
//!                                   ▼
//!                      bound? known opcode? ──no──▶ map fault
//!                                   │
//!                                   ▼
//!                               dispatch ──fault/panic──▶ map fault
//!                                   │
//!                                   ▼
//!                             write result
//!                                   │
//!            deregister (guard drop) ─▶ flush statistics
//! ```
//!
//! Each request runs in its own task, so a slow operation never holds up
//! another invocation on the same connection.
//!
//! # Teardown
//!
//! Teardown runs at most once per connection, whether it is triggered by
//! the peer's unbind, a failed bind, a connection-fatal fault, or the
//! fragment guard. It clears the listener slot, deletes connection-scoped
//! state (best effort), and closes the transport.
//!
//! The connection stops accepting requests as soon as an abort or unbind is
//! decided, before the teardown task runs. A request completed after the
//! fragment guard trips never reaches the dispatcher.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use bytes::Bytes;
use dsa_core::config::DsaConfig;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::bind::{Authenticator, BindController, BindTiming};
use super::dispatch::{
    OperationContext, OperationDispatcher, OperationOutcome, dispatch_catching_panics,
};
use super::error::DsaFault;
use super::error_mapper::{WireAction, map_fault};
use super::fragment_guard::{FragmentGuard, FragmentVerdict};
use super::invocation::{InvocationEvent, InvocationGuard, InvocationRegistry};
use super::pdu::{
    AbortReason, BoundIdentity, DsaBindArgument, IdmRequest, InvokeId, OperationCode,
};
use super::transport::{IdmEventListener, IdmTransport};
use crate::statistics::OperationStatistics;
use crate::store::ConnectionStore;
use crate::telemetry::{
    AbortEvent, AbortTrigger, BindDisposition, BindEvent, TelemetryEvent, TelemetrySink,
};

/// Stable identifier of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Generates a fresh identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Collaborators shared by every connection of a DSA.
#[derive(Clone)]
pub struct ConnectionServices {
    /// Verifies bind credentials.
    pub authenticator: Arc<dyn Authenticator>,
    /// Executes chained operations.
    pub dispatcher: Arc<dyn OperationDispatcher>,
    /// Holds connection-scoped state.
    pub store: Arc<dyn ConnectionStore>,
    /// Receives statistics and events.
    pub telemetry: Arc<dyn TelemetrySink>,
}

/// Handle to a live DSP connection.
#[derive(Clone)]
pub struct DspConnection {
    inner: Arc<ConnectionInner>,
}

impl DspConnection {
    /// Accepts a connection whose transport has just delivered `argument`.
    ///
    /// Subscribes to the transport and starts the bind handshake in the
    /// background; returns immediately.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    #[must_use]
    pub fn accept(
        transport: Arc<dyn IdmTransport>,
        argument: DsaBindArgument,
        config: &DsaConfig,
        services: ConnectionServices,
    ) -> Self {
        let id = ConnectionId::new();
        let (closed_tx, _) = watch::channel(false);
        let inner = Arc::new(ConnectionInner {
            id,
            id_string: id.to_string(),
            runtime: Handle::current(),
            transport,
            bind: BindController::new(
                Arc::clone(&services.authenticator),
                BindTiming::from_config(&config.bind),
            ),
            services,
            registry: InvocationRegistry::new(),
            fragment_guard: FragmentGuard::new(config.idm.buffer_size),
            identity: RwLock::new(None),
            bound: AtomicBool::new(false),
            closing: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            closed_tx,
        });

        let listener = Arc::new(ConnectionListener {
            inner: Arc::clone(&inner),
        });
        if inner.transport.replace_listener(listener).is_some() {
            debug!(connection_id = %id, "replaced existing transport listener");
        }

        let bind_inner = Arc::clone(&inner);
        inner.runtime.spawn(async move {
            bind_inner.run_bind(argument).await;
        });

        debug!(connection_id = %id, "DSP connection accepted");
        Self { inner }
    }

    /// The connection's identifier.
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.inner.id
    }

    /// Returns `true` once the bind has succeeded.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.inner.is_bound()
    }

    /// Identity established by the bind, if any.
    #[must_use]
    pub fn bound_identity(&self) -> Option<BoundIdentity> {
        self.inner.identity.read().expect("lock poisoned").clone()
    }

    /// Returns `true` once teardown has started.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// The connection's invocation registry.
    #[must_use]
    pub fn invocations(&self) -> &InvocationRegistry {
        &self.inner.registry
    }

    /// Signals an abandon to an open invocation.
    ///
    /// Returns `true` if the invocation was open and listening.
    pub fn abandon(&self, invoke_id: InvokeId) -> bool {
        self.inner
            .registry
            .signal(invoke_id, InvocationEvent::Abandon)
    }

    /// Tears the connection down from the local side.
    pub async fn unbind(&self) {
        self.inner.teardown().await;
    }

    /// Waits until teardown has finished.
    pub async fn wait_closed(&self) {
        let mut closed = self.inner.closed_tx.subscribe();
        // The sender lives in `inner`, so the channel cannot close first.
        let _ = closed.wait_for(|closed| *closed).await;
    }
}

impl fmt::Debug for DspConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DspConnection")
            .field("id", &self.inner.id)
            .field("bound", &self.inner.is_bound())
            .field("closed", &self.inner.is_closed())
            .field("open_invocations", &self.inner.registry.len())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Engine internals
// ============================================================================

struct ConnectionInner {
    id: ConnectionId,
    id_string: String,
    runtime: Handle,
    transport: Arc<dyn IdmTransport>,
    services: ConnectionServices,
    bind: BindController,
    registry: InvocationRegistry,
    fragment_guard: FragmentGuard,
    identity: RwLock<Option<BoundIdentity>>,
    bound: AtomicBool,
    /// Set as soon as an abort or unbind is decided, before teardown runs.
    closing: AtomicBool,
    closed: AtomicBool,
    closed_tx: watch::Sender<bool>,
}

impl ConnectionInner {
    fn is_bound(&self) -> bool {
        self.bound.load(Ordering::SeqCst)
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }

    /// Marks the connection as closing. Returns `true` for the first caller.
    fn begin_closing(&self) -> bool {
        !self.closing.swap(true, Ordering::SeqCst)
    }

    fn establish(&self, identity: BoundIdentity) {
        // A connection aborted mid-bind stays unbound.
        if self.is_closing() {
            return;
        }
        *self.identity.write().expect("lock poisoned") = Some(identity);
        self.bound.store(true, Ordering::SeqCst);
    }

    async fn run_bind(self: Arc<Self>, argument: DsaBindArgument) {
        let report = self
            .bind
            .run(
                &self.id_string,
                self.transport.as_ref(),
                &argument,
                |identity| self.establish(identity),
            )
            .await;

        self.services
            .telemetry
            .record(TelemetryEvent::Bind(BindEvent {
                connection_id: self.id_string.clone(),
                outcome: report.disposition,
                latency: report.latency,
            }));
        if report.disposition == BindDisposition::Faulted {
            self.record_abort(AbortReason::ReasonNotSpecified, AbortTrigger::AuthenticationFault);
        }
        if report.requires_teardown {
            self.teardown().await;
        }
    }

    async fn handle_request(self: Arc<Self>, request: IdmRequest) {
        let IdmRequest {
            invoke_id,
            opcode,
            argument,
        } = request;
        // No await separates this check from dispatch.
        if self.is_closing() {
            debug!(
                connection_id = %self.id,
                invoke_id = %invoke_id,
                "request dropped; connection closing"
            );
            return;
        }
        let started = Instant::now();
        let mut stats = OperationStatistics::dsp(self.id_string.clone(), invoke_id, opcode.clone());
        debug!(
            connection_id = %self.id,
            invoke_id = %invoke_id,
            opcode = %opcode.label(),
            "request received"
        );

        match self.registry.try_register(invoke_id, &opcode) {
            Ok(guard) => {
                match self.execute(&guard, &opcode, argument).await {
                    Ok(outcome) => {
                        if let Some(request_stats) = outcome.request {
                            stats.merge_request(request_stats);
                        }
                        if let Some(outcome_stats) = outcome.outcome {
                            stats.merge_outcome(outcome_stats);
                        }
                        if let Err(e) = self
                            .transport
                            .write_result(invoke_id, &opcode, outcome.result)
                            .await
                        {
                            warn!(
                                connection_id = %self.id,
                                invoke_id = %invoke_id,
                                error = %e,
                                "failed to write result"
                            );
                        }
                    },
                    Err(fault) => self.answer_fault(fault, invoke_id, &mut stats).await,
                }
                drop(guard);
            },
            Err(fault) => self.answer_fault(fault, invoke_id, &mut stats).await,
        }

        stats.duration = Some(started.elapsed());
        debug!(
            connection_id = %self.id,
            invoke_id = %invoke_id,
            outcome = stats.outcome_label(),
            "request completed"
        );
        self.services
            .telemetry
            .record(TelemetryEvent::Operation(stats));
    }

    async fn execute(
        &self,
        guard: &InvocationGuard,
        opcode: &OperationCode,
        argument: Bytes,
    ) -> Result<OperationOutcome, DsaFault> {
        if !self.is_bound() {
            return Err(DsaFault::UnboundRequest);
        }
        let operation = match opcode {
            OperationCode::Local(_) => opcode
                .operation()
                .ok_or_else(|| DsaFault::UnknownOperation(opcode.clone()))?,
            OperationCode::Global(_) => return Err(DsaFault::UnsupportedOperation(opcode.clone())),
        };
        let ctx = OperationContext {
            connection_id: self.id_string.clone(),
            invoke_id: guard.invoke_id(),
            opcode: opcode.clone(),
            operation,
            bound_identity: self.identity.read().expect("lock poisoned").clone(),
            events: guard.subscribe(),
        };
        dispatch_catching_panics(self.services.dispatcher.as_ref(), ctx, argument).await
    }

    async fn answer_fault(
        &self,
        fault: DsaFault,
        invoke_id: InvokeId,
        stats: &mut OperationStatistics,
    ) {
        debug!(
            connection_id = %self.id,
            invoke_id = %invoke_id,
            fault = %fault,
            "invocation faulted"
        );
        let mapped = map_fault(fault, &self.id_string, Some(invoke_id));
        if let Some(event) = mapped.unrecognized {
            error!(
                connection_id = %self.id,
                invoke_id = %invoke_id,
                fault = %event.display,
                chain = ?event.chain,
                "unrecognized fault; aborting connection"
            );
            self.services
                .telemetry
                .record(TelemetryEvent::UnrecognizedFault(event));
        }
        stats.merge_outcome(mapped.statistics);

        let written = match mapped.action {
            WireAction::Error { code, error } => {
                self.transport.write_error(invoke_id, code, &error).await
            },
            WireAction::Reject(reason) => self.transport.write_reject(invoke_id, reason).await,
            WireAction::Abort(reason) => {
                if self.begin_closing() {
                    self.abort(reason, AbortTrigger::Fault).await;
                }
                return;
            },
        };
        if let Err(e) = written {
            warn!(
                connection_id = %self.id,
                invoke_id = %invoke_id,
                error = %e,
                "failed to write fault response"
            );
        }
    }

    async fn abort(&self, reason: AbortReason, trigger: AbortTrigger) {
        info!(
            connection_id = %self.id,
            reason = reason.name(),
            ?trigger,
            "aborting connection"
        );
        if let Err(e) = self.transport.write_abort(reason).await {
            warn!(connection_id = %self.id, error = %e, "failed to write abort");
        }
        self.record_abort(reason, trigger);
        self.teardown().await;
    }

    fn record_abort(&self, reason: AbortReason, trigger: AbortTrigger) {
        self.services
            .telemetry
            .record(TelemetryEvent::Abort(AbortEvent {
                connection_id: self.id_string.clone(),
                reason,
                trigger,
            }));
    }

    async fn teardown(&self) {
        self.closing.store(true, Ordering::SeqCst);
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.transport.clear_listener();

        match self
            .services
            .store
            .delete_connection_state(&self.id_string)
            .await
        {
            Ok(deleted) => {
                debug!(connection_id = %self.id, deleted, "connection state deleted");
            },
            Err(e) => {
                warn!(connection_id = %self.id, error = %e, "failed to delete connection state");
            },
        }

        match self.transport.close().await {
            Ok(()) => info!(connection_id = %self.id, "DSP connection closed"),
            Err(e) => warn!(connection_id = %self.id, error = %e, "failed to close transport"),
        }

        self.services
            .telemetry
            .record(TelemetryEvent::ConnectionClosed {
                connection_id: self.id_string.clone(),
            });
        self.closed_tx.send_replace(true);
    }
}

/// Transport listener installed by [`DspConnection::accept`].
struct ConnectionListener {
    inner: Arc<ConnectionInner>,
}

impl IdmEventListener for ConnectionListener {
    fn on_request(&self, request: IdmRequest) {
        if self.inner.is_closing() {
            debug!(
                connection_id = %self.inner.id,
                invoke_id = %request.invoke_id,
                "request ignored; connection closing"
            );
            return;
        }
        let inner = Arc::clone(&self.inner);
        self.inner.runtime.spawn(inner.handle_request(request));
    }

    fn on_fragment(&self, added_bytes: usize) {
        if self.inner.is_closing() {
            return;
        }
        let enqueued = self.inner.transport.enqueued_bytes();
        if let FragmentVerdict::Abort(reason) =
            self.inner.fragment_guard.observe(enqueued, added_bytes)
        {
            warn!(
                connection_id = %self.inner.id,
                enqueued,
                added_bytes,
                ceiling = self.inner.fragment_guard.ceiling(),
                "fragment buffer ceiling exceeded"
            );
            if !self.inner.begin_closing() {
                return;
            }
            let inner = Arc::clone(&self.inner);
            self.inner.runtime.spawn(async move {
                inner.abort(reason, AbortTrigger::FragmentCeiling).await;
            });
        }
    }

    fn on_unbind(&self) {
        debug!(connection_id = %self.inner.id, "peer unbound");
        self.inner.begin_closing();
        let inner = Arc::clone(&self.inner);
        self.inner.runtime.spawn(async move {
            inner.teardown().await;
        });
    }
}
