//! Operation dispatch seam.
//!
//! The engine hands each accepted invocation to an [`OperationDispatcher`],
//! which decodes the argument, executes the chained operation, and returns
//! the encoded result together with optional statistics fragments. Faults
//! are returned as [`DsaFault`]; panics are caught by
//! [`dispatch_catching_panics`] and surface as [`DsaFault::Unexpected`].

use std::any::Any;
use std::panic::AssertUnwindSafe;

use async_trait::async_trait;
use bytes::Bytes;
use futures::FutureExt;
use tokio::sync::broadcast;

use super::error::DsaFault;
use super::invocation::InvocationEvent;
use super::pdu::{BoundIdentity, DspOperation, InvokeId, OperationCode};
use crate::statistics::{OutcomeStatistics, RequestStatistics};

/// Everything a dispatcher knows about the invocation it is executing.
#[derive(Debug)]
pub struct OperationContext {
    /// Connection the request arrived on.
    pub connection_id: String,
    /// Invoke ID chosen by the peer.
    pub invoke_id: InvokeId,
    /// Operation code as received.
    pub opcode: OperationCode,
    /// Chained operation the code names.
    pub operation: DspOperation,
    /// Identity the connection is bound as.
    pub bound_identity: Option<BoundIdentity>,
    /// Signals sent to this invocation (e.g. abandon).
    pub events: broadcast::Receiver<InvocationEvent>,
}

impl OperationContext {
    /// Returns `true` if an abandon has been signalled and not yet consumed.
    pub fn abandon_requested(&mut self) -> bool {
        loop {
            match self.events.try_recv() {
                Ok(InvocationEvent::Abandon) => return true,
                Err(broadcast::error::TryRecvError::Lagged(_)) => {},
                Err(_) => return false,
            }
        }
    }
}

/// Successful outcome of a dispatched operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationOutcome {
    /// Encoded operation result.
    pub result: Bytes,
    /// Request summary to merge into the statistics record.
    pub request: Option<RequestStatistics>,
    /// Outcome summary to merge into the statistics record.
    pub outcome: Option<OutcomeStatistics>,
}

impl OperationOutcome {
    /// An outcome carrying only the encoded result.
    #[must_use]
    pub fn new(result: impl Into<Bytes>) -> Self {
        Self {
            result: result.into(),
            ..Self::default()
        }
    }

    /// Attaches a request summary.
    #[must_use]
    pub fn with_request(mut self, request: RequestStatistics) -> Self {
        self.request = Some(request);
        self
    }

    /// Attaches an outcome summary.
    #[must_use]
    pub fn with_outcome(mut self, outcome: OutcomeStatistics) -> Self {
        self.outcome = Some(outcome);
        self
    }
}

/// Executes chained operations.
#[async_trait]
pub trait OperationDispatcher: Send + Sync {
    /// Executes one invocation.
    ///
    /// # Errors
    ///
    /// Returns the [`DsaFault`] that should answer the invocation.
    async fn dispatch(
        &self,
        ctx: OperationContext,
        argument: Bytes,
    ) -> Result<OperationOutcome, DsaFault>;
}

/// Runs `dispatcher`, converting a panic into [`DsaFault::Unexpected`].
pub async fn dispatch_catching_panics(
    dispatcher: &dyn OperationDispatcher,
    ctx: OperationContext,
    argument: Bytes,
) -> Result<OperationOutcome, DsaFault> {
    match AssertUnwindSafe(dispatcher.dispatch(ctx, argument))
        .catch_unwind()
        .await
    {
        Ok(outcome) => outcome,
        Err(payload) => Err(DsaFault::unexpected(format!(
            "operation dispatcher panicked: {}",
            panic_message(payload.as_ref())
        ))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}
