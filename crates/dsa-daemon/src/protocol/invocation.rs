//! Invocation registry.
//!
//! Tracks the invocations open on one connection, keyed by invoke ID.
//!
//! # Invariants
//!
//! - At most one invocation per invoke ID is open at any time. The
//!   duplicate check and the insert happen under the same write lock, so two
//!   racing requests with the same ID yield exactly one registration.
//! - Every successful registration returns an [`InvocationGuard`]; dropping
//!   the guard removes the entry. Deregistration therefore runs exactly once
//!   on every exit path, including unwinding.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::trace;

use super::error::DsaFault;
use super::pdu::{InvokeId, OperationCode};

/// Capacity of each invocation's event channel.
const EVENT_CHANNEL_CAPACITY: usize = 4;

/// Cross-cutting signal delivered to an open invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationEvent {
    /// The requester asked for the operation to be abandoned.
    Abandon,
}

#[derive(Debug)]
struct InvocationRecord {
    opcode: OperationCode,
    started_at: Instant,
    events: broadcast::Sender<InvocationEvent>,
}

/// Snapshot of an open invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenInvocation {
    /// Invoke ID.
    pub invoke_id: InvokeId,
    /// Operation code.
    pub opcode: OperationCode,
    /// When the invocation was registered.
    pub started_at: Instant,
}

type InvocationMap = HashMap<InvokeId, InvocationRecord>;

/// Registry of the invocations open on one connection.
#[derive(Debug, Clone, Default)]
pub struct InvocationRegistry {
    invocations: Arc<RwLock<InvocationMap>>,
}

impl InvocationRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an invocation unless its invoke ID is already open.
    ///
    /// # Errors
    ///
    /// Returns [`DsaFault::DuplicateInvokeId`] if an invocation with the same
    /// ID is open.
    pub fn try_register(
        &self,
        invoke_id: InvokeId,
        opcode: &OperationCode,
    ) -> Result<InvocationGuard, DsaFault> {
        let mut invocations = self.invocations.write().expect("lock poisoned");
        if invocations.contains_key(&invoke_id) {
            return Err(DsaFault::DuplicateInvokeId(invoke_id));
        }
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        invocations.insert(
            invoke_id,
            InvocationRecord {
                opcode: opcode.clone(),
                started_at: Instant::now(),
                events: events.clone(),
            },
        );
        trace!(invoke_id = %invoke_id, open = invocations.len(), "invocation registered");
        Ok(InvocationGuard {
            invocations: Arc::clone(&self.invocations),
            invoke_id,
            events,
        })
    }

    /// Delivers `event` to the invocation with the given ID.
    ///
    /// Returns `true` if the invocation is open and has at least one
    /// subscriber.
    pub fn signal(&self, invoke_id: InvokeId, event: InvocationEvent) -> bool {
        self.invocations
            .read()
            .expect("lock poisoned")
            .get(&invoke_id)
            .is_some_and(|record| record.events.send(event).is_ok())
    }

    /// Returns `true` if an invocation with the given ID is open.
    #[must_use]
    pub fn contains(&self, invoke_id: InvokeId) -> bool {
        self.invocations
            .read()
            .expect("lock poisoned")
            .contains_key(&invoke_id)
    }

    /// Number of open invocations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.invocations.read().expect("lock poisoned").len()
    }

    /// Returns `true` if no invocation is open.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the open invocations, ordered by invoke ID.
    #[must_use]
    pub fn open_invocations(&self) -> Vec<OpenInvocation> {
        let mut open: Vec<_> = self
            .invocations
            .read()
            .expect("lock poisoned")
            .iter()
            .map(|(invoke_id, record)| OpenInvocation {
                invoke_id: *invoke_id,
                opcode: record.opcode.clone(),
                started_at: record.started_at,
            })
            .collect();
        open.sort_by_key(|invocation| invocation.invoke_id);
        open
    }
}

/// Registration of one open invocation. Dropping it deregisters.
#[derive(Debug)]
pub struct InvocationGuard {
    invocations: Arc<RwLock<InvocationMap>>,
    invoke_id: InvokeId,
    events: broadcast::Sender<InvocationEvent>,
}

impl InvocationGuard {
    /// The registered invoke ID.
    #[must_use]
    pub const fn invoke_id(&self) -> InvokeId {
        self.invoke_id
    }

    /// Subscribes to events signalled to this invocation.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<InvocationEvent> {
        self.events.subscribe()
    }
}

impl Drop for InvocationGuard {
    fn drop(&mut self) {
        // Never panic in drop; a poisoned map is still cleaned up.
        let mut invocations = match self.invocations.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        invocations.remove(&self.invoke_id);
        trace!(invoke_id = %self.invoke_id, open = invocations.len(), "invocation deregistered");
    }
}
