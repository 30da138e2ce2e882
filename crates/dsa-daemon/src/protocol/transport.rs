//! IDM transport seam.
//!
//! The engine does not own a socket. It talks to an [`IdmTransport`] that
//! frames and encodes PDUs, reassembles fragments, and emits events to a
//! single [`IdmEventListener`].
//!
//! # Listener Slot
//!
//! A transport holds at most one listener. [`IdmTransport::replace_listener`]
//! swaps it atomically and returns the previous one, so re-subscribing can
//! never leave two listeners attached to the same connection.
//! [`IdmTransport::clear_listener`] empties the slot during teardown.
//!
//! # Memory Transport
//!
//! [`MemoryTransport`] is an in-process implementation. Inbound events are
//! injected with `push_*` methods and every outbound PDU is delivered, in
//! write order, to the receiver returned by [`MemoryTransport::new`].

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use bytes::Bytes;
use dsa_core::errors::DirectoryError;
use tokio::sync::mpsc;

use super::error::TransportError;
use super::pdu::{
    AbortReason, DsaBindError, DsaBindResult, ErrorCode, IdmRequest, InvokeId, OperationCode,
    RejectReason,
};

/// Receiver of inbound transport events.
///
/// Callbacks run on the transport's reader and must not block; long work is
/// spawned.
pub trait IdmEventListener: Send + Sync {
    /// A complete request PDU was decoded.
    fn on_request(&self, request: IdmRequest);

    /// `added_bytes` more bytes of an incomplete request are about to be
    /// buffered.
    fn on_fragment(&self, added_bytes: usize);

    /// The peer unbound, or the transport was lost.
    fn on_unbind(&self);
}

/// Outbound half of an IDM connection.
#[async_trait]
pub trait IdmTransport: Send + Sync {
    /// Installs `listener` as the only listener and returns the previous one.
    fn replace_listener(
        &self,
        listener: Arc<dyn IdmEventListener>,
    ) -> Option<Arc<dyn IdmEventListener>>;

    /// Removes the listener, if any.
    fn clear_listener(&self);

    /// Bytes of incomplete requests currently buffered.
    fn enqueued_bytes(&self) -> usize;

    /// Writes a DSA bind result.
    async fn write_bind_result(&self, result: DsaBindResult) -> Result<(), TransportError>;

    /// Writes a DSA bind error.
    async fn write_bind_error(&self, error: DsaBindError) -> Result<(), TransportError>;

    /// Writes an operation result.
    async fn write_result(
        &self,
        invoke_id: InvokeId,
        opcode: &OperationCode,
        result: Bytes,
    ) -> Result<(), TransportError>;

    /// Writes a directory error.
    async fn write_error(
        &self,
        invoke_id: InvokeId,
        code: ErrorCode,
        error: &DirectoryError,
    ) -> Result<(), TransportError>;

    /// Writes a reject for an invocation.
    async fn write_reject(
        &self,
        invoke_id: InvokeId,
        reason: RejectReason,
    ) -> Result<(), TransportError>;

    /// Writes an abort for the whole association.
    async fn write_abort(&self, reason: AbortReason) -> Result<(), TransportError>;

    /// Closes the underlying connection.
    async fn close(&self) -> Result<(), TransportError>;
}

// ============================================================================
// MemoryTransport
// ============================================================================

/// A PDU written by the engine.
#[derive(Debug, Clone)]
pub enum OutboundPdu {
    /// DSA bind result.
    BindResult(DsaBindResult),
    /// DSA bind error.
    BindError(DsaBindError),
    /// Operation result.
    Result {
        /// Invocation answered.
        invoke_id: InvokeId,
        /// Operation code echoed back.
        opcode: OperationCode,
        /// Encoded result.
        result: Bytes,
    },
    /// Directory error.
    Error {
        /// Invocation answered.
        invoke_id: InvokeId,
        /// Error code.
        code: ErrorCode,
        /// Error payload.
        error: DirectoryError,
    },
    /// Reject.
    Reject {
        /// Invocation rejected.
        invoke_id: InvokeId,
        /// Reject reason.
        reason: RejectReason,
    },
    /// Abort.
    Abort(AbortReason),
}

impl OutboundPdu {
    /// Returns the invocation this PDU answers, if it answers one.
    #[must_use]
    pub const fn invoke_id(&self) -> Option<InvokeId> {
        match self {
            Self::Result { invoke_id, .. }
            | Self::Error { invoke_id, .. }
            | Self::Reject { invoke_id, .. } => Some(*invoke_id),
            Self::BindResult(_) | Self::BindError(_) | Self::Abort(_) => None,
        }
    }
}

/// Receiver of PDUs written to a [`MemoryTransport`].
pub type OutboundReceiver = mpsc::UnboundedReceiver<OutboundPdu>;

/// In-process IDM transport.
pub struct MemoryTransport {
    listener: RwLock<Option<Arc<dyn IdmEventListener>>>,
    outbound: mpsc::UnboundedSender<OutboundPdu>,
    enqueued: AtomicUsize,
    closed: AtomicBool,
    close_calls: AtomicUsize,
    fail_writes: AtomicBool,
}

impl MemoryTransport {
    /// Creates a transport and the receiver of everything written to it.
    #[must_use]
    pub fn new() -> (Self, OutboundReceiver) {
        let (outbound, rx) = mpsc::unbounded_channel();
        let transport = Self {
            listener: RwLock::new(None),
            outbound,
            enqueued: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            close_calls: AtomicUsize::new(0),
            fail_writes: AtomicBool::new(false),
        };
        (transport, rx)
    }

    /// Makes every subsequent write fail with an I/O error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Returns `true` once [`IdmTransport::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Number of times [`IdmTransport::close`] was called.
    #[must_use]
    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    /// Returns `true` if a listener is installed.
    #[must_use]
    pub fn has_listener(&self) -> bool {
        self.listener.read().expect("lock poisoned").is_some()
    }

    /// Delivers a complete request. Buffered fragment bytes are released.
    pub fn push_request(&self, request: IdmRequest) {
        self.enqueued.store(0, Ordering::SeqCst);
        if let Some(listener) = self.current_listener() {
            listener.on_request(request);
        }
    }

    /// Reports a fragment of `added_bytes`, then buffers it.
    pub fn push_fragment(&self, added_bytes: usize) {
        if let Some(listener) = self.current_listener() {
            listener.on_fragment(added_bytes);
        }
        if !self.is_closed() {
            self.enqueued.fetch_add(added_bytes, Ordering::SeqCst);
        }
    }

    /// Delivers an unbind from the peer.
    pub fn push_unbind(&self) {
        if let Some(listener) = self.current_listener() {
            listener.on_unbind();
        }
    }

    // Callbacks run without holding the slot lock so a listener may clear
    // or replace itself.
    fn current_listener(&self) -> Option<Arc<dyn IdmEventListener>> {
        self.listener.read().expect("lock poisoned").clone()
    }

    fn send(&self, pdu: OutboundPdu) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "write failed",
            )));
        }
        self.outbound.send(pdu).map_err(|_| TransportError::Closed)
    }
}

#[async_trait]
impl IdmTransport for MemoryTransport {
    fn replace_listener(
        &self,
        listener: Arc<dyn IdmEventListener>,
    ) -> Option<Arc<dyn IdmEventListener>> {
        self.listener
            .write()
            .expect("lock poisoned")
            .replace(listener)
    }

    fn clear_listener(&self) {
        self.listener.write().expect("lock poisoned").take();
    }

    fn enqueued_bytes(&self) -> usize {
        self.enqueued.load(Ordering::SeqCst)
    }

    async fn write_bind_result(&self, result: DsaBindResult) -> Result<(), TransportError> {
        self.send(OutboundPdu::BindResult(result))
    }

    async fn write_bind_error(&self, error: DsaBindError) -> Result<(), TransportError> {
        self.send(OutboundPdu::BindError(error))
    }

    async fn write_result(
        &self,
        invoke_id: InvokeId,
        opcode: &OperationCode,
        result: Bytes,
    ) -> Result<(), TransportError> {
        self.send(OutboundPdu::Result {
            invoke_id,
            opcode: opcode.clone(),
            result,
        })
    }

    async fn write_error(
        &self,
        invoke_id: InvokeId,
        code: ErrorCode,
        error: &DirectoryError,
    ) -> Result<(), TransportError> {
        self.send(OutboundPdu::Error {
            invoke_id,
            code,
            error: error.clone(),
        })
    }

    async fn write_reject(
        &self,
        invoke_id: InvokeId,
        reason: RejectReason,
    ) -> Result<(), TransportError> {
        self.send(OutboundPdu::Reject { invoke_id, reason })
    }

    async fn write_abort(&self, reason: AbortReason) -> Result<(), TransportError> {
        self.send(OutboundPdu::Abort(reason))
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        self.enqueued.store(0, Ordering::SeqCst);
        Ok(())
    }
}
