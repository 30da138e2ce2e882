//! Error types for the DSP connection engine.
//!
//! # Error Hierarchy
//!
//! - [`DsaFault`]: every fault that can arise while handling one invocation.
//!   The taxonomy is closed; the error mapper matches it exhaustively.
//! - [`TransportError`]: failures of the IDM transport collaborator.
//! - [`AuthError`]: faults raised by the authentication collaborator (as
//!   opposed to a failed-authentication outcome, which is not an error).
//!
//! # Fault Classes
//!
//! | Class            | Variants                                            | Wire action      |
//! |------------------|-----------------------------------------------------|------------------|
//! | Directory error  | [`DsaFault::Directory`]                              | error PDU        |
//! | Protocol reject  | `DuplicateInvokeId` .. `UnknownError`                | reject PDU       |
//! | Connection-fatal | `UnboundRequest`, `InvalidProtocol`, `ReasonNotSpecified` | abort + unbind |
//! | Unrecognized     | [`DsaFault::Unexpected`]                             | telemetry, abort + unbind |

use std::error::Error as StdError;

use dsa_core::errors::DirectoryError;
use thiserror::Error;

use super::pdu::{InvokeId, OperationCode};

/// Boxed error used for faults of unknown shape.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// A fault raised while handling one invocation.
#[derive(Debug, Error)]
pub enum DsaFault {
    /// An application-level directory error.
    #[error(transparent)]
    Directory(#[from] DirectoryError),

    /// The invoke ID is already in use by an open invocation.
    #[error("duplicate invoke ID {0}")]
    DuplicateInvokeId(InvokeId),

    /// The operation is recognised but not supported.
    #[error("unsupported operation {0}")]
    UnsupportedOperation(OperationCode),

    /// The operation code is not recognised.
    #[error("unknown operation {0}")]
    UnknownOperation(OperationCode),

    /// The PDU could not be decoded.
    #[error("mistyped PDU: {reason}")]
    MistypedPdu {
        /// Decoder diagnostic.
        reason: String,
    },

    /// The argument could not be decoded as the operation's argument type.
    #[error("mistyped argument: {reason}")]
    MistypedArgument {
        /// Decoder diagnostic.
        reason: String,
    },

    /// The DSA lacks the resources to process the request.
    #[error("resource limitation: {reason}")]
    ResourceLimitation {
        /// What was exhausted.
        reason: String,
    },

    /// A generic, named failure that still warrants only a reject.
    #[error("unknown error: {reason}")]
    UnknownError {
        /// Description of the failure.
        reason: String,
    },

    /// A request arrived on a connection that is not bound.
    #[error("request on unbound connection")]
    UnboundRequest,

    /// The peer violated the protocol.
    #[error("invalid protocol: {reason}")]
    InvalidProtocol {
        /// Description of the violation.
        reason: String,
    },

    /// The connection must be aborted for an unspecified reason.
    #[error("connection aborted: {reason}")]
    ReasonNotSpecified {
        /// Description of the cause.
        reason: String,
    },

    /// Any fault whose shape the engine does not recognise.
    #[error("unexpected fault: {0}")]
    Unexpected(#[source] BoxError),
}

impl DsaFault {
    /// Wraps an arbitrary error as an unrecognized fault.
    #[must_use]
    pub fn unexpected(error: impl Into<BoxError>) -> Self {
        Self::Unexpected(error.into())
    }

    /// Creates a mistyped-argument fault.
    #[must_use]
    pub fn mistyped_argument(reason: impl Into<String>) -> Self {
        Self::MistypedArgument {
            reason: reason.into(),
        }
    }

    /// Creates a resource-limitation fault.
    #[must_use]
    pub fn resource_limitation(reason: impl Into<String>) -> Self {
        Self::ResourceLimitation {
            reason: reason.into(),
        }
    }

    /// Returns `true` if this fault ends the connection.
    #[must_use]
    pub const fn is_connection_fatal(&self) -> bool {
        matches!(
            self,
            Self::UnboundRequest
                | Self::InvalidProtocol { .. }
                | Self::ReasonNotSpecified { .. }
                | Self::Unexpected(_)
        )
    }

    /// Returns `true` if this fault is answered with a reject PDU.
    #[must_use]
    pub const fn is_reject(&self) -> bool {
        matches!(
            self,
            Self::DuplicateInvokeId(_)
                | Self::UnsupportedOperation(_)
                | Self::UnknownOperation(_)
                | Self::MistypedPdu { .. }
                | Self::MistypedArgument { .. }
                | Self::ResourceLimitation { .. }
                | Self::UnknownError { .. }
        )
    }

    /// Returns the messages of the fault and all of its sources, outermost
    /// first.
    #[must_use]
    pub fn chain(&self) -> Vec<String> {
        let mut chain = vec![self.to_string()];
        let mut source = StdError::source(self);
        while let Some(err) = source {
            chain.push(err.to_string());
            source = err.source();
        }
        chain
    }
}

/// Failures of the IDM transport collaborator.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The transport is closed; nothing more can be written.
    #[error("transport closed")]
    Closed,

    /// An I/O error on the underlying socket.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The PDU could not be encoded.
    #[error("encoding failed: {reason}")]
    Encoding {
        /// Encoder diagnostic.
        reason: String,
    },
}

/// Faults raised by the authentication collaborator.
#[derive(Debug, Error)]
pub enum AuthError {
    /// A backing service (e.g. storage) failed during verification.
    #[error("authentication backend failed: {reason}")]
    Backend {
        /// Description of the failure.
        reason: String,
    },

    /// Any other fault.
    #[error("authentication fault: {0}")]
    Other(#[from] BoxError),
}
