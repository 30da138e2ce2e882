//! DSP over IDM.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │              DspConnection               │  connection
//! ├──────────────┬─────────────┬─────────────┤
//! │ BindControl  │ Invocations │ FragGuard   │  bind, invocation, fragment_guard
//! ├──────────────┴─────┬───────┴─────────────┤
//! │  map_fault         │ OperationDispatcher │  error_mapper, dispatch
//! ├────────────────────┴─────────────────────┤
//! │               IdmTransport               │  transport
//! └──────────────────────────────────────────┘
//! ```
//!
//! # Module Overview
//!
//! - [`pdu`]: Invoke IDs, operation codes, error codes, reject and abort
//!   reasons, bind PDUs
//! - [`error`]: [`DsaFault`], [`TransportError`], [`AuthError`]
//! - [`transport`]: [`IdmTransport`], [`IdmEventListener`],
//!   [`MemoryTransport`]
//! - [`invocation`]: [`InvocationRegistry`]
//! - [`error_mapper`]: [`map_fault`]
//! - [`fragment_guard`]: [`FragmentGuard`]
//! - [`bind`]: [`Authenticator`], [`BindController`]
//! - [`dispatch`]: [`OperationDispatcher`]
//! - [`connection`]: [`DspConnection`]
//!
//! # Security Considerations
//!
//! - A failed bind is answered only with `noInformation`, after a randomised
//!   minimum delay
//! - Buffered fragment bytes are bounded per connection; the bound is
//!   checked on every fragment, before the bytes are buffered
//! - Requests are refused until the bind has succeeded
//! - Every fault, including a panic in the dispatcher, is answered on the
//!   wire; faults of unknown shape always reach telemetry

pub mod bind;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod error_mapper;
pub mod fragment_guard;
pub mod invocation;
pub mod pdu;
pub mod transport;

pub use bind::{Authenticator, BindController, BindOutcome, BindReport, BindTiming};
pub use connection::{ConnectionId, ConnectionServices, DspConnection};
pub use dispatch::{OperationContext, OperationDispatcher, OperationOutcome};
pub use error::{AuthError, DsaFault, TransportError};
pub use error_mapper::{MappedFault, WireAction, map_fault};
pub use fragment_guard::{FragmentGuard, FragmentVerdict};
pub use invocation::{InvocationEvent, InvocationGuard, InvocationRegistry};
pub use transport::{IdmEventListener, IdmTransport, MemoryTransport, OutboundPdu};
