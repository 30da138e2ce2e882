#![allow(clippy::doc_markdown)]
#![allow(clippy::too_long_first_doc_paragraph)]

//! dsa-daemon - DSP connection engine for an X.500 Directory System Agent
//!
//! This library accepts inbound DSA-to-DSA connections carried over IDM,
//! authenticates the binding DSA, and hands chained operations to the
//! operation-processing layer. Encoding, sockets, authentication, and
//! operation execution are collaborators supplied by the embedder through
//! traits.
//!
//! # Runtime Requirements
//!
//! [`protocol::DspConnection::accept`] must be called from within a Tokio
//! runtime; every request is handled on its own task.
//!
//! # Modules
//!
//! - [`protocol`]: PDUs, fault taxonomy, transport seam, and the connection
//!   engine
//! - [`statistics`]: Per-operation statistics records
//! - [`telemetry`]: Telemetry sink trait and implementations
//! - [`metrics`]: Prometheus metrics for the engine
//! - [`store`]: Connection-scoped state cleanup
//! - [`logging`]: Tracing subscriber setup

pub mod logging;
pub mod metrics;
pub mod protocol;
pub mod statistics;
pub mod store;
pub mod telemetry;
