#![allow(clippy::doc_markdown)]

//! dsa-core - Directory data model for an X.500 Directory System Agent
//!
//! This crate holds the protocol-independent pieces shared by the DSA
//! components: distinguished names, the problem codes and error payloads of
//! the directory abstract service, continuation references produced by
//! distributed name resolution, and the agent's configuration.
//!
//! # Modules
//!
//! - [`config`]: TOML configuration with environment overrides
//! - [`continuation`]: Continuation references and their telemetry summary
//! - [`errors`]: Typed directory error payloads ([`errors::DirectoryError`])
//! - [`names`]: Distinguished names and unique identifiers
//! - [`problems`]: Numeric problem enumerations (security, service, ...)
//! - [`search`]: Distributed search procedures (SCR)

pub mod config;
pub mod continuation;
pub mod errors;
pub mod names;
pub mod problems;
pub mod search;

pub use config::{ConfigError, DsaConfig};
pub use continuation::{ContinuationReference, ContinuationSummary};
pub use errors::DirectoryError;
pub use names::{DistinguishedName, UniqueIdentifier};
