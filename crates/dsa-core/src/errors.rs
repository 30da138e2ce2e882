//! Directory errors.
//!
//! These are the application-level outcomes defined by the directory
//! abstract service. Every variant always produces a well-formed error PDU
//! back to the peer; protocol-level rejects and aborts are modelled
//! separately by the connection engine.
//!
//! # Error Hierarchy
//!
//! - [`DirectoryError::Abandoned`]: the operation was abandoned
//! - [`DirectoryError::AbandonFailed`]: an abandon request failed
//! - [`DirectoryError::Attribute`]: one or more attribute problems
//! - [`DirectoryError::Name`]: name resolution failed
//! - [`DirectoryError::Referral`]: the operation should continue elsewhere
//! - [`DirectoryError::Security`]: access or authentication problem
//! - [`DirectoryError::Service`]: the DSA cannot provide the service
//! - [`DirectoryError::Update`]: a modification was refused

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::continuation::ContinuationReference;
use crate::names::DistinguishedName;
use crate::problems::{
    AbandonProblem, AttributeProblem, NameProblem, SecurityProblem, ServiceProblem, UpdateProblem,
};

/// One problem reported against one attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeProblemItem {
    /// Attribute type the problem refers to.
    pub attribute_type: String,
    /// The problem itself.
    pub problem: AttributeProblem,
    /// The offending value, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// Attribute information attached to an update error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AttributeInfo {
    /// Only the attribute type is reported.
    AttributeType(String),
    /// The attribute type with the values involved.
    Attribute {
        /// Attribute type.
        attribute_type: String,
        /// Values involved.
        values: Vec<String>,
    },
}

impl AttributeInfo {
    /// Returns the attribute type this item refers to.
    #[must_use]
    pub fn attribute_type(&self) -> &str {
        match self {
            Self::AttributeType(t) | Self::Attribute {
                attribute_type: t, ..
            } => t,
        }
    }
}

/// A typed directory error.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "error", rename_all = "camelCase")]
pub enum DirectoryError {
    /// The operation was abandoned at the requester's request.
    #[error("operation abandoned")]
    Abandoned,

    /// An abandon request could not be honored.
    #[error("abandon failed: {problem}")]
    AbandonFailed {
        /// Why the abandon failed.
        problem: AbandonProblem,
        /// Invoke ID named by the abandon request.
        operation: i64,
    },

    /// One or more attribute problems.
    #[error("attribute error on {object}: {} problem(s)", .problems.len())]
    Attribute {
        /// Entry the problems refer to.
        object: DistinguishedName,
        /// The individual problems.
        problems: Vec<AttributeProblemItem>,
    },

    /// Name resolution failed.
    #[error("name error: {problem}")]
    Name {
        /// The problem encountered.
        problem: NameProblem,
        /// Longest prefix of the target name that was resolved.
        matched: DistinguishedName,
    },

    /// The operation must continue at another DSA.
    #[error("referral to {} access point(s)", .candidate.access_points.len())]
    Referral {
        /// Where the operation can continue.
        candidate: Box<ContinuationReference>,
    },

    /// An access-control or authentication problem.
    #[error("security error: {problem}")]
    Security {
        /// The problem encountered.
        problem: SecurityProblem,
    },

    /// The DSA cannot provide the requested service.
    #[error("service error: {problem}")]
    Service {
        /// The problem encountered.
        problem: ServiceProblem,
    },

    /// A modification was refused.
    #[error("update error: {problem}")]
    Update {
        /// The problem encountered.
        problem: UpdateProblem,
        /// Attributes involved in the problem.
        #[serde(default)]
        attribute_info: Vec<AttributeInfo>,
    },
}

impl DirectoryError {
    /// Creates a security error.
    #[must_use]
    pub const fn security(problem: SecurityProblem) -> Self {
        Self::Security { problem }
    }

    /// Creates a service error.
    #[must_use]
    pub const fn service(problem: ServiceProblem) -> Self {
        Self::Service { problem }
    }

    /// Creates a name error.
    #[must_use]
    pub const fn name(problem: NameProblem, matched: DistinguishedName) -> Self {
        Self::Name { problem, matched }
    }

    /// Creates a referral error.
    #[must_use]
    pub fn referral(candidate: ContinuationReference) -> Self {
        Self::Referral {
            candidate: Box::new(candidate),
        }
    }

    /// Returns the ASN.1 identifier of the error kind.
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Abandoned => "abandoned",
            Self::AbandonFailed { .. } => "abandonFailed",
            Self::Attribute { .. } => "attributeError",
            Self::Name { .. } => "nameError",
            Self::Referral { .. } => "referral",
            Self::Security { .. } => "securityError",
            Self::Service { .. } => "serviceError",
            Self::Update { .. } => "updateError",
        }
    }
}
