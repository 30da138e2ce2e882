//! Protocol data unit types for DSP over IDM.
//!
//! Only the parts of the PDUs that the connection engine inspects are typed
//! here. Operation arguments and results stay encoded ([`Bytes`]); their
//! grammar belongs to the codec layer and the operation-processing layer.
//!
//! # Numbering
//!
//! Error codes, reject reasons, and abort reasons carry the integer values
//! assigned by the governing ASN.1 modules. Those values are what goes on
//! the wire, so they are pinned by tests.

use std::fmt;

use bytes::Bytes;
use dsa_core::names::{DistinguishedName, UniqueIdentifier};
use dsa_core::problems::{SecurityProblem, ServiceProblem};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// Object identifier of the directory system application context.
pub const DIRECTORY_SYSTEM_AC: &str = "2.5.3.2";

/// Invocation identifier assigned by the requesting peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvokeId(pub i64);

impl fmt::Display for InvokeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<i64> for InvokeId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

// ============================================================================
// Operation codes
// ============================================================================

/// Chained operations defined for DSP, by local operation code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DspOperation {
    /// chainedRead
    Read,
    /// chainedCompare
    Compare,
    /// chainedAbandon
    Abandon,
    /// chainedList
    List,
    /// chainedSearch
    Search,
    /// chainedAddEntry
    AddEntry,
    /// chainedRemoveEntry
    RemoveEntry,
    /// chainedModifyEntry
    ModifyEntry,
    /// chainedModifyDN
    ModifyDn,
    /// chainedAdministerPassword
    AdministerPassword,
    /// chainedChangePassword
    ChangePassword,
    /// chainedLdapTransport
    LdapTransport,
    /// chainedLinkedLDAP
    LinkedLdap,
}

impl DspOperation {
    /// Every chained operation, in local code order.
    pub const ALL: [Self; 13] = [
        Self::Read,
        Self::Compare,
        Self::Abandon,
        Self::List,
        Self::Search,
        Self::AddEntry,
        Self::RemoveEntry,
        Self::ModifyEntry,
        Self::ModifyDn,
        Self::AdministerPassword,
        Self::ChangePassword,
        Self::LdapTransport,
        Self::LinkedLdap,
    ];

    /// Returns the local operation code.
    #[must_use]
    pub const fn local_code(self) -> i64 {
        match self {
            Self::Read => 1,
            Self::Compare => 2,
            Self::Abandon => 3,
            Self::List => 4,
            Self::Search => 5,
            Self::AddEntry => 6,
            Self::RemoveEntry => 7,
            Self::ModifyEntry => 8,
            Self::ModifyDn => 9,
            Self::AdministerPassword => 10,
            Self::ChangePassword => 11,
            Self::LdapTransport => 12,
            Self::LinkedLdap => 13,
        }
    }

    /// Looks up a chained operation by local code.
    #[must_use]
    pub const fn from_local_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::Read),
            2 => Some(Self::Compare),
            3 => Some(Self::Abandon),
            4 => Some(Self::List),
            5 => Some(Self::Search),
            6 => Some(Self::AddEntry),
            7 => Some(Self::RemoveEntry),
            8 => Some(Self::ModifyEntry),
            9 => Some(Self::ModifyDn),
            10 => Some(Self::AdministerPassword),
            11 => Some(Self::ChangePassword),
            12 => Some(Self::LdapTransport),
            13 => Some(Self::LinkedLdap),
            _ => None,
        }
    }

    /// Returns the operation name used in logs and metric labels.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Read => "chainedRead",
            Self::Compare => "chainedCompare",
            Self::Abandon => "chainedAbandon",
            Self::List => "chainedList",
            Self::Search => "chainedSearch",
            Self::AddEntry => "chainedAddEntry",
            Self::RemoveEntry => "chainedRemoveEntry",
            Self::ModifyEntry => "chainedModifyEntry",
            Self::ModifyDn => "chainedModifyDN",
            Self::AdministerPassword => "chainedAdministerPassword",
            Self::ChangePassword => "chainedChangePassword",
            Self::LdapTransport => "chainedLdapTransport",
            Self::LinkedLdap => "chainedLinkedLDAP",
        }
    }
}

/// Operation code as carried in a request PDU.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationCode {
    /// Integer code local to the application context.
    Local(i64),
    /// Globally unique code, as a dotted OID.
    Global(String),
}

impl OperationCode {
    /// Returns the chained operation this code names, if it is a known
    /// local code.
    #[must_use]
    pub const fn operation(&self) -> Option<DspOperation> {
        match self {
            Self::Local(code) => DspOperation::from_local_code(*code),
            Self::Global(_) => None,
        }
    }

    /// Returns a bounded label for logs and metrics.
    #[must_use]
    pub fn label(&self) -> String {
        match (self, self.operation()) {
            (_, Some(op)) => op.name().to_string(),
            (Self::Local(code), None) => format!("local:{code}"),
            (Self::Global(_), None) => "global".to_string(),
        }
    }
}

impl From<DspOperation> for OperationCode {
    fn from(op: DspOperation) -> Self {
        Self::Local(op.local_code())
    }
}

impl fmt::Display for OperationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(code) => write!(f, "{code}"),
            Self::Global(oid) => write!(f, "{oid}"),
        }
    }
}

/// A decoded request PDU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdmRequest {
    /// Invocation identifier chosen by the peer.
    pub invoke_id: InvokeId,
    /// Operation requested.
    pub opcode: OperationCode,
    /// Encoded operation argument.
    pub argument: Bytes,
}

// ============================================================================
// Outcome codes
// ============================================================================

/// DSP error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorCode {
    /// attributeError
    AttributeError,
    /// nameError
    NameError,
    /// serviceError
    ServiceError,
    /// referral (DAP)
    Referral,
    /// abandoned
    Abandoned,
    /// securityError
    SecurityError,
    /// abandonFailed
    AbandonFailed,
    /// updateError
    UpdateError,
    /// dsaReferral (DSP)
    DsaReferral,
}

impl ErrorCode {
    /// Returns the local error code.
    #[must_use]
    pub const fn local_code(self) -> i64 {
        match self {
            Self::AttributeError => 1,
            Self::NameError => 2,
            Self::ServiceError => 3,
            Self::Referral => 4,
            Self::Abandoned => 5,
            Self::SecurityError => 6,
            Self::AbandonFailed => 7,
            Self::UpdateError => 8,
            Self::DsaReferral => 9,
        }
    }
}

/// IDM reject reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RejectReason {
    /// mistypedPDU
    MistypedPdu,
    /// duplicateInvokeIDRequest
    DuplicateInvokeIdRequest,
    /// unsupportedOperationRequest
    UnsupportedOperationRequest,
    /// unknownOperationRequest
    UnknownOperationRequest,
    /// mistypedArgumentRequest
    MistypedArgumentRequest,
    /// resourceLimitationRequest
    ResourceLimitationRequest,
    /// unknownError
    UnknownError,
}

impl RejectReason {
    /// Returns the enumerated value sent on the wire.
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::MistypedPdu => 0,
            Self::DuplicateInvokeIdRequest => 1,
            Self::UnsupportedOperationRequest => 2,
            Self::UnknownOperationRequest => 3,
            Self::MistypedArgumentRequest => 4,
            Self::ResourceLimitationRequest => 5,
            Self::UnknownError => 9,
        }
    }

    /// Returns the ASN.1 identifier.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::MistypedPdu => "mistypedPDU",
            Self::DuplicateInvokeIdRequest => "duplicateInvokeIDRequest",
            Self::UnsupportedOperationRequest => "unsupportedOperationRequest",
            Self::UnknownOperationRequest => "unknownOperationRequest",
            Self::MistypedArgumentRequest => "mistypedArgumentRequest",
            Self::ResourceLimitationRequest => "resourceLimitationRequest",
            Self::UnknownError => "unknownError",
        }
    }
}

/// IDM abort reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AbortReason {
    /// mistypedPDU
    MistypedPdu,
    /// unboundRequest
    UnboundRequest,
    /// invalidPDU
    InvalidPdu,
    /// resourceLimitation
    ResourceLimitation,
    /// connectionFailed
    ConnectionFailed,
    /// invalidProtocol
    InvalidProtocol,
    /// reasonNotSpecified
    ReasonNotSpecified,
}

impl AbortReason {
    /// Returns the enumerated value sent on the wire.
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::MistypedPdu => 0,
            Self::UnboundRequest => 1,
            Self::InvalidPdu => 2,
            Self::ResourceLimitation => 3,
            Self::ConnectionFailed => 4,
            Self::InvalidProtocol => 5,
            Self::ReasonNotSpecified => 6,
        }
    }

    /// Returns the ASN.1 identifier.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::MistypedPdu => "mistypedPDU",
            Self::UnboundRequest => "unboundRequest",
            Self::InvalidPdu => "invalidPDU",
            Self::ResourceLimitation => "resourceLimitation",
            Self::ConnectionFailed => "connectionFailed",
            Self::InvalidProtocol => "invalidProtocol",
            Self::ReasonNotSpecified => "reasonNotSpecified",
        }
    }
}

// ============================================================================
// Bind
// ============================================================================

/// Protocol versions offered or accepted in a bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Versions {
    /// Version 1 of the directory protocols.
    pub v1: bool,
    /// Version 2 of the directory protocols.
    pub v2: bool,
}

impl Default for Versions {
    fn default() -> Self {
        Self { v1: true, v2: false }
    }
}

/// Credentials presented in a bind.
///
/// Secrets stay wrapped so that `Debug` output never reveals them.
#[derive(Debug, Clone)]
pub enum Credentials {
    /// Simple (name and optional password) credentials.
    Simple {
        /// Name of the binding DSA.
        name: DistinguishedName,
        /// Unprotected password, if any.
        password: Option<SecretString>,
    },
    /// Strong credentials; verification belongs to the authenticator.
    Strong {
        /// Name asserted by the certificate path, if any.
        name: Option<DistinguishedName>,
        /// Encoded bind token and certification path.
        token: Bytes,
    },
    /// SASL credentials.
    Sasl {
        /// SASL mechanism name.
        mechanism: String,
        /// Mechanism-specific credentials.
        credentials: Option<Bytes>,
    },
}

impl Credentials {
    /// Returns the name the credentials claim, if any.
    #[must_use]
    pub const fn claimed_name(&self) -> Option<&DistinguishedName> {
        match self {
            Self::Simple { name, .. } => Some(name),
            Self::Strong { name, .. } => name.as_ref(),
            Self::Sasl { .. } => None,
        }
    }
}

/// DSA bind argument.
#[derive(Debug, Clone, Default)]
pub struct DsaBindArgument {
    /// Credentials, absent for an anonymous bind.
    pub credentials: Option<Credentials>,
    /// Versions offered.
    pub versions: Versions,
}

/// DSA bind result.
#[derive(Debug, Clone, Default)]
pub struct DsaBindResult {
    /// Credentials of the responding DSA, if any.
    pub credentials: Option<Credentials>,
    /// Versions accepted.
    pub versions: Versions,
}

/// The error carried by a bind error PDU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BindErrorKind {
    /// Security error with the given problem.
    SecurityError(SecurityProblem),
    /// Service error with the given problem.
    ServiceError(ServiceProblem),
}

/// DSA bind error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DsaBindError {
    /// Versions supported.
    pub versions: Versions,
    /// The error.
    pub error: BindErrorKind,
}

impl DsaBindError {
    /// The only bind error sent after failed authentication.
    ///
    /// `noInformation` is deliberately unspecific so that the response does
    /// not reveal whether the name or the credential was wrong.
    #[must_use]
    pub fn no_information() -> Self {
        Self {
            versions: Versions::default(),
            error: BindErrorKind::SecurityError(SecurityProblem::NoInformation),
        }
    }
}

/// Level of authentication achieved by a bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AuthLevel {
    /// No authentication.
    None,
    /// Simple (password) authentication.
    Simple,
    /// Strong (signature) authentication.
    Strong,
}

/// Authentication level negotiated by a bind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AuthenticationLevel {
    /// Basic levels defined by the directory standards.
    Basic {
        /// Level achieved.
        level: AuthLevel,
        /// Locally defined refinement.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        local_qualifier: Option<i64>,
        /// Whether the operations will be signed.
        #[serde(default)]
        signed: bool,
    },
    /// Another scheme, identified by OID.
    Other(String),
}

impl AuthenticationLevel {
    /// Unauthenticated.
    #[must_use]
    pub const fn none() -> Self {
        Self::Basic {
            level: AuthLevel::None,
            local_qualifier: None,
            signed: false,
        }
    }
}

/// Identity established by a successful bind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundIdentity {
    /// Distinguished name of the bound DSA, if any.
    pub bound_name: Option<DistinguishedName>,
    /// Unique identifier accompanying the bound name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_id: Option<UniqueIdentifier>,
    /// Authentication level achieved.
    pub auth_level: AuthenticationLevel,
}
