//! Continuation references.
//!
//! A continuation reference tells a requester (or a chaining DSA) where
//! name resolution or a distributed search could continue. They are
//! produced by the search procedures, carried in referral errors, and
//! consumed by the SCR procedure in [`crate::search::scr`].

use serde::{Deserialize, Serialize};

use crate::names::DistinguishedName;

/// Phase of name resolution reached so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NameResolutionPhase {
    /// Resolution has not started.
    NotStarted,
    /// Resolution is under way.
    Proceeding,
    /// The target object has been resolved.
    Completed,
}

/// How far an operation has progressed through name resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationProgress {
    /// Current name resolution phase.
    pub name_resolution_phase: NameResolutionPhase,
    /// Index of the next RDN to resolve, when proceeding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_rdn_to_be_resolved: Option<u32>,
}

impl OperationProgress {
    /// Progress before any resolution has happened.
    #[must_use]
    pub const fn not_started() -> Self {
        Self {
            name_resolution_phase: NameResolutionPhase::NotStarted,
            next_rdn_to_be_resolved: None,
        }
    }
}

/// The kind of knowledge reference a continuation was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReferenceType {
    /// Superior reference.
    Superior,
    /// Subordinate reference.
    Subordinate,
    /// Cross reference.
    Cross,
    /// Non-specific subordinate reference.
    NonSpecificSubordinate,
    /// Reference to a shadow supplier.
    Supplier,
    /// Reference to the master of a shadowed area.
    Master,
    /// Immediate superior reference.
    ImmediateSuperior,
    /// Reference to the DSA itself.
    #[serde(rename = "self")]
    SelfReference,
    /// DIT bridge reference.
    DitBridge,
}

impl ReferenceType {
    /// Returns the ASN.1 identifier of the reference type.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Superior => "superior",
            Self::Subordinate => "subordinate",
            Self::Cross => "cross",
            Self::NonSpecificSubordinate => "nonSpecificSubordinate",
            Self::Supplier => "supplier",
            Self::Master => "master",
            Self::ImmediateSuperior => "immediateSuperior",
            Self::SelfReference => "self",
            Self::DitBridge => "ditBridge",
        }
    }
}

/// A DSA that may be able to continue the operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPoint {
    /// Application entity title of the DSA.
    pub ae_title: DistinguishedName,
    /// Presentation addresses (URLs) of the DSA.
    #[serde(default)]
    pub addresses: Vec<String>,
}

/// A continuation reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContinuationReference {
    /// Name of the object at which the operation should continue.
    pub target_object: DistinguishedName,
    /// Number of RDNs that came from alias dereferencing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aliased_rdns: Option<u32>,
    /// Name resolution progress.
    pub operation_progress: OperationProgress,
    /// Number of RDNs already resolved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rdns_resolved: Option<u32>,
    /// Kind of knowledge reference used.
    pub reference_type: ReferenceType,
    /// DSAs that can continue the operation.
    pub access_points: Vec<AccessPoint>,
    /// Whether only the target entry itself is in scope.
    #[serde(default)]
    pub entry_only: bool,
    /// Subordinate names excluded from a continued search.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclusions: Vec<DistinguishedName>,
    /// Whether results should be returned to the DUA directly.
    #[serde(default)]
    pub return_to_dua: bool,
    /// Whether name resolution must be performed on the master DSA.
    #[serde(default)]
    pub name_resolve_on_master: bool,
}

impl ContinuationReference {
    /// Creates a reference with no optional fields set.
    #[must_use]
    pub fn new(
        target_object: DistinguishedName,
        reference_type: ReferenceType,
        access_points: Vec<AccessPoint>,
    ) -> Self {
        Self {
            target_object,
            aliased_rdns: None,
            operation_progress: OperationProgress::not_started(),
            rdns_resolved: None,
            reference_type,
            access_points,
            entry_only: false,
            exclusions: Vec::new(),
            return_to_dua: false,
            name_resolve_on_master: false,
        }
    }

    /// Returns the telemetry summary of this reference.
    #[must_use]
    pub fn summary(&self) -> ContinuationSummary {
        ContinuationSummary {
            target_object_length: self.target_object.len(),
            reference_type: self.reference_type,
            access_point_count: self.access_points.len(),
            name_resolution_phase: self.operation_progress.name_resolution_phase,
            rdns_resolved: self.rdns_resolved,
        }
    }
}

/// Non-identifying summary of a continuation reference.
///
/// Only structural facts are kept so that statistics never leak names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContinuationSummary {
    /// Number of RDNs in the target object name.
    pub target_object_length: usize,
    /// Kind of knowledge reference used.
    pub reference_type: ReferenceType,
    /// Number of access points offered.
    pub access_point_count: usize,
    /// Name resolution phase reached.
    pub name_resolution_phase: NameResolutionPhase,
    /// Number of RDNs already resolved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rdns_resolved: Option<u32>,
}
