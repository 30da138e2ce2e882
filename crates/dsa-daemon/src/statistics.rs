//! Per-operation statistics records.
//!
//! A record is opened when a request arrives, enriched by the operation
//! dispatcher and by the error mapper, and flushed to the telemetry sink
//! once the invocation has been deregistered. Records never contain names
//! or attribute values, only structural facts and problem codes.

use std::time::{Duration, SystemTime};

use dsa_core::continuation::ContinuationSummary;
use serde::{Deserialize, Serialize};

use crate::protocol::pdu::{
    AbortReason, DIRECTORY_SYSTEM_AC, ErrorCode, InvokeId, OperationCode, RejectReason,
};

/// Statistics of one invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationStatistics {
    /// Connection the invocation arrived on.
    pub connection_id: String,
    /// Application context of the protocol carrying the invocation.
    pub application_context: String,
    /// Invocation identifier.
    pub invoke_id: InvokeId,
    /// Operation code as received.
    pub opcode: OperationCode,
    /// Time the request was received.
    pub started_at: SystemTime,
    /// Time from receipt to the final wire write.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<Duration>,
    /// Request summary supplied by the dispatcher.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<RequestStatistics>,
    /// Outcome summary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<OutcomeStatistics>,
}

impl OperationStatistics {
    /// Opens a record for a DSP invocation.
    #[must_use]
    pub fn dsp(connection_id: impl Into<String>, invoke_id: InvokeId, opcode: OperationCode) -> Self {
        Self {
            connection_id: connection_id.into(),
            application_context: DIRECTORY_SYSTEM_AC.to_string(),
            invoke_id,
            opcode,
            started_at: SystemTime::now(),
            duration: None,
            request: None,
            outcome: None,
        }
    }

    /// Merges a request summary; fields present in `other` win.
    pub fn merge_request(&mut self, other: RequestStatistics) {
        match &mut self.request {
            Some(existing) => existing.merge(other),
            None => self.request = Some(other),
        }
    }

    /// Merges an outcome summary; fields present in `other` win.
    pub fn merge_outcome(&mut self, other: OutcomeStatistics) {
        match &mut self.outcome {
            Some(existing) => existing.merge(other),
            None => self.outcome = Some(other),
        }
    }

    /// Returns the outcome label used for metrics.
    #[must_use]
    pub fn outcome_label(&self) -> &'static str {
        match &self.outcome {
            Some(OutcomeStatistics { abort: Some(_), .. }) => "abort",
            Some(OutcomeStatistics { reject: Some(_), .. }) => "reject",
            Some(OutcomeStatistics { error: Some(_), .. }) => "error",
            _ => "result",
        }
    }
}

/// Request summary supplied by the operation dispatcher.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestStatistics {
    /// Number of RDNs in the target object name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_name_length: Option<usize>,
    /// Search or list scope, if applicable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subset: Option<String>,
    /// Size limit requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_limit: Option<u64>,
    /// Time limit requested, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_limit: Option<u64>,
    /// Whether the request was signed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signed: Option<bool>,
}

impl RequestStatistics {
    fn merge(&mut self, other: Self) {
        self.target_name_length = other.target_name_length.or(self.target_name_length);
        self.subset = other.subset.or_else(|| self.subset.take());
        self.size_limit = other.size_limit.or(self.size_limit);
        self.time_limit = other.time_limit.or(self.time_limit);
        self.signed = other.signed.or(self.signed);
    }
}

/// Outcome summary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeStatistics {
    /// Summary of a successful result, supplied by the dispatcher.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ResultStatistics>,
    /// Directory error sent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorStatistics>,
    /// Reject sent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reject: Option<RejectReason>,
    /// Abort sent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abort: Option<AbortReason>,
}

impl OutcomeStatistics {
    /// Outcome of a directory error.
    #[must_use]
    pub fn error(error: ErrorStatistics) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }

    /// Outcome of a reject.
    #[must_use]
    pub fn reject(reason: RejectReason) -> Self {
        Self {
            reject: Some(reason),
            ..Self::default()
        }
    }

    /// Outcome of an abort.
    #[must_use]
    pub fn abort(reason: AbortReason) -> Self {
        Self {
            abort: Some(reason),
            ..Self::default()
        }
    }

    fn merge(&mut self, other: Self) {
        self.result = other.result.or_else(|| self.result.take());
        self.error = other.error.or_else(|| self.error.take());
        self.reject = other.reject.or(self.reject);
        self.abort = other.abort.or(self.abort);
    }
}

/// Summary of a successful result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultStatistics {
    /// Number of entries returned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entries: Option<usize>,
    /// Number of continuation references returned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continuation_references: Option<usize>,
    /// Whether a limit truncated the result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_problem: Option<String>,
}

/// Summary of a directory error sent to the peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorStatistics {
    /// Error code sent.
    pub code: ErrorCode,
    /// Problem discriminant (`abandoned`, `noSuchObject`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub problem_name: Option<String>,
    /// Numeric problem code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub problem: Option<i64>,
    /// Attribute problems, as `(attribute type, problem code)` pairs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attribute_problems: Vec<(String, i64)>,
    /// Number of RDNs of the matched name in a name error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_name_length: Option<usize>,
    /// Summary of the continuation reference in a referral.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate: Option<ContinuationSummary>,
    /// Attribute types named by an update error.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attribute_info: Vec<String>,
}

impl ErrorStatistics {
    /// An error record carrying only its code.
    #[must_use]
    pub const fn new(code: ErrorCode) -> Self {
        Self {
            code,
            problem_name: None,
            problem: None,
            attribute_problems: Vec::new(),
            matched_name_length: None,
            candidate: None,
            attribute_info: Vec::new(),
        }
    }
}
