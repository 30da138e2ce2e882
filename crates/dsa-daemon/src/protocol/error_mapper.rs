//! Mapping of invocation faults to wire actions.
//!
//! [`map_fault`] is a pure, total function over [`DsaFault`]. It decides
//! which single PDU answers the invocation and builds the outcome statistics
//! for it. Executing the action (writing, aborting, tearing down) is the
//! connection engine's job.
//!
//! # Mapping
//!
//! | Fault                                      | Action                               |
//! |--------------------------------------------|--------------------------------------|
//! | [`DirectoryError`]                         | error PDU with the matching code     |
//! | `DuplicateInvokeId` .. `UnknownError`      | reject PDU with the matching reason  |
//! | `UnboundRequest`, `InvalidProtocol`, `ReasonNotSpecified` | abort PDU, then unbind |
//! | `Unexpected`                               | telemetry record, `reasonNotSpecified` abort, then unbind |

use dsa_core::errors::DirectoryError;

use super::error::DsaFault;
use super::pdu::{AbortReason, ErrorCode, InvokeId, RejectReason};
use crate::statistics::{ErrorStatistics, OutcomeStatistics};
use crate::telemetry::FaultEvent;

/// The single PDU that answers a faulted invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireAction {
    /// Send a directory error.
    Error {
        /// Error code.
        code: ErrorCode,
        /// Error payload.
        error: DirectoryError,
    },
    /// Send a reject; the connection stays open.
    Reject(RejectReason),
    /// Send an abort, then tear the connection down.
    Abort(AbortReason),
}

impl WireAction {
    /// Returns `true` if the action ends the connection.
    #[must_use]
    pub const fn is_abort(&self) -> bool {
        matches!(self, Self::Abort(_))
    }
}

/// Result of mapping a fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedFault {
    /// PDU to send.
    pub action: WireAction,
    /// Outcome statistics to merge into the invocation's record.
    pub statistics: OutcomeStatistics,
    /// Set for faults of unrecognized shape; must reach telemetry.
    pub unrecognized: Option<FaultEvent>,
}

impl MappedFault {
    fn error(code: ErrorCode, error: DirectoryError, statistics: ErrorStatistics) -> Self {
        Self {
            action: WireAction::Error { code, error },
            statistics: OutcomeStatistics::error(statistics),
            unrecognized: None,
        }
    }

    fn reject(reason: RejectReason) -> Self {
        Self {
            action: WireAction::Reject(reason),
            statistics: OutcomeStatistics::reject(reason),
            unrecognized: None,
        }
    }

    fn abort(reason: AbortReason) -> Self {
        Self {
            action: WireAction::Abort(reason),
            statistics: OutcomeStatistics::abort(reason),
            unrecognized: None,
        }
    }
}

/// Maps a fault raised while handling `invoke_id` on `connection_id`.
#[must_use]
pub fn map_fault(fault: DsaFault, connection_id: &str, invoke_id: Option<InvokeId>) -> MappedFault {
    match fault {
        DsaFault::Directory(error) => map_directory_error(error),
        DsaFault::DuplicateInvokeId(_) => MappedFault::reject(RejectReason::DuplicateInvokeIdRequest),
        DsaFault::UnsupportedOperation(_) => {
            MappedFault::reject(RejectReason::UnsupportedOperationRequest)
        },
        DsaFault::UnknownOperation(_) => MappedFault::reject(RejectReason::UnknownOperationRequest),
        DsaFault::MistypedPdu { .. } => MappedFault::reject(RejectReason::MistypedPdu),
        DsaFault::MistypedArgument { .. } => {
            MappedFault::reject(RejectReason::MistypedArgumentRequest)
        },
        DsaFault::ResourceLimitation { .. } => {
            MappedFault::reject(RejectReason::ResourceLimitationRequest)
        },
        DsaFault::UnknownError { .. } => MappedFault::reject(RejectReason::UnknownError),
        DsaFault::UnboundRequest => MappedFault::abort(AbortReason::UnboundRequest),
        DsaFault::InvalidProtocol { .. } => MappedFault::abort(AbortReason::InvalidProtocol),
        DsaFault::ReasonNotSpecified { .. } => MappedFault::abort(AbortReason::ReasonNotSpecified),
        fault @ DsaFault::Unexpected(_) => {
            let event = FaultEvent {
                connection_id: connection_id.to_string(),
                invoke_id,
                display: fault.to_string(),
                debug: format!("{fault:?}"),
                chain: fault.chain(),
            };
            MappedFault {
                unrecognized: Some(event),
                ..MappedFault::abort(AbortReason::ReasonNotSpecified)
            }
        },
    }
}

fn map_directory_error(error: DirectoryError) -> MappedFault {
    match &error {
        DirectoryError::Abandoned => {
            let mut stats = ErrorStatistics::new(ErrorCode::Abandoned);
            stats.problem_name = Some(error.kind_name().to_string());
            MappedFault::error(ErrorCode::Abandoned, error, stats)
        },
        DirectoryError::AbandonFailed { problem, .. } => {
            let mut stats = ErrorStatistics::new(ErrorCode::AbandonFailed);
            stats.problem_name = Some(problem.name().to_string());
            stats.problem = Some(problem.code());
            MappedFault::error(ErrorCode::AbandonFailed, error, stats)
        },
        DirectoryError::Attribute { problems, .. } => {
            let mut stats = ErrorStatistics::new(ErrorCode::AttributeError);
            stats.attribute_problems = problems
                .iter()
                .map(|item| (item.attribute_type.clone(), item.problem.code()))
                .collect();
            MappedFault::error(ErrorCode::AttributeError, error, stats)
        },
        DirectoryError::Name { problem, matched } => {
            let mut stats = ErrorStatistics::new(ErrorCode::NameError);
            stats.problem_name = Some(problem.name().to_string());
            stats.problem = Some(problem.code());
            stats.matched_name_length = Some(matched.len());
            MappedFault::error(ErrorCode::NameError, error, stats)
        },
        DirectoryError::Referral { candidate } => {
            let mut stats = ErrorStatistics::new(ErrorCode::DsaReferral);
            stats.candidate = Some(candidate.summary());
            MappedFault::error(ErrorCode::DsaReferral, error, stats)
        },
        DirectoryError::Security { problem } => {
            let mut stats = ErrorStatistics::new(ErrorCode::SecurityError);
            stats.problem_name = Some(problem.name().to_string());
            stats.problem = Some(problem.code());
            MappedFault::error(ErrorCode::SecurityError, error, stats)
        },
        DirectoryError::Service { problem } => {
            let mut stats = ErrorStatistics::new(ErrorCode::ServiceError);
            stats.problem_name = Some(problem.name().to_string());
            stats.problem = Some(problem.code());
            MappedFault::error(ErrorCode::ServiceError, error, stats)
        },
        DirectoryError::Update {
            problem,
            attribute_info,
        } => {
            let mut stats = ErrorStatistics::new(ErrorCode::UpdateError);
            stats.problem_name = Some(problem.name().to_string());
            stats.problem = Some(problem.code());
            stats.attribute_info = attribute_info
                .iter()
                .map(|info| info.attribute_type().to_string())
                .collect();
            MappedFault::error(ErrorCode::UpdateError, error, stats)
        },
    }
}

#[cfg(test)]
mod tests {
    use dsa_core::continuation::{AccessPoint, ContinuationReference, ReferenceType};
    use dsa_core::errors::{AttributeInfo, AttributeProblemItem};
    use dsa_core::problems::{
        AbandonProblem, AttributeProblem, NameProblem, SecurityProblem, ServiceProblem,
        UpdateProblem,
    };
    use proptest::prelude::*;
    use proptest::strategy::LazyJust;

    use super::*;
    use crate::protocol::pdu::OperationCode;

    fn map(fault: DsaFault) -> MappedFault {
        map_fault(fault, "conn-1", Some(InvokeId(5)))
    }

    fn error_stats(mapped: &MappedFault) -> &ErrorStatistics {
        mapped.statistics.error.as_ref().unwrap()
    }

    mod directory_errors {
        use super::*;

        #[test]
        fn abandoned() {
            let mapped = map(DirectoryError::Abandoned.into());
            assert_eq!(
                mapped.action,
                WireAction::Error {
                    code: ErrorCode::Abandoned,
                    error: DirectoryError::Abandoned,
                }
            );
            assert_eq!(error_stats(&mapped).problem_name.as_deref(), Some("abandoned"));
        }

        #[test]
        fn abandon_failed_carries_problem_code() {
            let mapped = map(
                DirectoryError::AbandonFailed {
                    problem: AbandonProblem::TooLate,
                    operation: 4,
                }
                .into(),
            );
            assert!(matches!(
                mapped.action,
                WireAction::Error {
                    code: ErrorCode::AbandonFailed,
                    ..
                }
            ));
            assert_eq!(error_stats(&mapped).problem, Some(2));
        }

        #[test]
        fn attribute_error_lists_problems() {
            let mapped = map(
                DirectoryError::Attribute {
                    object: "cn=x".parse().unwrap(),
                    problems: vec![
                        AttributeProblemItem {
                            attribute_type: "2.5.4.3".into(),
                            problem: AttributeProblem::ConstraintViolation,
                            value: None,
                        },
                        AttributeProblemItem {
                            attribute_type: "2.5.4.4".into(),
                            problem: AttributeProblem::UndefinedAttributeType,
                            value: None,
                        },
                    ],
                }
                .into(),
            );
            assert_eq!(
                error_stats(&mapped).attribute_problems,
                vec![("2.5.4.3".to_string(), 5), ("2.5.4.4".to_string(), 3)]
            );
        }

        #[test]
        fn name_error_reports_matched_length() {
            let mapped = map(
                DirectoryError::name(NameProblem::NoSuchObject, "o=x,c=gb".parse().unwrap())
                    .into(),
            );
            let stats = error_stats(&mapped);
            assert_eq!(stats.code, ErrorCode::NameError);
            assert_eq!(stats.matched_name_length, Some(2));
            assert_eq!(stats.problem, Some(1));
        }

        #[test]
        fn referral_uses_dsa_referral_code_and_summary() {
            let cref = ContinuationReference::new(
                "cn=a,o=b,c=c".parse().unwrap(),
                ReferenceType::Subordinate,
                vec![AccessPoint {
                    ae_title: "cn=dsa2".parse().unwrap(),
                    addresses: vec![],
                }],
            );
            let mapped = map(DirectoryError::referral(cref).into());
            let stats = error_stats(&mapped);
            assert_eq!(stats.code, ErrorCode::DsaReferral);
            let summary = stats.candidate.as_ref().unwrap();
            assert_eq!(summary.target_object_length, 3);
            assert_eq!(summary.access_point_count, 1);
        }

        #[test]
        fn security_and_service_carry_problem_codes() {
            let security = map(DirectoryError::security(SecurityProblem::BlockedCredentials).into());
            assert_eq!(error_stats(&security).code, ErrorCode::SecurityError);
            assert_eq!(error_stats(&security).problem, Some(7));

            let service = map(DirectoryError::service(ServiceProblem::UnwillingToPerform).into());
            assert_eq!(error_stats(&service).code, ErrorCode::ServiceError);
            assert_eq!(error_stats(&service).problem, Some(3));
        }

        #[test]
        fn update_error_derives_attribute_info() {
            let mapped = map(
                DirectoryError::Update {
                    problem: UpdateProblem::ObjectClassViolation,
                    attribute_info: vec![
                        AttributeInfo::AttributeType("2.5.4.0".into()),
                        AttributeInfo::Attribute {
                            attribute_type: "2.5.4.3".into(),
                            values: vec!["v".into()],
                        },
                    ],
                }
                .into(),
            );
            let stats = error_stats(&mapped);
            assert_eq!(stats.problem, Some(2));
            assert_eq!(stats.attribute_info, vec!["2.5.4.0", "2.5.4.3"]);
        }
    }

    mod protocol_faults {
        use super::*;

        #[test]
        fn rejects_keep_the_connection() {
            let cases = [
                (
                    DsaFault::DuplicateInvokeId(InvokeId(7)),
                    RejectReason::DuplicateInvokeIdRequest,
                ),
                (
                    DsaFault::UnsupportedOperation(OperationCode::Global("2.5.1".into())),
                    RejectReason::UnsupportedOperationRequest,
                ),
                (
                    DsaFault::UnknownOperation(OperationCode::Local(99)),
                    RejectReason::UnknownOperationRequest,
                ),
                (
                    DsaFault::MistypedPdu { reason: "x".into() },
                    RejectReason::MistypedPdu,
                ),
                (
                    DsaFault::mistyped_argument("x"),
                    RejectReason::MistypedArgumentRequest,
                ),
                (
                    DsaFault::resource_limitation("x"),
                    RejectReason::ResourceLimitationRequest,
                ),
                (
                    DsaFault::UnknownError { reason: "x".into() },
                    RejectReason::UnknownError,
                ),
            ];
            for (fault, reason) in cases {
                let mapped = map(fault);
                assert_eq!(mapped.action, WireAction::Reject(reason));
                assert_eq!(mapped.statistics.reject, Some(reason));
                assert!(mapped.unrecognized.is_none());
            }
        }

        #[test]
        fn connection_fatal_faults_abort_with_matching_reason() {
            let cases = [
                (DsaFault::UnboundRequest, AbortReason::UnboundRequest),
                (
                    DsaFault::InvalidProtocol { reason: "x".into() },
                    AbortReason::InvalidProtocol,
                ),
                (
                    DsaFault::ReasonNotSpecified { reason: "x".into() },
                    AbortReason::ReasonNotSpecified,
                ),
            ];
            for (fault, reason) in cases {
                let mapped = map(fault);
                assert_eq!(mapped.action, WireAction::Abort(reason));
                assert!(mapped.unrecognized.is_none());
            }
        }

        #[test]
        fn unexpected_fault_is_recorded_then_aborted() {
            let mapped = map(DsaFault::unexpected(std::io::Error::other("disk gone")));
            assert_eq!(mapped.action, WireAction::Abort(AbortReason::ReasonNotSpecified));
            let event = mapped.unrecognized.unwrap();
            assert_eq!(event.connection_id, "conn-1");
            assert_eq!(event.invoke_id, Some(InvokeId(5)));
            assert!(event.chain.iter().any(|m| m == "disk gone"));
            assert!(event.debug.contains("Unexpected"));
        }
    }

    fn arb_fault() -> impl Strategy<Value = DsaFault> {
        prop_oneof![
            LazyJust::new(|| DsaFault::from(DirectoryError::Abandoned)),
            (1i64..=18).prop_map(|code| {
                DsaFault::from(DirectoryError::service(
                    ServiceProblem::from_code(code).unwrap_or(ServiceProblem::Busy),
                ))
            }),
            any::<i64>().prop_map(|id| DsaFault::DuplicateInvokeId(InvokeId(id))),
            any::<i64>().prop_map(|code| DsaFault::UnknownOperation(OperationCode::Local(code))),
            ".*".prop_map(|reason| DsaFault::MistypedPdu { reason }),
            LazyJust::new(|| DsaFault::UnboundRequest),
            ".*".prop_map(|reason| DsaFault::InvalidProtocol { reason }),
            ".*".prop_map(DsaFault::unexpected),
        ]
    }

    proptest! {
        #[test]
        fn every_fault_maps_to_exactly_one_outcome(fault in arb_fault()) {
            let fatal = fault.is_connection_fatal();
            let reject = fault.is_reject();
            let mapped = map(fault);
            let stats = &mapped.statistics;
            let populated = [
                stats.error.is_some(),
                stats.reject.is_some(),
                stats.abort.is_some(),
            ];
            prop_assert_eq!(populated.iter().filter(|p| **p).count(), 1);
            prop_assert_eq!(mapped.action.is_abort(), fatal);
            prop_assert_eq!(matches!(mapped.action, WireAction::Reject(_)), reject);
        }
    }
}
