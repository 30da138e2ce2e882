//! End-to-end tests for the DSP connection engine.
//!
//! # Test Approach
//!
//! Each test accepts a [`DspConnection`] over an in-memory IDM transport,
//! drives it by pushing requests, fragments, and unbinds into the transport,
//! and observes the PDUs the engine writes back. The Tokio clock is paused so
//! bind failure delays elapse instantly while remaining measurable.
//!
//! Collaborators are scripted in `common`:
//! - the authenticator accepts the password `secret` only
//! - the dispatcher's behaviour is selected by the request argument

mod common;

use std::time::Duration;

use common::{Harness, config_with_buffer, simple_bind, valid_bind, wait_until};
use dsa_core::config::DsaConfig;
use dsa_core::errors::DirectoryError;
use dsa_core::problems::SecurityProblem;
use dsa_daemon::protocol::OutboundPdu;
use dsa_daemon::protocol::pdu::{
    AbortReason, BindErrorKind, ErrorCode, InvokeId, OperationCode, RejectReason,
};
use dsa_daemon::telemetry::{AbortTrigger, BindDisposition, TelemetryEvent};
use tokio::time::Instant;

const READ: OperationCode = OperationCode::Local(1);

// =============================================================================
// Test Helpers
// =============================================================================

fn config() -> DsaConfig {
    let mut config = DsaConfig::default();
    config.bind.min_sleep_in_milliseconds = 1000;
    config.bind.sleep_range_in_milliseconds = 1000;
    config
}

fn assert_abort(pdu: &OutboundPdu, expected: AbortReason) {
    match pdu {
        OutboundPdu::Abort(reason) => assert_eq!(*reason, expected),
        other => panic!("expected abort {expected:?}, got {other:?}"),
    }
}

fn assert_reject(pdu: &OutboundPdu, id: i64, expected: RejectReason) {
    match pdu {
        OutboundPdu::Reject { invoke_id, reason } => {
            assert_eq!(*invoke_id, InvokeId(id));
            assert_eq!(*reason, expected);
        },
        other => panic!("expected reject {expected:?}, got {other:?}"),
    }
}

/// Asserts every teardown side effect has happened.
fn assert_torn_down(harness: &Harness) {
    assert!(harness.connection.is_closed());
    assert!(harness.transport.is_closed());
    assert_eq!(harness.transport.close_calls(), 1);
    assert!(!harness.transport.has_listener());
    assert!(!harness.store.contains(&harness.connection.id().to_string()));
    assert!(harness.connection.invocations().is_empty());
}

// =============================================================================
// Bind
// =============================================================================

#[tokio::test(start_paused = true)]
async fn valid_bind_then_read_returns_result() {
    let mut harness = Harness::bound(&config()).await;
    let identity = harness.connection.bound_identity().unwrap();
    assert_eq!(
        identity.bound_name.unwrap().to_string(),
        "cn=dsa2,o=example"
    );

    harness.request(1, READ, b"entry");
    match harness.next_pdu().await {
        OutboundPdu::Result {
            invoke_id,
            opcode,
            result,
        } => {
            assert_eq!(invoke_id, InvokeId(1));
            assert_eq!(opcode, READ);
            assert_eq!(result.as_ref(), b"entry");
        },
        other => panic!("expected result, got {other:?}"),
    }

    harness.wait_for_operations(1).await;
    let stats = harness.telemetry.operations().remove(0);
    assert_eq!(stats.invoke_id, InvokeId(1));
    assert_eq!(stats.outcome_label(), "result");
    assert_eq!(stats.request.unwrap().target_name_length, Some(2));
    assert!(stats.duration.is_some());
    assert!(harness.connection.invocations().is_empty());
    assert!(!harness.connection.is_closed());
}

#[tokio::test(start_paused = true)]
async fn invalid_bind_is_delayed_then_refused() {
    let started = Instant::now();
    let mut harness = Harness::start(
        simple_bind("cn=dsa2,o=example", "wrong"),
        &config(),
        Duration::ZERO,
    );

    match harness.next_pdu().await {
        OutboundPdu::BindError(error) => {
            assert_eq!(
                error.error,
                BindErrorKind::SecurityError(SecurityProblem::NoInformation)
            );
        },
        other => panic!("expected bind error, got {other:?}"),
    }
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(1000), "{elapsed:?}");
    assert!(elapsed <= Duration::from_millis(2000), "{elapsed:?}");

    harness.wait_closed().await;
    assert_torn_down(&harness);
    assert!(!harness.connection.is_bound());
    assert!(harness.telemetry.events().iter().any(|event| matches!(
        event,
        TelemetryEvent::Bind(bind) if bind.outcome == BindDisposition::Rejected
    )));
}

#[tokio::test(start_paused = true)]
async fn authenticator_fault_aborts_without_binding() {
    let mut harness = Harness::start(
        simple_bind("cn=broken", "secret"),
        &config(),
        Duration::ZERO,
    );

    assert_abort(&harness.next_pdu().await, AbortReason::ReasonNotSpecified);
    harness.wait_closed().await;
    assert_torn_down(&harness);
    assert!(!harness.connection.is_bound());
    assert!(harness.telemetry.events().iter().any(|event| matches!(
        event,
        TelemetryEvent::Abort(abort) if abort.trigger == AbortTrigger::AuthenticationFault
    )));
}

#[tokio::test(start_paused = true)]
async fn request_before_bind_completes_aborts() {
    let mut harness = Harness::start(valid_bind(), &config(), Duration::from_millis(100));
    harness.request(1, READ, b"too early");

    assert_abort(&harness.next_pdu().await, AbortReason::UnboundRequest);
    harness.wait_closed().await;

    // The bind finishing afterwards must not revive the connection.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!harness.connection.is_bound());
    assert!(harness.outbound.try_recv().is_err());
    assert_torn_down(&harness);
}

// =============================================================================
// Invocations
// =============================================================================

#[tokio::test(start_paused = true)]
async fn duplicate_invoke_id_is_rejected_while_first_completes() {
    let mut harness = Harness::bound(&config()).await;

    harness.request(7, READ, b"gated");
    wait_until(|| harness.connection.invocations().contains(InvokeId(7))).await;
    harness.request(7, READ, b"second");

    assert_reject(
        &harness.next_pdu().await,
        7,
        RejectReason::DuplicateInvokeIdRequest,
    );

    harness.dispatcher.release();
    match harness.next_pdu().await {
        OutboundPdu::Result { invoke_id, result, .. } => {
            assert_eq!(invoke_id, InvokeId(7));
            assert_eq!(result.as_ref(), b"gated");
        },
        other => panic!("expected result, got {other:?}"),
    }

    harness.wait_for_operations(2).await;
    assert!(harness.connection.invocations().is_empty());
    assert!(!harness.connection.is_closed());
}

#[tokio::test(start_paused = true)]
async fn unknown_local_code_is_rejected() {
    let mut harness = Harness::bound(&config()).await;
    harness.request(2, OperationCode::Local(99), b"x");
    assert_reject(
        &harness.next_pdu().await,
        2,
        RejectReason::UnknownOperationRequest,
    );
    assert!(!harness.connection.is_closed());
}

#[tokio::test(start_paused = true)]
async fn global_code_is_unsupported() {
    let mut harness = Harness::bound(&config()).await;
    harness.request(3, OperationCode::Global("2.5.4.99".into()), b"x");
    assert_reject(
        &harness.next_pdu().await,
        3,
        RejectReason::UnsupportedOperationRequest,
    );
}

#[tokio::test(start_paused = true)]
async fn resource_limitation_is_rejected() {
    let mut harness = Harness::bound(&config()).await;
    harness.request(4, READ, b"busy");
    assert_reject(
        &harness.next_pdu().await,
        4,
        RejectReason::ResourceLimitationRequest,
    );
}

#[tokio::test(start_paused = true)]
async fn directory_error_is_returned_with_statistics() {
    let mut harness = Harness::bound(&config()).await;
    harness.request(5, READ, b"name-error");

    match harness.next_pdu().await {
        OutboundPdu::Error {
            invoke_id,
            code,
            error,
        } => {
            assert_eq!(invoke_id, InvokeId(5));
            assert_eq!(code, ErrorCode::NameError);
            assert!(matches!(error, DirectoryError::Name { .. }));
        },
        other => panic!("expected error, got {other:?}"),
    }

    harness.wait_for_operations(1).await;
    let stats = harness.telemetry.operations().remove(0);
    assert_eq!(stats.outcome_label(), "error");
    let error = stats.outcome.unwrap().error.unwrap();
    assert_eq!(error.code, ErrorCode::NameError);
    assert_eq!(error.problem_name.as_deref(), Some("noSuchObject"));
    assert_eq!(error.matched_name_length, Some(1));
}

#[tokio::test(start_paused = true)]
async fn abandon_reaches_running_invocation() {
    let mut harness = Harness::bound(&config()).await;
    harness.request(3, READ, b"abandonable");
    wait_until(|| harness.connection.abandon(InvokeId(3))).await;

    match harness.next_pdu().await {
        OutboundPdu::Error { invoke_id, code, .. } => {
            assert_eq!(invoke_id, InvokeId(3));
            assert_eq!(code, ErrorCode::Abandoned);
        },
        other => panic!("expected abandoned error, got {other:?}"),
    }
    harness.wait_for_operations(1).await;
    assert!(!harness.connection.abandon(InvokeId(3)));
}

// =============================================================================
// Faults
// =============================================================================

#[tokio::test(start_paused = true)]
async fn unrecognized_fault_aborts_and_is_reported() {
    let mut harness = Harness::bound(&config()).await;
    harness.request(9, READ, b"fault");

    assert_abort(&harness.next_pdu().await, AbortReason::ReasonNotSpecified);
    harness.wait_closed().await;
    assert_torn_down(&harness);

    let faults = harness.telemetry.unrecognized_faults();
    assert_eq!(faults.len(), 1);
    assert_eq!(faults[0].invoke_id, Some(InvokeId(9)));
    assert_eq!(faults[0].connection_id, harness.connection.id().to_string());
    assert!(
        faults[0]
            .chain
            .iter()
            .any(|message| message == "entry cache corrupted")
    );

    harness.wait_for_operations(1).await;
    assert_eq!(harness.telemetry.operations()[0].outcome_label(), "abort");
}

#[tokio::test(start_paused = true)]
async fn dispatcher_panic_aborts_connection() {
    let mut harness = Harness::bound(&config()).await;
    harness.request(1, READ, b"panic");

    assert_abort(&harness.next_pdu().await, AbortReason::ReasonNotSpecified);
    harness.wait_closed().await;
    assert_torn_down(&harness);

    let faults = harness.telemetry.unrecognized_faults();
    assert_eq!(faults.len(), 1);
    assert!(faults[0].display.contains("dispatcher bug"));
}

#[tokio::test(start_paused = true)]
async fn write_failure_is_survived() {
    let mut harness = Harness::bound(&config()).await;
    harness.transport.set_fail_writes(true);
    harness.request(1, READ, b"lost");
    harness.wait_for_operations(1).await;

    harness.transport.set_fail_writes(false);
    harness.request(2, READ, b"delivered");
    match harness.next_pdu().await {
        OutboundPdu::Result { invoke_id, .. } => assert_eq!(invoke_id, InvokeId(2)),
        other => panic!("expected result, got {other:?}"),
    }
    assert!(!harness.connection.is_closed());
}

// =============================================================================
// Fragment ceiling
// =============================================================================

#[tokio::test(start_paused = true)]
async fn oversized_request_aborts_exactly_once() {
    let mut harness = Harness::bound(&config_with_buffer(5_000_000)).await;

    for _ in 0..10 {
        harness.transport.push_fragment(1_000_000);
    }

    assert_abort(&harness.next_pdu().await, AbortReason::UnboundRequest);
    harness.wait_closed().await;
    assert_torn_down(&harness);
    assert!(harness.outbound.try_recv().is_err());

    let aborts = harness
        .telemetry
        .events()
        .into_iter()
        .filter(|event| matches!(event, TelemetryEvent::Abort(_)))
        .count();
    assert_eq!(aborts, 1);
}

#[tokio::test(start_paused = true)]
async fn request_completed_after_trip_never_dispatches() {
    let mut harness = Harness::bound(&config_with_buffer(5_000_000)).await;

    for _ in 0..6 {
        harness.transport.push_fragment(1_000_000);
    }
    harness.request(1, READ, b"oversized");

    assert_abort(&harness.next_pdu().await, AbortReason::UnboundRequest);
    harness.wait_closed().await;
    assert_torn_down(&harness);
    assert!(harness.outbound.try_recv().is_err());
    assert!(harness.telemetry.operations().is_empty());
}

#[tokio::test(start_paused = true)]
async fn fragments_within_ceiling_are_accepted() {
    let mut harness = Harness::bound(&config_with_buffer(5_000_000)).await;

    for _ in 0..5 {
        harness.transport.push_fragment(1_000_000);
    }
    harness.request(1, READ, b"assembled");

    match harness.next_pdu().await {
        OutboundPdu::Result { invoke_id, .. } => assert_eq!(invoke_id, InvokeId(1)),
        other => panic!("expected result, got {other:?}"),
    }
    assert!(!harness.connection.is_closed());
}

// =============================================================================
// Teardown
// =============================================================================

#[tokio::test(start_paused = true)]
async fn peer_unbind_tears_down_and_silences_connection() {
    let mut harness = Harness::bound(&config()).await;
    harness.transport.push_unbind();
    harness.wait_closed().await;
    assert_torn_down(&harness);

    harness.request(1, READ, b"after unbind");
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(harness.outbound.try_recv().is_err());
    assert!(harness.telemetry.operations().is_empty());
}

#[tokio::test(start_paused = true)]
async fn request_racing_peer_unbind_never_dispatches() {
    let mut harness = Harness::bound(&config()).await;
    harness.transport.push_unbind();
    harness.request(2, READ, b"racing unbind");

    harness.wait_closed().await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_torn_down(&harness);
    assert!(harness.outbound.try_recv().is_err());
    assert!(harness.telemetry.operations().is_empty());
}

#[tokio::test(start_paused = true)]
async fn repeated_unbind_tears_down_once() {
    let harness = Harness::bound(&config()).await;
    harness.connection.unbind().await;
    harness.connection.unbind().await;
    harness.transport.push_unbind();

    assert_torn_down(&harness);
    let closed = harness
        .telemetry
        .events()
        .into_iter()
        .filter(|event| matches!(event, TelemetryEvent::ConnectionClosed { .. }))
        .count();
    assert_eq!(closed, 1);
}

#[tokio::test(start_paused = true)]
async fn registry_drains_across_mixed_outcomes() {
    let mut harness = Harness::bound(&config()).await;
    let requests: [(i64, &'static [u8]); 4] =
        [(1, b"ok"), (2, b"name-error"), (3, b"busy"), (4, b"ok")];
    for (invoke_id, argument) in requests {
        harness.request(invoke_id, READ, argument);
    }
    harness.request(50, OperationCode::Local(99), b"x");

    for _ in 0..5 {
        let _ = harness.next_pdu().await;
    }
    harness.wait_for_operations(5).await;
    assert!(harness.connection.invocations().is_empty());
    assert!(!harness.connection.is_closed());
}
