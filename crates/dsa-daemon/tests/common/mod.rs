//! Shared harness for connection engine integration tests.
//!
//! `Harness` wires a [`DspConnection`] to a [`MemoryTransport`] with scripted
//! collaborators:
//!
//! - `StubAuthenticator` accepts the password `secret`, faults for the name
//!   `cn=broken`, and rejects everything else.
//! - `ScriptedDispatcher` picks its behaviour from the request argument.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dsa_core::config::DsaConfig;
use dsa_core::errors::DirectoryError;
use dsa_core::problems::NameProblem;
use dsa_daemon::protocol::pdu::{
    AuthenticationLevel, AuthLevel, BoundIdentity, Credentials, DsaBindArgument, DsaBindResult,
    IdmRequest, InvokeId, OperationCode,
};
use dsa_daemon::protocol::transport::OutboundReceiver;
use dsa_daemon::protocol::{
    AuthError, Authenticator, BindOutcome, ConnectionServices, DsaFault, DspConnection,
    IdmTransport, InvocationEvent, MemoryTransport, OperationContext, OperationDispatcher,
    OperationOutcome, OutboundPdu,
};
use dsa_daemon::statistics::RequestStatistics;
use dsa_daemon::store::InMemoryConnectionStore;
use dsa_daemon::telemetry::InMemoryTelemetry;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::Notify;

/// How long any single wait may take before the test fails.
pub const WAIT: Duration = Duration::from_secs(30);

// =============================================================================
// Collaborators
// =============================================================================

/// Authenticator with a fixed verdict table and optional latency.
pub struct StubAuthenticator {
    pub latency: Duration,
}

#[async_trait]
impl Authenticator for StubAuthenticator {
    async fn bind(
        &self,
        _connection_id: &str,
        _transport: &dyn IdmTransport,
        argument: &DsaBindArgument,
    ) -> Result<BindOutcome, AuthError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let Some(Credentials::Simple { name, password }) = &argument.credentials else {
            return Ok(BindOutcome::Failed);
        };
        if name.to_string() == "cn=broken" {
            return Err(AuthError::Backend {
                reason: "credential store offline".into(),
            });
        }
        if password.as_ref().map(|p| p.expose_secret()) != Some("secret") {
            return Ok(BindOutcome::Failed);
        }
        Ok(BindOutcome::Authenticated {
            identity: BoundIdentity {
                bound_name: Some(name.clone()),
                unique_id: None,
                auth_level: AuthenticationLevel::Basic {
                    level: AuthLevel::Simple,
                    local_qualifier: None,
                    signed: false,
                },
            },
            result: DsaBindResult::default(),
        })
    }
}

/// Dispatcher driven by the request argument.
///
/// | Argument       | Behaviour                                         |
/// |----------------|---------------------------------------------------|
/// | `gated`        | waits for [`ScriptedDispatcher::release`]         |
/// | `abandonable`  | waits for an abandon signal, returns `Abandoned`  |
/// | `name-error`   | returns a `noSuchObject` name error               |
/// | `busy`         | returns a resource-limitation reject              |
/// | `fault`        | returns an unrecognized fault                     |
/// | `panic`        | panics                                            |
/// | anything else  | echoes the argument as the result                 |
#[derive(Default)]
pub struct ScriptedDispatcher {
    gate: Notify,
}

impl ScriptedDispatcher {
    /// Lets one gated invocation proceed.
    pub fn release(&self) {
        self.gate.notify_one();
    }
}

#[async_trait]
impl OperationDispatcher for ScriptedDispatcher {
    async fn dispatch(
        &self,
        mut ctx: OperationContext,
        argument: Bytes,
    ) -> Result<OperationOutcome, DsaFault> {
        match argument.as_ref() {
            b"gated" => self.gate.notified().await,
            b"abandonable" => {
                return match ctx.events.recv().await {
                    Ok(InvocationEvent::Abandon) => Err(DirectoryError::Abandoned.into()),
                    Err(e) => Err(DsaFault::unexpected(e)),
                };
            },
            b"name-error" => {
                return Err(DirectoryError::name(
                    NameProblem::NoSuchObject,
                    "o=example".parse().unwrap(),
                )
                .into());
            },
            b"busy" => return Err(DsaFault::resource_limitation("too many searches")),
            b"fault" => {
                return Err(DsaFault::unexpected(std::io::Error::other(
                    "entry cache corrupted",
                )));
            },
            b"panic" => panic!("dispatcher bug"),
            _ => {},
        }
        Ok(OperationOutcome::new(argument).with_request(RequestStatistics {
            target_name_length: Some(2),
            ..RequestStatistics::default()
        }))
    }
}

// =============================================================================
// Harness
// =============================================================================

/// A connection under test and everything it talks to.
pub struct Harness {
    pub transport: Arc<MemoryTransport>,
    pub outbound: OutboundReceiver,
    pub connection: DspConnection,
    pub dispatcher: Arc<ScriptedDispatcher>,
    pub store: Arc<InMemoryConnectionStore>,
    pub telemetry: Arc<InMemoryTelemetry>,
}

impl Harness {
    /// Accepts a connection presenting `argument`.
    pub fn start(argument: DsaBindArgument, config: &DsaConfig, auth_latency: Duration) -> Self {
        let (transport, outbound) = MemoryTransport::new();
        let transport = Arc::new(transport);
        let dispatcher = Arc::new(ScriptedDispatcher::default());
        let store = Arc::new(InMemoryConnectionStore::new());
        let telemetry = Arc::new(InMemoryTelemetry::new());
        let services = ConnectionServices {
            authenticator: Arc::new(StubAuthenticator {
                latency: auth_latency,
            }),
            dispatcher: dispatcher.clone(),
            store: store.clone(),
            telemetry: telemetry.clone(),
        };
        let connection = DspConnection::accept(transport.clone(), argument, config, services);
        // Connection-scoped state that teardown must remove.
        store.insert(connection.id().to_string(), "paged-results");
        Self {
            transport,
            outbound,
            connection,
            dispatcher,
            store,
            telemetry,
        }
    }

    /// Accepts a connection with valid credentials and waits for the bind
    /// result.
    pub async fn bound(config: &DsaConfig) -> Self {
        let mut harness = Self::start(valid_bind(), config, Duration::ZERO);
        match harness.next_pdu().await {
            OutboundPdu::BindResult(_) => {},
            other => panic!("expected bind result, got {other:?}"),
        }
        assert!(harness.connection.is_bound());
        harness
    }

    /// Next PDU written by the engine.
    pub async fn next_pdu(&mut self) -> OutboundPdu {
        tokio::time::timeout(WAIT, self.outbound.recv())
            .await
            .expect("timed out waiting for a PDU")
            .expect("outbound channel closed")
    }

    /// Delivers a request.
    pub fn request(&self, invoke_id: i64, opcode: OperationCode, argument: &'static [u8]) {
        self.transport.push_request(IdmRequest {
            invoke_id: InvokeId(invoke_id),
            opcode,
            argument: Bytes::from_static(argument),
        });
    }

    /// Waits until `n` operation records have been flushed to telemetry.
    pub async fn wait_for_operations(&self, n: usize) {
        wait_until(|| self.telemetry.operations().len() >= n).await;
    }

    /// Waits until teardown has finished.
    pub async fn wait_closed(&self) {
        tokio::time::timeout(WAIT, self.connection.wait_closed())
            .await
            .expect("timed out waiting for teardown");
    }
}

/// Polls `condition` until it holds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// Bind argument that the stub authenticator accepts.
pub fn valid_bind() -> DsaBindArgument {
    simple_bind("cn=dsa2,o=example", "secret")
}

/// Simple-credential bind argument.
pub fn simple_bind(name: &str, password: &str) -> DsaBindArgument {
    DsaBindArgument {
        credentials: Some(Credentials::Simple {
            name: name.parse().unwrap(),
            password: Some(SecretString::from(password.to_string())),
        }),
        ..DsaBindArgument::default()
    }
}

/// Default configuration with a custom fragment ceiling.
pub fn config_with_buffer(buffer_size: usize) -> DsaConfig {
    let mut config = DsaConfig::default();
    config.idm.buffer_size = buffer_size;
    config
}
