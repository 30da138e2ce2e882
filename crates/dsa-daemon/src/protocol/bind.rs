//! DSA bind handshake.
//!
//! The [`BindController`] calls the [`Authenticator`] exactly once per
//! connection and answers the bind.
//!
//! # Outcomes
//!
//! | Authenticator returns            | Response              | Connection |
//! |----------------------------------|-----------------------|------------|
//! | [`BindOutcome::Authenticated`]   | bind result           | bound      |
//! | [`BindOutcome::Failed`]          | bind error `noInformation`, delayed | torn down |
//! | `Err(AuthError)`                 | abort `reasonNotSpecified`, delayed | torn down |
//!
//! # Timing Countermeasure
//!
//! A failed bind must not reveal, by its latency, whether the name or the
//! credential was wrong. The controller draws a target latency uniformly
//! from `[min_sleep, min_sleep + sleep_range]` and, after authentication
//! returns, sleeps for the absolute difference between that target and the
//! authentication time. When authentication alone overruns the target the
//! overrun is slept again.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dsa_core::config::BindConfig;
use rand::Rng;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::error::AuthError;
use super::pdu::{AbortReason, BoundIdentity, DsaBindArgument, DsaBindError, DsaBindResult};
use super::transport::IdmTransport;
use crate::telemetry::BindDisposition;

/// Result of a completed authentication.
#[derive(Debug, Clone)]
pub enum BindOutcome {
    /// Credentials verified.
    Authenticated {
        /// Identity the connection is bound as.
        identity: BoundIdentity,
        /// Bind result to return to the peer.
        result: DsaBindResult,
    },
    /// Credentials rejected. Carries no detail on purpose.
    Failed,
}

/// Verifies the credentials of a binding DSA.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Authenticates `argument` on the connection `connection_id`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] if verification could not be carried out. A
    /// wrong credential is [`BindOutcome::Failed`], not an error.
    async fn bind(
        &self,
        connection_id: &str,
        transport: &dyn IdmTransport,
        argument: &DsaBindArgument,
    ) -> Result<BindOutcome, AuthError>;
}

/// Failed-bind latency window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindTiming {
    min_sleep: Duration,
    sleep_range: Duration,
}

impl BindTiming {
    /// Creates a window of `[min_sleep, min_sleep + sleep_range]`.
    #[must_use]
    pub const fn new(min_sleep: Duration, sleep_range: Duration) -> Self {
        Self {
            min_sleep,
            sleep_range,
        }
    }

    /// Builds the window from configuration.
    #[must_use]
    pub const fn from_config(config: &BindConfig) -> Self {
        Self::new(config.min_sleep(), config.sleep_range())
    }

    /// Draws a target latency from the window.
    #[must_use]
    pub fn draw_target(&self) -> Duration {
        let range_ms = u64::try_from(self.sleep_range.as_millis()).unwrap_or(u64::MAX);
        let jitter_ms = rand::thread_rng().gen_range(0..=range_ms);
        self.min_sleep
            .saturating_add(Duration::from_millis(jitter_ms))
    }

    /// Delay applied after authentication took `elapsed` against `target`.
    #[must_use]
    pub const fn delay(target: Duration, elapsed: Duration) -> Duration {
        target.abs_diff(elapsed)
    }
}

impl Default for BindTiming {
    fn default() -> Self {
        Self::from_config(&BindConfig::default())
    }
}

/// What a bind handshake did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindReport {
    /// How the handshake ended.
    pub disposition: BindDisposition,
    /// Time from bind receipt to the response write.
    pub latency: Duration,
    /// Whether the connection must now be torn down.
    pub requires_teardown: bool,
}

/// Drives the bind handshake of one connection.
#[derive(Clone)]
pub struct BindController {
    authenticator: Arc<dyn Authenticator>,
    timing: BindTiming,
}

impl BindController {
    /// Creates a controller.
    #[must_use]
    pub fn new(authenticator: Arc<dyn Authenticator>, timing: BindTiming) -> Self {
        Self {
            authenticator,
            timing,
        }
    }

    /// Runs the handshake.
    ///
    /// `on_bound` is called with the identity before the bind result is
    /// written, so the connection accepts requests as soon as the peer can
    /// see the result.
    pub async fn run<F>(
        &self,
        connection_id: &str,
        transport: &dyn IdmTransport,
        argument: &DsaBindArgument,
        on_bound: F,
    ) -> BindReport
    where
        F: FnOnce(BoundIdentity) + Send,
    {
        let started = Instant::now();
        let outcome = self
            .authenticator
            .bind(connection_id, transport, argument)
            .await;

        match outcome {
            Ok(BindOutcome::Authenticated { identity, result }) => {
                debug!(
                    connection_id,
                    auth_level = ?identity.auth_level,
                    "DSA bind authenticated"
                );
                on_bound(identity);
                let requires_teardown = match transport.write_bind_result(result).await {
                    Ok(()) => false,
                    Err(e) => {
                        warn!(connection_id, error = %e, "failed to write bind result");
                        true
                    },
                };
                BindReport {
                    disposition: BindDisposition::Bound,
                    latency: started.elapsed(),
                    requires_teardown,
                }
            },
            Ok(BindOutcome::Failed) => {
                self.delay_failure(started).await;
                info!(connection_id, "DSA bind failed authentication");
                if let Err(e) = transport
                    .write_bind_error(DsaBindError::no_information())
                    .await
                {
                    warn!(connection_id, error = %e, "failed to write bind error");
                }
                BindReport {
                    disposition: BindDisposition::Rejected,
                    latency: started.elapsed(),
                    requires_teardown: true,
                }
            },
            Err(e) => {
                error!(connection_id, error = %e, "authenticator faulted during DSA bind");
                self.delay_failure(started).await;
                if let Err(e) = transport.write_abort(AbortReason::ReasonNotSpecified).await {
                    warn!(connection_id, error = %e, "failed to write abort");
                }
                BindReport {
                    disposition: BindDisposition::Faulted,
                    latency: started.elapsed(),
                    requires_teardown: true,
                }
            },
        }
    }

    async fn delay_failure(&self, started: Instant) {
        let target = self.timing.draw_target();
        let delay = BindTiming::delay(target, started.elapsed());
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}
