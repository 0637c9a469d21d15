//! Delivery of one queued operation.
//!
//! The executor checks a session out, then attempts the operation until the
//! kind's [`RetryPolicy`] says stop. The session is held across retries and
//! returned exactly once, whatever the outcome.

use std::{fmt, sync::Arc, time::Duration};

use pubrelay_client::{Response, SessionError};
use pubrelay_core::{Clock, Operation, OperationKind};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::{
    error::DeliveryError,
    pool::SessionPool,
    queue::QueuedOperation,
    retry::{RejectionAction, RetryDecision, RetryPolicy},
    session::Session,
    stats::StatsRecorder,
};

/// Retry policies keyed by operation kind.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicies {
    /// Policy for publishes.
    pub publish: RetryPolicy,
    /// Policy for grants and revokes.
    pub grant: RetryPolicy,
}

impl RetryPolicies {
    /// Returns the policy for `kind`.
    pub fn for_kind(&self, kind: OperationKind) -> &RetryPolicy {
        match kind {
            OperationKind::Publish => &self.publish,
            OperationKind::Grant => &self.grant,
        }
    }
}

impl Default for RetryPolicies {
    fn default() -> Self {
        Self { publish: RetryPolicy::publish_default(), grant: RetryPolicy::grant_default() }
    }
}

/// Terminal state of one delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The remote service accepted the operation.
    Delivered {
        /// Attempts made
        attempts: u32,
    },
    /// A publish was rejected with a terminal status.
    RejectedTerminal {
        /// Rejection status
        status: u16,
        /// Attempts made
        attempts: u32,
    },
    /// The service answered with a well-formed error and the policy does
    /// not retry it.
    Unaccepted {
        /// Response status
        status: u16,
        /// Attempts made
        attempts: u32,
    },
    /// A bounded policy ran out of attempts.
    Exhausted {
        /// Attempts made
        attempts: u32,
    },
    /// The operation cannot succeed with this session.
    Failed {
        /// Why delivery stopped
        reason: String,
    },
    /// Shutdown stopped the delivery.
    Cancelled {
        /// Attempts made before cancellation
        attempts: u32,
    },
}

enum Attempt {
    Accepted(Response),
    Rejected(Response),
    Transport(SessionError),
}

/// Runs queued operations against pooled sessions.
pub struct DeliveryExecutor<S> {
    pool: Arc<SessionPool<S>>,
    policies: RetryPolicies,
    acquire_timeout: Option<Duration>,
    clock: Arc<dyn Clock>,
    stats: Arc<StatsRecorder>,
}

impl<S: Session> DeliveryExecutor<S> {
    /// Creates an executor drawing sessions from `pool`.
    pub fn new(
        pool: Arc<SessionPool<S>>,
        policies: RetryPolicies,
        acquire_timeout: Option<Duration>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::with_stats(pool, policies, acquire_timeout, clock, Arc::default())
    }

    pub(crate) fn with_stats(
        pool: Arc<SessionPool<S>>,
        policies: RetryPolicies,
        acquire_timeout: Option<Duration>,
        clock: Arc<dyn Clock>,
        stats: Arc<StatsRecorder>,
    ) -> Self {
        Self { pool, policies, acquire_timeout, clock, stats }
    }

    /// Returns the session pool.
    pub fn pool(&self) -> &SessionPool<S> {
        &self.pool
    }

    /// Delivers `queued`, retrying until the policy stops or `token` is
    /// cancelled.
    pub async fn execute(
        &self,
        queued: QueuedOperation,
        token: &CancellationToken,
    ) -> DeliveryOutcome {
        let QueuedOperation { id, operation } = queued;
        let span = info_span!(
            "deliver",
            operation_id = %id,
            kind = %operation.kind(),
            channel = %operation.channel(),
        );

        StatsRecorder::incr(&self.stats.dispatched);
        StatsRecorder::incr(&self.stats.in_flight);
        let outcome = self.run(&operation, token).instrument(span).await;
        StatsRecorder::decr(&self.stats.in_flight);

        let counter = match &outcome {
            DeliveryOutcome::Delivered { .. } => &self.stats.delivered,
            DeliveryOutcome::RejectedTerminal { .. } => &self.stats.rejected,
            DeliveryOutcome::Unaccepted { .. } => &self.stats.unaccepted,
            DeliveryOutcome::Exhausted { .. } => &self.stats.exhausted,
            DeliveryOutcome::Failed { .. } => &self.stats.failed,
            DeliveryOutcome::Cancelled { .. } => &self.stats.cancelled,
        };
        StatsRecorder::incr(counter);
        outcome
    }

    async fn run(&self, operation: &Operation, token: &CancellationToken) -> DeliveryOutcome {
        let session = match self.pool.acquire_timeout(token, self.acquire_timeout).await {
            Ok(session) => session,
            Err(DeliveryError::Cancelled) => {
                debug!("cancelled while waiting for a session");
                return DeliveryOutcome::Cancelled { attempts: 0 };
            },
            Err(e) => {
                error!(error = %e, "could not obtain a session");
                return DeliveryOutcome::Failed { reason: e.to_string() };
            },
        };

        let policy = self.policies.for_kind(operation.kind());
        let mut attempts: u32 = 0;

        let outcome = loop {
            attempts += 1;

            let attempt = tokio::select! {
                biased;
                () = token.cancelled() => {
                    break DeliveryOutcome::Cancelled { attempts: attempts - 1 };
                },
                attempt = dispatch(&*session, operation) => attempt,
            };

            match attempt {
                Attempt::Accepted(response) => {
                    info!(attempts, status = response.status, "operation delivered");
                    break DeliveryOutcome::Delivered { attempts };
                },
                Attempt::Rejected(response) => match policy.on_rejection(&response) {
                    RejectionAction::Terminal => {
                        warn!(
                            attempts,
                            status = response.status,
                            message = %response.message,
                            "operation rejected, not retrying"
                        );
                        let status = response.status;
                        break DeliveryOutcome::RejectedTerminal { status, attempts };
                    },
                    RejectionAction::Unaccepted => {
                        warn!(
                            attempts,
                            status = response.status,
                            message = %response.message,
                            "operation not accepted by the service"
                        );
                        break DeliveryOutcome::Unaccepted { status: response.status, attempts };
                    },
                    RejectionAction::Retry => {
                        warn!(
                            attempts,
                            status = response.status,
                            decode_failed = response.decode_failed,
                            message = %response.message,
                            "operation not accepted"
                        );
                    },
                },
                Attempt::Transport(e) if !e.is_retryable() => {
                    error!(attempts, error = %e, "operation failed with non-retryable error");
                    break DeliveryOutcome::Failed { reason: e.to_string() };
                },
                Attempt::Transport(e) => {
                    warn!(attempts, error = %e, "operation attempt failed");
                },
            }

            match policy.decide(attempts) {
                RetryDecision::Retry { delay } => {
                    StatsRecorder::incr(&self.stats.retries);
                    debug!(attempts, delay_ms = delay.as_millis(), "retrying operation");
                    tokio::select! {
                        biased;
                        () = token.cancelled() => break DeliveryOutcome::Cancelled { attempts },
                        () = self.clock.sleep(delay) => {},
                    }
                },
                RetryDecision::GiveUp { reason } => {
                    error!(attempts, reason = %reason, "giving up on operation");
                    break DeliveryOutcome::Exhausted { attempts };
                },
            }
        };

        session.release();
        outcome
    }
}

impl<S> fmt::Debug for DeliveryExecutor<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeliveryExecutor")
            .field("pool", &self.pool)
            .field("policies", &self.policies)
            .field("acquire_timeout", &self.acquire_timeout)
            .finish_non_exhaustive()
    }
}

async fn dispatch<S: Session>(session: &S, operation: &Operation) -> Attempt {
    let result = match operation {
        Operation::Publish(op) => session.publish(op).await,
        Operation::Grant(op) => session.grant(op).await,
    };

    match result {
        Ok(response) if response.is_success() => Attempt::Accepted(response),
        Ok(response) => Attempt::Rejected(response),
        Err(e) => Attempt::Transport(e),
    }
}
