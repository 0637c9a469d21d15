//! Retry policies for queued operations.
//!
//! Each operation kind has its own policy: how long to wait between
//! attempts, how many attempts to make, and whether a rejection from the
//! remote service ends delivery or is retried like any other failure.
//!
//! Transport errors and bodies that could not be decoded are always
//! retried; only well-formed service responses can end delivery.

use std::time::Duration;

use pubrelay_client::Response;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{DEFAULT_RETRY_BACKOFF, DEFAULT_TERMINAL_STATUS};

/// Retry policy for one operation kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts including the first, or `None` to retry
    /// until delivered.
    pub max_attempts: Option<u32>,

    /// Base delay for backoff calculation.
    pub base_delay: Duration,

    /// Maximum delay between attempts.
    pub max_delay: Duration,

    /// Jitter percentage (0.0 to 1.0) to add randomness.
    pub jitter_factor: f64,

    /// Strategy for calculating backoff delays.
    pub backoff_strategy: BackoffStrategy,

    /// How remote rejections are treated.
    pub rejection: RejectionHandling,
}

impl RetryPolicy {
    /// Publish policy: fixed backoff, unbounded attempts. A well-formed
    /// rejection is final and `403` is reported as a terminal rejection.
    pub fn publish_default() -> Self {
        Self {
            rejection: RejectionHandling::TerminalOnRejection {
                statuses: vec![DEFAULT_TERMINAL_STATUS],
            },
            ..Self::default()
        }
    }

    /// Grant policy: fixed backoff, unbounded attempts, every rejection is
    /// retried.
    pub fn grant_default() -> Self {
        Self { rejection: RejectionHandling::AlwaysRetry, ..Self::default() }
    }

    /// Sets the fixed delay between attempts.
    pub fn with_backoff(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self.max_delay = self.max_delay.max(delay);
        self
    }

    /// Sets how the delay grows between attempts.
    pub fn with_strategy(mut self, strategy: BackoffStrategy) -> Self {
        self.backoff_strategy = strategy;
        self
    }

    /// Caps the delay between attempts. The cap never drops below the base
    /// delay.
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay.max(self.base_delay);
        self
    }

    /// Randomizes each delay by up to `factor` of its length, clamped to
    /// `0.0..=1.0`.
    pub fn with_jitter(mut self, factor: f64) -> Self {
        self.jitter_factor = factor.clamp(0.0, 1.0);
        self
    }

    /// Sets the attempt limit; `0` means unbounded.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = (max_attempts > 0).then_some(max_attempts);
        self
    }

    /// Decides what a non-success `response` means for delivery.
    pub fn on_rejection(&self, response: &Response) -> RejectionAction {
        if response.decode_failed {
            return RejectionAction::Retry;
        }

        match &self.rejection {
            RejectionHandling::TerminalOnRejection { statuses }
                if statuses.contains(&response.status) =>
            {
                RejectionAction::Terminal
            },
            RejectionHandling::TerminalOnRejection { .. } => RejectionAction::Unaccepted,
            RejectionHandling::AlwaysRetry => RejectionAction::Retry,
        }
    }

    /// Decides whether to retry after failed attempt number `attempt`
    /// (1-based).
    pub fn decide(&self, attempt: u32) -> RetryDecision {
        if let Some(max_attempts) = self.max_attempts {
            if attempt >= max_attempts {
                return RetryDecision::GiveUp {
                    reason: format!("maximum attempts ({max_attempts}) exceeded"),
                };
            }
        }

        RetryDecision::Retry { delay: self.delay_for(attempt) }
    }

    /// Delay before the attempt following `attempt`.
    fn delay_for(&self, attempt: u32) -> Duration {
        let base_delay = match self.backoff_strategy {
            BackoffStrategy::Fixed => self.base_delay,
            BackoffStrategy::Linear => self.base_delay * attempt.max(1),
            BackoffStrategy::Exponential => {
                let exponent = attempt.saturating_sub(1).min(20);
                self.base_delay * 2_u32.saturating_pow(exponent)
            },
        };

        let capped_delay = base_delay.min(self.max_delay);
        apply_jitter(capped_delay, self.jitter_factor).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: None,
            base_delay: DEFAULT_RETRY_BACKOFF,
            max_delay: Duration::from_secs(30),
            jitter_factor: 0.0,
            backoff_strategy: BackoffStrategy::Fixed,
            rejection: RejectionHandling::AlwaysRetry,
        }
    }
}

/// Strategy for calculating retry delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Fixed delay between retries.
    Fixed,
    /// Exponential backoff: delay doubles each attempt.
    Exponential,
    /// Linear backoff: delay increases by base amount each attempt.
    Linear,
}

/// Treatment of responses the remote service rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectionHandling {
    /// Every well-formed rejection ends delivery. Those with one of
    /// `statuses` are reported as terminal rejections, the rest as
    /// unaccepted.
    TerminalOnRejection {
        /// Statuses reported as terminal rejections.
        statuses: Vec<u16>,
    },
    /// Every non-success response is retried.
    AlwaysRetry,
}

/// What to do with one non-success response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionAction {
    /// Try the same request again.
    Retry,
    /// Stop with a terminal rejection.
    Terminal,
    /// Stop; the service answered but did not accept the operation.
    Unaccepted,
}

/// Result of a retry decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait `delay`, then try again.
    Retry {
        /// Time to wait before the next attempt
        delay: Duration,
    },
    /// Stop retrying.
    GiveUp {
        /// Reason why delivery stops
        reason: String,
    },
}

/// Randomizes the delay by ±jitter_factor percentage.
fn apply_jitter(duration: Duration, jitter_factor: f64) -> Duration {
    if jitter_factor <= 0.0 {
        return duration;
    }

    let clamped_jitter = jitter_factor.clamp(0.0, 1.0);

    let mut rng = rand::rng();
    let jitter_range = duration.as_secs_f64() * clamped_jitter;
    let jitter_offset = rng.random_range(-jitter_range..=jitter_range);
    let jittered_secs = duration.as_secs_f64() + jitter_offset;

    Duration::from_secs_f64(jittered_secs.max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16) -> Response {
        Response { status, error: status != 200, ..Response::default() }
    }

    #[test]
    fn default_policies_retry_forever_with_fixed_backoff() {
        for policy in [RetryPolicy::publish_default(), RetryPolicy::grant_default()] {
            for attempt in [1, 10, 10_000] {
                assert_eq!(
                    policy.decide(attempt),
                    RetryDecision::Retry { delay: Duration::from_millis(100) }
                );
            }
        }
    }

    #[test]
    fn retry_respects_maximum_attempts() {
        let policy = RetryPolicy::grant_default().with_max_attempts(3);

        assert!(matches!(policy.decide(2), RetryDecision::Retry { .. }));
        match policy.decide(3) {
            RetryDecision::GiveUp { reason } => assert!(reason.contains("maximum attempts")),
            RetryDecision::Retry { .. } => unreachable!("should not retry at max attempts"),
        }
    }

    #[test]
    fn zero_max_attempts_means_unbounded() {
        let policy = RetryPolicy::publish_default().with_max_attempts(0);
        assert_eq!(policy.max_attempts, None);
    }

    #[test]
    fn publish_rejections_end_delivery() {
        let policy = RetryPolicy::publish_default();

        assert_eq!(policy.on_rejection(&response(403)), RejectionAction::Terminal);
        assert_eq!(policy.on_rejection(&response(400)), RejectionAction::Unaccepted);
        assert_eq!(policy.on_rejection(&response(500)), RejectionAction::Unaccepted);
    }

    #[test]
    fn undecodable_responses_are_retried() {
        let undecodable = Response::synthetic("expected value at line 1 column 1");

        for policy in [RetryPolicy::publish_default(), RetryPolicy::grant_default()] {
            assert_eq!(policy.on_rejection(&undecodable), RejectionAction::Retry);
        }
    }

    #[test]
    fn grant_rejections_are_always_retried() {
        let policy = RetryPolicy::grant_default();

        assert_eq!(policy.on_rejection(&response(403)), RejectionAction::Retry);
        assert_eq!(policy.on_rejection(&response(400)), RejectionAction::Retry);
    }

    #[test]
    fn exponential_backoff_increases_and_caps() {
        let policy = RetryPolicy {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            backoff_strategy: BackoffStrategy::Exponential,
            ..RetryPolicy::default()
        };

        let delays: Vec<_> = (1..=5).map(|attempt| policy.delay_for(attempt)).collect();

        assert_eq!(delays[0], Duration::from_secs(1));
        assert_eq!(delays[1], Duration::from_secs(2));
        assert_eq!(delays[2], Duration::from_secs(4));
        assert_eq!(delays[3], Duration::from_secs(8));
        assert_eq!(delays[4], Duration::from_secs(10));
    }

    #[test]
    fn linear_backoff_built_from_options() {
        let policy = RetryPolicy::grant_default()
            .with_backoff(Duration::from_millis(100))
            .with_strategy(BackoffStrategy::Linear)
            .with_max_delay(Duration::from_millis(250));

        assert_eq!(policy.decide(1), RetryDecision::Retry { delay: Duration::from_millis(100) });
        assert_eq!(policy.decide(2), RetryDecision::Retry { delay: Duration::from_millis(200) });
        assert_eq!(policy.decide(5), RetryDecision::Retry { delay: Duration::from_millis(250) });
    }

    #[test]
    fn max_delay_never_below_base_delay() {
        let policy = RetryPolicy::default()
            .with_backoff(Duration::from_secs(2))
            .with_max_delay(Duration::ZERO);
        assert_eq!(policy.max_delay, Duration::from_secs(2));
        assert_eq!(RetryPolicy::default().with_jitter(3.0).jitter_factor, 1.0);
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let base_delay = Duration::from_secs(10);

        for _ in 0..20 {
            let jittered = apply_jitter(base_delay, 0.5).as_millis();
            assert!((5_000..=15_000).contains(&jittered), "delay out of range: {jittered}ms");
        }
    }
}
