//! Property tests for queue ordering and retry decisions.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use proptest::prelude::*;
use pubrelay_core::{ChannelName, PublishOp};
use pubrelay_delivery::{BackoffStrategy, DeliveryQueue, RetryDecision, RetryPolicy};

proptest! {
    #[test]
    fn drains_preserve_enqueue_order(batches in prop::collection::vec(1usize..8, 1..10)) {
        let queue = DeliveryQueue::new();
        let mut enqueued = Vec::new();
        let mut drained = Vec::new();

        for (batch, size) in batches.iter().enumerate() {
            for n in 0..*size {
                let channel = ChannelName::parse(&format!("c{batch}-{n}")).unwrap();
                enqueued.push(queue.enqueue(PublishOp::from_flags(channel, "{}", "").into()));
            }
            drained.extend(queue.drain().into_iter().map(|queued| queued.id));
        }

        prop_assert_eq!(drained, enqueued);
        prop_assert!(queue.is_empty());
    }

    #[test]
    fn bounded_policy_never_exceeds_max_attempts(max in 1u32..20, attempt in 1u32..40) {
        let policy = RetryPolicy::publish_default().with_max_attempts(max);

        match policy.decide(attempt) {
            RetryDecision::Retry { .. } => prop_assert!(attempt < max),
            RetryDecision::GiveUp { .. } => prop_assert!(attempt >= max),
        }
    }

    #[test]
    fn delays_never_exceed_max_delay(
        base_ms in 1u64..5_000,
        attempt in 1u32..64,
        jitter in 0.0f64..1.0,
    ) {
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(base_ms),
            max_delay: Duration::from_secs(10),
            jitter_factor: jitter,
            backoff_strategy: BackoffStrategy::Exponential,
            ..RetryPolicy::grant_default()
        };

        match policy.decide(attempt) {
            RetryDecision::Retry { delay } => prop_assert!(delay <= Duration::from_secs(10)),
            RetryDecision::GiveUp { reason } => {
                prop_assert!(false, "unbounded gave up: {}", reason);
            },
        }
    }
}
