//! Periodic drain of the delivery queue.

use std::{sync::Arc, time::Duration};

use tokio::time::MissedTickBehavior;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, info};

use crate::{executor::DeliveryExecutor, queue::DeliveryQueue, session::Session};

/// Moves queued operations into delivery tasks.
///
/// Each drain takes a snapshot of the whole queue and spawns one task per
/// operation in snapshot order. Tasks are tracked so shutdown can wait for
/// them.
pub struct DrainScheduler<S> {
    queue: Arc<DeliveryQueue>,
    executor: Arc<DeliveryExecutor<S>>,
    tracker: TaskTracker,
    delivery_token: CancellationToken,
}

impl<S: Session> DrainScheduler<S> {
    /// Creates a scheduler. `delivery_token` cancels in-flight deliveries.
    pub fn new(
        queue: Arc<DeliveryQueue>,
        executor: Arc<DeliveryExecutor<S>>,
        delivery_token: CancellationToken,
    ) -> Self {
        Self { queue, executor, tracker: TaskTracker::new(), delivery_token }
    }

    /// Drains the queue once and returns the number of tasks started.
    pub fn drain_once(&self) -> usize {
        let snapshot = self.queue.drain();
        let count = snapshot.len();
        if count == 0 {
            return 0;
        }

        debug!(count, "dispatching queued operations");
        for queued in snapshot {
            let executor = self.executor.clone();
            let token = self.delivery_token.clone();
            self.tracker.spawn(async move {
                executor.execute(queued, &token).await;
            });
        }
        count
    }

    /// Drains every `interval` until `stop` is cancelled.
    pub async fn run(&self, interval: Duration, stop: CancellationToken) {
        info!(interval_ms = interval.as_millis(), "drain scheduler starting");

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = stop.cancelled() => break,
                _ = ticker.tick() => {
                    self.drain_once();
                },
            }
        }

        info!("drain scheduler stopped");
    }

    /// Number of delivery tasks still running.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Waits until no delivery task is running.
    pub async fn wait_idle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Marks the task set closed and waits for the running tasks.
    pub async fn close_and_wait(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }
}
