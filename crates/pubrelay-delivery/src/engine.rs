//! Relay service owning the queue, session pool and drain scheduler.
//!
//! Callers enqueue through [`RelayService::publish`], [`RelayService::grant`]
//! and [`RelayService::revoke`], which return immediately. Delivery happens
//! on the scheduler's tasks after [`RelayService::start`].
//!
//! Shutdown runs in order: stop ticking, drain what is left in the queue,
//! wait for in-flight deliveries up to a timeout, then cancel the retry
//! loops that remain.

use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use pubrelay_client::{Agent, AgentConfig};
use pubrelay_core::{ChannelName, Clock, GrantOp, Operation, OperationId, PublishOp};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    error::{DeliveryError, Result},
    executor::{DeliveryExecutor, RetryPolicies},
    pool::SessionPool,
    queue::DeliveryQueue,
    scheduler::DrainScheduler,
    session::Session,
    stats::{DeliveryStats, StatsRecorder},
};

/// Configuration for the relay service.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryConfig {
    /// Number of pooled sessions.
    pub pool_size: usize,

    /// How often the queue is drained.
    pub drain_interval: Duration,

    /// Retry policies per operation kind.
    pub policies: RetryPolicies,

    /// Maximum wait for a free session; `None` waits until one is free.
    pub acquire_timeout: Option<Duration>,

    /// Maximum time to wait for in-flight deliveries at shutdown.
    pub shutdown_timeout: Duration,
}

impl DeliveryConfig {
    /// Checks the configuration for values the service cannot run with.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Configuration` for a zero pool size or drain
    /// interval.
    pub fn validate(&self) -> Result<()> {
        if self.pool_size == 0 {
            return Err(DeliveryError::configuration("pool_size must be positive"));
        }
        if self.drain_interval.is_zero() {
            return Err(DeliveryError::configuration("drain_interval must be positive"));
        }
        Ok(())
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            pool_size: crate::DEFAULT_POOL_SIZE,
            drain_interval: crate::DEFAULT_DRAIN_INTERVAL,
            policies: RetryPolicies::default(),
            acquire_timeout: None,
            shutdown_timeout: crate::DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

/// Queue-and-forward relay to the remote pub/sub service.
pub struct RelayService<S: Session = Agent> {
    config: DeliveryConfig,
    queue: Arc<DeliveryQueue>,
    scheduler: Arc<DrainScheduler<S>>,
    stats: Arc<StatsRecorder>,
    stop_token: CancellationToken,
    delivery_token: CancellationToken,
    ticker: Option<JoinHandle<()>>,
}

impl RelayService<Agent> {
    /// Creates a service whose pool holds `config.pool_size` agents built
    /// from `agent_config`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for invalid settings and
    /// `DeliveryError::PoolInit` when an agent cannot be created.
    pub fn with_agents(
        config: DeliveryConfig,
        agent_config: AgentConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        let agent_clock = clock.clone();
        let pool = SessionPool::init(config.pool_size, |_| {
            Agent::new(agent_config.clone(), agent_clock.clone())
        })?;
        Self::new(config, Arc::new(pool), clock)
    }
}

impl<S: Session> RelayService<S> {
    /// Creates a service delivering through `pool`.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Configuration` for invalid settings.
    pub fn new(
        config: DeliveryConfig,
        pool: Arc<SessionPool<S>>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;

        let stats = Arc::new(StatsRecorder::default());
        let executor = Arc::new(DeliveryExecutor::with_stats(
            pool,
            config.policies.clone(),
            config.acquire_timeout,
            clock,
            stats.clone(),
        ));
        let queue = Arc::new(DeliveryQueue::new());
        let delivery_token = CancellationToken::new();
        let scheduler =
            Arc::new(DrainScheduler::new(queue.clone(), executor, delivery_token.clone()));

        Ok(Self {
            config,
            queue,
            scheduler,
            stats,
            stop_token: CancellationToken::new(),
            delivery_token,
            ticker: None,
        })
    }

    /// Enqueues a publish. `flags` containing `'h'` keeps the message in
    /// history.
    pub fn publish(
        &self,
        channel: ChannelName,
        payload: impl Into<Bytes>,
        flags: &str,
    ) -> OperationId {
        self.enqueue(PublishOp::from_flags(channel, payload, flags).into())
    }

    /// Enqueues a grant. `'r'` and `'w'` in `rights` enable read and write;
    /// a negative `ttl` sends no lifetime.
    pub fn grant(&self, channel: ChannelName, auth: &str, rights: &str, ttl: i64) -> OperationId {
        self.enqueue(GrantOp::from_rights(channel, auth, rights, ttl).into())
    }

    /// Enqueues a revoke: a grant with no rights.
    pub fn revoke(&self, channel: ChannelName, auth: &str, ttl: i64) -> OperationId {
        self.enqueue(GrantOp::revoke(channel, auth, ttl).into())
    }

    /// Enqueues any operation.
    pub fn enqueue(&self, operation: Operation) -> OperationId {
        let kind = operation.kind();
        let channel = operation.channel().to_string();
        let id = self.queue.enqueue(operation);
        StatsRecorder::incr(&self.stats.enqueued);
        debug!(operation_id = %id, %kind, %channel, "operation enqueued");
        id
    }

    /// Starts the drain scheduler. Calling it again has no effect.
    pub fn start(&mut self) {
        if self.ticker.is_some() {
            return;
        }

        info!(
            pool_size = self.config.pool_size,
            drain_interval_ms = self.config.drain_interval.as_millis(),
            "starting relay service"
        );

        let scheduler = self.scheduler.clone();
        let interval = self.config.drain_interval;
        let stop = self.stop_token.clone();
        self.ticker = Some(tokio::spawn(async move { scheduler.run(interval, stop).await }));
    }

    /// Drains the queue now instead of waiting for the next tick.
    pub fn drain_once(&self) -> usize {
        self.scheduler.drain_once()
    }

    /// Drains the queue and waits until every delivery has finished.
    ///
    /// With unbounded policies this only returns once the remote service
    /// has answered every operation.
    pub async fn flush(&self) {
        self.scheduler.drain_once();
        self.scheduler.wait_idle().await;
    }

    /// Returns current counters.
    pub fn stats(&self) -> DeliveryStats {
        self.stats.snapshot(self.queue.len())
    }

    /// Stops the service, delivering what was already enqueued, and returns
    /// the final counters.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::ShutdownTimeout` when deliveries were still
    /// running after `timeout`; those deliveries are cancelled.
    pub async fn shutdown_graceful(mut self, timeout: Duration) -> Result<DeliveryStats> {
        info!(timeout_seconds = timeout.as_secs(), "initiating graceful shutdown");

        self.stop_token.cancel();
        if let Some(ticker) = self.ticker.take() {
            if let Err(join_error) = ticker.await {
                error!(error = %join_error, "drain scheduler task failed");
            }
        }

        let remaining = self.scheduler.drain_once();
        if remaining > 0 {
            info!(remaining, "dispatched remaining queued operations");
        }

        let in_flight = self.scheduler.in_flight();
        if tokio::time::timeout(timeout, self.scheduler.close_and_wait()).await.is_ok() {
            info!("relay service shutdown completed");
            return Ok(self.stats());
        }

        error!(
            in_flight,
            timeout_seconds = timeout.as_secs(),
            "deliveries still running after shutdown timeout, cancelling"
        );
        self.delivery_token.cancel();
        self.scheduler.close_and_wait().await;

        let stats = self.stats();
        warn!(
            delivered = stats.delivered,
            cancelled = stats.cancelled,
            "relay service stopped with cancelled deliveries"
        );
        Err(DeliveryError::ShutdownTimeout { timeout })
    }

    /// Stops the service with the configured shutdown timeout.
    ///
    /// # Errors
    ///
    /// Same as [`RelayService::shutdown_graceful`].
    pub async fn shutdown(self) -> Result<DeliveryStats> {
        let timeout = self.config.shutdown_timeout;
        self.shutdown_graceful(timeout).await
    }
}

impl<S: Session> Drop for RelayService<S> {
    fn drop(&mut self) {
        if self.ticker.is_some() && !self.stop_token.is_cancelled() {
            warn!(
                queued = self.queue.len(),
                "relay service dropped without shutdown, cancelling deliveries"
            );
            self.stop_token.cancel();
            self.delivery_token.cancel();
        }
    }
}
