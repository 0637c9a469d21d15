//! Asynchronous delivery of queued pub/sub operations.
//!
//! Callers enqueue operations synchronously; a drain scheduler periodically
//! moves everything queued into one delivery task per operation. Each task
//! checks a signed session out of a fixed-size pool, retries according to the
//! operation kind's policy and returns the session when it stops.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   ┌───────────────┐   ┌───────────────────┐
//! │ RelayService │──▶│ DeliveryQueue │──▶│ DrainScheduler    │
//! └──────────────┘   └───────────────┘   └───────────────────┘
//!                                                  │ one task per op
//!                                                  ▼
//!                    ┌───────────────┐   ┌───────────────────┐
//!                    │ SessionPool   │◀──│ DeliveryExecutor  │
//!                    └───────────────┘   └───────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::{sync::Arc, time::Duration};
//!
//! use pubrelay_client::{AgentConfig, Credentials};
//! use pubrelay_core::{ChannelName, RealClock};
//! use pubrelay_delivery::{DeliveryConfig, RelayService};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let agent_config = AgentConfig::new(Credentials::new("pub-c", "sub-c", Some("sec-c")));
//! let mut service =
//!     RelayService::with_agents(DeliveryConfig::default(), agent_config, Arc::new(RealClock))?;
//! service.start();
//!
//! service.publish(ChannelName::parse("news")?, r#"{"text":"hello"}"#, "h");
//!
//! service.shutdown_graceful(Duration::from_secs(5)).await?;
//! # Ok(())
//! # }
//! ```

pub mod engine;
pub mod error;
pub mod executor;
pub mod pool;
pub mod queue;
pub mod retry;
pub mod scheduler;
pub mod session;
mod stats;

use std::time::Duration;

pub use engine::{DeliveryConfig, RelayService};
pub use error::{DeliveryError, Result};
pub use executor::{DeliveryExecutor, DeliveryOutcome, RetryPolicies};
pub use pool::{PooledSession, SessionPool};
pub use queue::{DeliveryQueue, QueuedOperation};
pub use retry::{BackoffStrategy, RejectionAction, RejectionHandling, RetryDecision, RetryPolicy};
pub use scheduler::DrainScheduler;
pub use session::Session;
pub use stats::DeliveryStats;

/// Default number of pooled sessions.
pub const DEFAULT_POOL_SIZE: usize = 30;

/// Default period between queue drains.
pub const DEFAULT_DRAIN_INTERVAL: Duration = Duration::from_millis(200);

/// Default delay between delivery attempts.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(100);

/// Default time allowed for in-flight deliveries during shutdown.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Status the remote service answers with when a publish is not allowed.
pub const DEFAULT_TERMINAL_STATUS: u16 = 403;
