//! Clock abstraction for request timestamps and retry sleeps.
//!
//! Signed requests embed a unix timestamp and the delivery executor sleeps
//! between attempts; both go through `Clock` so tests can pin time and skip
//! real waits.

use std::{
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, SystemTime, UNIX_EPOCH},
};

/// Clock abstraction for time operations.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Returns the current system time for timestamps.
    fn now_system(&self) -> SystemTime;

    /// Sleeps for the specified duration.
    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;

    /// Returns whole seconds since the unix epoch.
    fn unix_seconds(&self) -> u64 {
        self.now_system().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
    }
}

/// Production clock backed by system time and `tokio::time::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealClock;

impl RealClock {
    /// Creates a new real clock instance.
    pub fn new() -> Self {
        Self
    }
}

impl Clock for RealClock {
    fn now_system(&self) -> SystemTime {
        SystemTime::now()
    }

    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Test clock for deterministic time control.
///
/// `sleep` advances virtual time and yields instead of waiting, and the
/// number of sleeps is recorded so retry loops can be observed.
#[derive(Debug, Clone)]
pub struct TestClock {
    monotonic_ns: Arc<AtomicU64>,
    system_ns: Arc<AtomicU64>,
    sleeps: Arc<AtomicU64>,
}

impl TestClock {
    /// Creates a new test clock starting at the current time.
    pub fn new() -> Self {
        Self::with_start_time(SystemTime::now())
    }

    /// Creates a test clock starting at a specific time.
    pub fn with_start_time(start: SystemTime) -> Self {
        let since_epoch = start.duration_since(UNIX_EPOCH).unwrap_or_default();

        Self {
            monotonic_ns: Arc::new(AtomicU64::new(0)),
            system_ns: Arc::new(AtomicU64::new(saturating_nanos(since_epoch))),
            sleeps: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Creates a test clock frozen at the given unix second.
    pub fn at_unix(seconds: u64) -> Self {
        Self::with_start_time(UNIX_EPOCH + Duration::from_secs(seconds))
    }

    /// Advances both clocks by the specified duration.
    pub fn advance(&self, duration: Duration) {
        let duration_ns = saturating_nanos(duration);
        self.monotonic_ns.fetch_add(duration_ns, Ordering::AcqRel);
        self.system_ns.fetch_add(duration_ns, Ordering::AcqRel);
    }

    /// Returns elapsed virtual time since clock creation.
    pub fn elapsed(&self) -> Duration {
        Duration::from_nanos(self.monotonic_ns.load(Ordering::Acquire))
    }

    /// Returns how many times `sleep` has been called.
    pub fn sleep_count(&self) -> u64 {
        self.sleeps.load(Ordering::Acquire)
    }
}

impl Default for TestClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TestClock {
    fn now_system(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_nanos(self.system_ns.load(Ordering::Acquire))
    }

    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        self.sleeps.fetch_add(1, Ordering::AcqRel);
        self.advance(duration);
        Box::pin(tokio::task::yield_now())
    }
}

fn saturating_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}
