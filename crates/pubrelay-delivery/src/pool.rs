//! Fixed-size pool of sessions.
//!
//! A semaphore counts free sessions and a free list holds them. Acquiring
//! takes a permit, then pops a session; the returned [`PooledSession`] pushes
//! the session back before its permit is released, so the number of permits
//! never exceeds the number of sessions on the free list.

use std::{
    fmt,
    ops::Deref,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{DeliveryError, Result};

/// Pool of interchangeable sessions created once at startup.
///
/// The pool never grows, shrinks or replaces a session.
pub struct SessionPool<S> {
    semaphore: Arc<Semaphore>,
    free: Arc<Mutex<Vec<S>>>,
    capacity: usize,
}

impl<S: Send + 'static> SessionPool<S> {
    /// Creates a pool by calling `factory` exactly `capacity` times, in order.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Configuration` for a zero capacity and
    /// `DeliveryError::PoolInit` for the first factory failure, in which case
    /// the sessions created so far are dropped.
    pub fn init<E, F>(capacity: usize, mut factory: F) -> Result<Self>
    where
        E: fmt::Display,
        F: FnMut(usize) -> std::result::Result<S, E>,
    {
        if capacity == 0 {
            return Err(DeliveryError::configuration("session pool capacity must be positive"));
        }

        let mut sessions = Vec::with_capacity(capacity);
        for index in 0..capacity {
            let session =
                factory(index).map_err(|e| DeliveryError::pool_init(index, e.to_string()))?;
            sessions.push(session);
        }

        info!(capacity, "session pool initialized");
        Ok(Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            free: Arc::new(Mutex::new(sessions)),
            capacity,
        })
    }

    /// Waits for a free session.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Cancelled` when `token` is cancelled first.
    pub async fn acquire(&self, token: &CancellationToken) -> Result<PooledSession<S>> {
        let permit = tokio::select! {
            biased;
            () = token.cancelled() => return Err(DeliveryError::Cancelled),
            permit = self.semaphore.clone().acquire_owned() => permit
                .map_err(|_| DeliveryError::internal("session pool semaphore closed"))?,
        };

        let session = self
            .free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()
            .ok_or_else(|| DeliveryError::internal("permit granted with empty free list"))?;

        debug!(available = self.available(), "session checked out");
        Ok(PooledSession { session: Some(session), free: self.free.clone(), _permit: permit })
    }

    /// Waits for a free session for at most `timeout`, or without bound when
    /// `timeout` is `None`.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::AcquireTimeout` when the timeout elapses and
    /// `DeliveryError::Cancelled` when `token` is cancelled first.
    pub async fn acquire_timeout(
        &self,
        token: &CancellationToken,
        timeout: Option<Duration>,
    ) -> Result<PooledSession<S>> {
        let Some(timeout) = timeout else {
            return self.acquire(token).await;
        };

        tokio::time::timeout(timeout, self.acquire(token))
            .await
            .map_err(|_| DeliveryError::AcquireTimeout { timeout })?
    }

    /// Total number of sessions.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of sessions currently free.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Number of sessions currently checked out.
    pub fn checked_out(&self) -> usize {
        self.capacity - self.available()
    }
}

impl<S> fmt::Debug for SessionPool<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionPool")
            .field("capacity", &self.capacity)
            .field("available", &self.semaphore.available_permits())
            .finish()
    }
}

/// A session checked out of a [`SessionPool`].
///
/// The session goes back to the pool exactly once: on [`release`] or when
/// the guard is dropped, whichever comes first.
///
/// [`release`]: PooledSession::release
pub struct PooledSession<S> {
    session: Option<S>,
    free: Arc<Mutex<Vec<S>>>,
    _permit: OwnedSemaphorePermit,
}

impl<S> PooledSession<S> {
    /// Returns the session to the pool.
    pub fn release(self) {
        drop(self);
    }
}

impl<S> Deref for PooledSession<S> {
    type Target = S;

    fn deref(&self) -> &S {
        // Only `Drop` takes the session out.
        match &self.session {
            Some(session) => session,
            None => unreachable!("pooled session used after release"),
        }
    }
}

impl<S> Drop for PooledSession<S> {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            self.free.lock().unwrap_or_else(PoisonError::into_inner).push(session);
        }
        // `_permit` is dropped after this body, once the session is back.
    }
}

impl<S> fmt::Debug for PooledSession<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledSession").field("held", &self.session.is_some()).finish()
    }
}
