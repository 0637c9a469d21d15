//! In-memory queue between synchronous callers and delivery tasks.

use std::{
    collections::VecDeque,
    sync::{Mutex, PoisonError},
};

use pubrelay_core::{Operation, OperationId};

/// An operation waiting to be dispatched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedOperation {
    /// Identifier assigned at enqueue.
    pub id: OperationId,
    /// The queued work.
    pub operation: Operation,
}

/// Unbounded FIFO queue of operations.
///
/// Enqueue and drain each hold the lock for a constant-time step, so callers
/// never wait on delivery.
#[derive(Debug, Default)]
pub struct DeliveryQueue {
    inner: Mutex<VecDeque<QueuedOperation>>,
}

impl DeliveryQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `operation` and returns its identifier.
    pub fn enqueue(&self, operation: Operation) -> OperationId {
        let id = OperationId::new();
        self.lock().push_back(QueuedOperation { id, operation });
        id
    }

    /// Removes and returns everything queued, oldest first.
    pub fn drain(&self) -> Vec<QueuedOperation> {
        let snapshot = std::mem::take(&mut *self.lock());
        Vec::from(snapshot)
    }

    /// Number of queued operations.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<QueuedOperation>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use pubrelay_core::{ChannelName, PublishOp};

    use super::*;

    fn publish(channel: &str) -> Operation {
        PublishOp::from_flags(ChannelName::parse(channel).unwrap(), "{}", "").into()
    }

    #[test]
    fn drain_returns_everything_in_fifo_order() {
        let queue = DeliveryQueue::new();
        let ids: Vec<_> = ["a", "b", "c"].iter().map(|c| queue.enqueue(publish(c))).collect();

        let drained = queue.drain();

        assert_eq!(drained.iter().map(|q| q.id).collect::<Vec<_>>(), ids);
        assert_eq!(drained[0].operation.channel().as_str(), "a");
        assert!(queue.is_empty());
    }

    #[test]
    fn enqueue_after_drain_starts_new_snapshot() {
        let queue = DeliveryQueue::new();
        queue.enqueue(publish("first"));
        assert_eq!(queue.drain().len(), 1);

        queue.enqueue(publish("second"));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.drain()[0].operation.channel().as_str(), "second");
        assert!(queue.drain().is_empty());
    }
}
