use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::trace;

use controlsync_core_types::SyncError;

/// Trait implemented by payload types that can be carried on the bus.
pub trait Event: Clone + Send + Sync + std::fmt::Debug + 'static {}

impl<T> Event for T where T: Clone + Send + Sync + std::fmt::Debug + 'static {}

/// Publishing is synchronous so that queue workers and response callbacks can
/// emit notifications without yielding.
pub trait EventBus<E>: Send + Sync
where
    E: Event,
{
    /// Returns the number of subscribers that received the event.
    fn publish(&self, event: E) -> Result<usize, SyncError>;
    fn subscribe(&self) -> broadcast::Receiver<E>;
}

/// Simple in-memory bus suitable for unit tests and single-page engines.
pub struct InMemoryBus<E>
where
    E: Event,
{
    sender: broadcast::Sender<E>,
}

impl<E> InMemoryBus<E>
where
    E: Event,
{
    pub fn new(capacity: usize) -> Arc<Self> {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Arc::new(Self { sender })
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl<E> EventBus<E> for InMemoryBus<E>
where
    E: Event,
{
    fn publish(&self, event: E) -> Result<usize, SyncError> {
        if self.sender.receiver_count() == 0 {
            trace!(?event, "no subscribers; event dropped");
            return Ok(0);
        }
        self.sender
            .send(event)
            .map_err(|err| SyncError::new(err.to_string()))
    }

    fn subscribe(&self) -> broadcast::Receiver<E> {
        self.sender.subscribe()
    }
}
