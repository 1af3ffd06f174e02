//! Fan-out of event messages to subscribers over bounded queues.
//!
//! Each subscriber owns a `tokio::sync::mpsc` queue. Broadcasting never
//! waits: a subscriber whose queue is full loses that message, and a
//! subscriber whose receiver is gone is removed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use futures::Stream;
use tokio::sync::mpsc::{self, error::TrySendError};

use super::EventMessage;
use crate::protocol_constants::DEFAULT_EVENT_QUEUE_CAPACITY;

/// What a subscriber gets from one wait.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    /// A broadcast message.
    Message(EventMessage),
    /// Nothing arrived within the wait; the connection should be kept alive.
    Keepalive,
}

/// Registry of live subscriber queues.
pub struct EventBroadcaster {
    subscribers: DashMap<u64, mpsc::Sender<EventMessage>>,
    next_id: AtomicU64,
    capacity: usize,
}

impl EventBroadcaster {
    /// Creates a broadcaster whose subscriber queues hold `capacity` messages.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: DashMap::new(),
            next_id: AtomicU64::new(1),
            capacity: capacity.max(1),
        }
    }

    /// Registers a new subscriber queue.
    ///
    /// The returned [`Subscription`] deregisters itself when dropped.
    pub fn subscribe(self: &Arc<Self>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.capacity);
        self.subscribers.insert(id, tx);

        log::debug!(
            "[Events] Subscriber {} registered (total: {})",
            id,
            self.subscribers.len()
        );

        Subscription {
            id,
            rx,
            broadcaster: Arc::downgrade(self),
        }
    }

    /// Enqueues `event` with `data` on every subscriber queue.
    ///
    /// Returns the number of subscribers the message was queued for.
    pub fn broadcast(&self, event: &str, data: serde_json::Value) -> usize {
        let message = EventMessage::new(event, data);
        tracing::debug!(event = %message.event, data = %message.data, "broadcast");

        let mut delivered = 0;
        let mut closed = Vec::new();
        for entry in self.subscribers.iter() {
            match entry.value().try_send(message.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    log::debug!(
                        "[Events] Subscriber {} queue full, dropping {}",
                        entry.key(),
                        message.event
                    );
                }
                Err(TrySendError::Closed(_)) => closed.push(*entry.key()),
            }
        }

        // Removal must happen after the iterator releases its shard locks
        for id in closed {
            self.unregister(id);
        }

        delivered
    }

    /// Returns the number of registered subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    fn unregister(&self, id: u64) {
        if self.subscribers.remove(&id).is_some() {
            log::debug!(
                "[Events] Subscriber {} unregistered (remaining: {})",
                id,
                self.subscribers.len()
            );
        }
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_QUEUE_CAPACITY)
    }
}

/// One subscriber's end of the broadcaster.
pub struct Subscription {
    id: u64,
    rx: mpsc::Receiver<EventMessage>,
    broadcaster: Weak<EventBroadcaster>,
}

impl Subscription {
    /// Returns the subscriber id.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Waits up to `wait` for the next message.
    ///
    /// Returns `None` once the broadcaster is gone and the queue is drained.
    pub async fn next(&mut self, wait: Duration) -> Option<Delivery> {
        match tokio::time::timeout(wait, self.rx.recv()).await {
            Ok(Some(message)) => Some(Delivery::Message(message)),
            Ok(None) => None,
            Err(_) => Some(Delivery::Keepalive),
        }
    }

    /// Turns the subscription into a stream of deliveries.
    ///
    /// Dropping the stream drops the subscription.
    pub fn into_stream(mut self, wait: Duration) -> impl Stream<Item = Delivery> + Send + 'static {
        async_stream::stream! {
            while let Some(delivery) = self.next(wait).await {
                yield delivery;
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(broadcaster) = self.broadcaster.upgrade() {
            broadcaster.unregister(self.id);
        }
    }
}
