//! Event bus - in-memory pub/sub feeding the SSE stream.
//!
//! Delivery is best-effort and at-most-once. Every subscriber owns a bounded
//! channel; when it is full the event is dropped for that subscriber only,
//! so a slow consumer never stalls a publisher.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use chrono::Utc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use taskmesh_core::{Event, EventId};

/// Default per-subscriber buffer (events).
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 100;

/// Handle identifying one subscriber.
pub type SubscriberId = u64;

struct BusInner {
    subscribers: RwLock<HashMap<SubscriberId, mpsc::Sender<Event>>>,
    next_id: AtomicU64,
    capacity: usize,
    dropped: AtomicU64,
}

impl BusInner {
    fn remove(&self, id: SubscriberId) -> bool {
        // Dropping the sender closes the channel; the receiver drains what is
        // already buffered and then sees the end of the stream.
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some()
    }
}

/// Central event bus. Cheap to clone; clones share subscribers.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    /// Create a bus whose subscribers buffer up to `capacity` events.
    pub fn new(capacity: usize) -> Self {
        debug!(capacity, "Creating event bus");
        Self {
            inner: Arc::new(BusInner {
                subscribers: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                capacity: capacity.max(1),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    /// Register a new subscriber. Dropping the returned handle unsubscribes.
    pub fn subscribe(&self) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.inner.capacity);
        self.inner
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, tx);
        debug!(subscriber = id, "New event subscriber");
        Subscription {
            id,
            rx,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Stop delivering to `id` and close its channel. Never blocks on the
    /// subscriber. Returns false if `id` was not subscribed.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let removed = self.inner.remove(id);
        if removed {
            debug!(subscriber = id, "Event subscriber removed");
        }
        removed
    }

    /// Stamp `event` and offer it to every subscriber without waiting.
    ///
    /// Returns the number of subscribers that accepted it.
    pub fn publish(&self, mut event: Event) -> usize {
        if event.id.is_none() {
            event.id = Some(EventId::generate());
        }
        if event.timestamp.is_none() {
            event.timestamp = Some(Utc::now());
        }

        let mut delivered = 0;
        let mut closed = Vec::new();
        {
            let subscribers = self
                .inner
                .subscribers
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            for (id, tx) in subscribers.iter() {
                match tx.try_send(event.clone()) {
                    Ok(()) => delivered += 1,
                    Err(TrySendError::Full(_)) => {
                        self.inner.dropped.fetch_add(1, Ordering::Relaxed);
                        warn!(
                            subscriber = id,
                            event_type = %event.event_type,
                            "Subscriber buffer full, dropping event"
                        );
                    }
                    Err(TrySendError::Closed(_)) => closed.push(*id),
                }
            }
        }

        for id in closed {
            self.inner.remove(id);
        }

        debug!(event_type = %event.event_type, delivered, "Event published");
        delivered
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Total deliveries dropped because a subscriber was full.
    pub fn dropped_count(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_SUBSCRIBER_CAPACITY)
    }
}

/// Receiving side of one subscription.
pub struct Subscription {
    id: SubscriberId,
    rx: mpsc::Receiver<Event>,
    bus: Weak<BusInner>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Wait for the next event. `None` once unsubscribed and drained.
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    /// Take a buffered event without waiting.
    pub fn try_recv(&mut self) -> Option<Event> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.remove(self.id);
        }
    }
}
