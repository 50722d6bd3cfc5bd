//! **Channel Bus** — tiny typed pub/sub with a latest-value snapshot per topic.
//!
//! Producers and consumers only meet here. Each topic fans out to bounded
//! subscriber inboxes; a subscriber that falls behind loses the oldest
//! buffered values (consumers only ever want eventually-recent data, not
//! history). `latest` reads the snapshot without consuming anything. The
//! only critical section is the map update, guarded by a short mutex that
//! is never held while delivering.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tracing::trace;

/// Default per-subscriber inbox capacity.
pub const DEFAULT_INBOX_CAPACITY: usize = 32;

struct BusInner<T> {
    latest: HashMap<String, T>,
    topics: HashMap<String, broadcast::Sender<T>>,
}

/// Topic-keyed pub/sub with a latest-value cache.
pub struct EventBus<T> {
    inner: Mutex<BusInner<T>>,
    capacity: usize,
}

impl<T: Clone> EventBus<T> {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_INBOX_CAPACITY)
    }

    /// Bus whose subscriber inboxes hold at most `capacity` values.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(BusInner {
                latest: HashMap::new(),
                topics: HashMap::new(),
            }),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BusInner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store `value` as the topic snapshot and fan it out to current
    /// subscribers. Publishing to an empty topic name is a no-op.
    pub fn publish(&self, topic: &str, value: T) {
        if topic.is_empty() {
            return;
        }
        let sender = {
            let mut inner = self.lock();
            inner.latest.insert(topic.to_string(), value.clone());
            inner.topics.get(topic).cloned()
        };
        // Delivery happens outside the lock; no receivers is fine.
        if let Some(tx) = sender {
            let _ = tx.send(value);
        }
    }

    /// New independent inbox for future values on `topic`. Values published
    /// before this call are never delivered to it.
    pub fn subscribe(&self, topic: &str) -> Subscription<T> {
        let mut inner = self.lock();
        let capacity = self.capacity;
        let tx = inner
            .topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(capacity).0);
        Subscription { rx: tx.subscribe() }
    }

    /// Most recently published value for `topic`, if any. Does not consume
    /// from any inbox and never blocks.
    pub fn latest(&self, topic: &str) -> Option<T> {
        self.lock().latest.get(topic).cloned()
    }
}

impl<T: Clone> Default for EventBus<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// One subscriber's inbox for a topic.
pub struct Subscription<T> {
    rx: broadcast::Receiver<T>,
}

impl<T: Clone> Subscription<T> {
    /// Next value, waiting if none is buffered. Returns `None` only when
    /// the bus side of the topic is gone. Overflow (oldest values dropped)
    /// is absorbed silently — that is the backpressure policy, not an error.
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            match self.rx.recv().await {
                Ok(value) => return Some(value),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    trace!("bus: subscriber lagged, dropped {} oldest", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking receive.
    pub fn try_recv(&mut self) -> Option<T> {
        loop {
            match self.rx.try_recv() {
                Ok(value) => return Some(value),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }
}
