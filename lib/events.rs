//! Invalidation notifications.
//!
//! [`EventHub`] is an explicit observer list. Subscribing returns a [`Subscription`] handle that
//! can later be passed to [`EventHub::unsubscribe`].

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// A cached object was superseded by a freshly built one.
#[derive(Debug)]
pub struct Invalidation<T> {
    /// The file key whose object was replaced.
    pub key: String,
    /// The object that was superseded. Still valid for anyone holding it.
    pub previous: Arc<T>,
    /// The object that replaced it.
    pub current: Arc<T>,
}

type Handler<T> = Arc<dyn Fn(&Invalidation<T>) + Send + Sync>;

/// Handle identifying one subscriber of an [`EventHub`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Subscription(u64);

/// Ordered list of invalidation observers.
///
/// # Concurrency
///
/// The subscriber list sits behind a `std::sync::RwLock`. [`publish`](Self::publish) takes a
/// snapshot and releases the lock before invoking any handler, so handlers may subscribe,
/// unsubscribe or call back into the cache.
pub struct EventHub<T> {
    // Ids are handed out monotonically, so key order is registration order.
    handlers: RwLock<BTreeMap<Subscription, Handler<T>>>,
    next_id: AtomicU64,
}

impl<T> Default for EventHub<T> {
    fn default() -> Self {
        Self {
            handlers: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(0),
        }
    }
}

impl<T> EventHub<T> {
    /// Register `handler`. It will see every event published from now on.
    pub fn subscribe<H>(&self, handler: H) -> Subscription
    where
        H: Fn(&Invalidation<T>) + Send + Sync + 'static,
    {
        let sub = Subscription(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(sub, Arc::new(handler));
        sub
    }

    /// Remove a subscriber. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, sub: Subscription) -> bool {
        self.handlers
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(&sub)
            .is_some()
    }

    /// Deliver `event` to every current subscriber in registration order.
    pub fn publish(&self, event: &Invalidation<T>) {
        let snapshot: Vec<Handler<T>> = self
            .handlers
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .values()
            .cloned()
            .collect();

        for handler in snapshot {
            handler(event);
        }
    }

    /// Returns the number of registered subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }
}
