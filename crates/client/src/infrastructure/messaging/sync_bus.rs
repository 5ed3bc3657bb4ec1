//! Sync bus - notifies UI surfaces of read-state changes.
//!
//! Push-based: subscribers register callbacks that are invoked synchronously
//! whenever apparent state changes for any id, so a list page and a header
//! notification bell repaint together without polling the store.
//!
//! Callbacks run in registration order. A panicking callback is isolated and
//! logged; the remaining callbacks still run. Dispatch holds the subscriber
//! lock, so callbacks must not subscribe or unsubscribe from within.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use readsync_domain::ReadStateEvent;

type SyncCallback = Box<dyn FnMut(ReadStateEvent) + Send + 'static>;

#[derive(Default)]
struct BusInner {
    next_id: u64,
    subscribers: Vec<(u64, SyncCallback)>,
}

/// Bus for read-state change notifications.
#[derive(Clone, Default)]
pub struct SyncBus {
    inner: Arc<Mutex<BusInner>>,
}

impl SyncBus {
    /// Create a new bus with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BusInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Subscribe to all read-state changes.
    ///
    /// The callback is invoked for every event until the returned
    /// subscription is dropped or explicitly unsubscribed, giving
    /// component-lifetime registration: hold the subscription for as long as
    /// the surface is mounted.
    pub fn subscribe(
        &self,
        callback: impl FnMut(ReadStateEvent) + Send + 'static,
    ) -> SyncSubscription {
        let mut inner = self.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.subscribers.push((id, Box::new(callback)));
        SyncSubscription {
            bus: Arc::downgrade(&self.inner),
            id,
        }
    }

    /// Dispatch an event to all subscribers, in registration order.
    ///
    /// Called by the store facade and the scheduler worker. Each subscriber
    /// receives a clone of the event; a panic in one subscriber is caught and
    /// logged without affecting the others.
    pub fn dispatch(&self, event: ReadStateEvent) {
        let mut inner = self.lock();
        for (id, subscriber) in inner.subscribers.iter_mut() {
            let result = catch_unwind(AssertUnwindSafe(|| subscriber(event.clone())));
            if result.is_err() {
                tracing::error!(subscriber_id = *id, "sync subscriber panicked; isolating");
            }
        }
    }

    /// Get the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }
}

/// Handle for a registered callback; dropping it unsubscribes.
pub struct SyncSubscription {
    bus: Weak<Mutex<BusInner>>,
    id: u64,
}

impl SyncSubscription {
    /// Remove the callback from the bus now rather than at drop.
    pub fn unsubscribe(self) {
        // Drop does the work
    }
}

impl Drop for SyncSubscription {
    fn drop(&mut self) {
        if let Some(inner) = self.bus.upgrade() {
            let mut inner = inner.lock().unwrap_or_else(PoisonError::into_inner);
            inner.subscribers.retain(|(id, _)| *id != self.id);
        }
    }
}
