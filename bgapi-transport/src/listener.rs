//! Listener traits and the copy-on-write set that holds them.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use bgapi_protocol::BgapiEvent;
use parking_lot::{Mutex, RwLock};

use crate::error::TransportError;

/// Receives unsolicited device events.
///
/// Called on a blocking worker thread, once per event. Each listener sees
/// events one at a time in the order they arrived on the link; different
/// listeners run independently, so a slow listener only delays itself.
/// A panic is caught and logged, and delivery continues with the next
/// event.
pub trait BgapiEventListener: Send + Sync {
    fn bgapi_event_received(&self, event: &BgapiEvent);
}

impl<F> BgapiEventListener for F
where
    F: Fn(&BgapiEvent) + Send + Sync,
{
    fn bgapi_event_received(&self, event: &BgapiEvent) {
        self(event)
    }
}

/// Notified once when the link terminates, cleanly or not.
pub trait BgapiHandlerListener: Send + Sync {
    fn bgapi_closed(&self, reason: &TransportError);
}

impl<F> BgapiHandlerListener for F
where
    F: Fn(&TransportError) + Send + Sync,
{
    fn bgapi_closed(&self, reason: &TransportError) {
        self(reason)
    }
}

/// Concurrent listener set.
///
/// Membership is compared by allocation address. Iteration works on a
/// snapshot, so add/remove during dispatch takes effect for the next event
/// and is never lost.
pub struct ListenerSet<T: ?Sized> {
    inner: RwLock<Arc<Vec<Arc<T>>>>,
}

impl<T: ?Sized> Default for ListenerSet<T> {
    fn default() -> Self {
        Self {
            inner: RwLock::new(Arc::new(Vec::new())),
        }
    }
}

fn same<T: ?Sized>(a: &Arc<T>, b: &Arc<T>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

impl<T: ?Sized> ListenerSet<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a listener. Returns false if it was already registered.
    pub fn add(&self, listener: Arc<T>) -> bool {
        let mut guard = self.inner.write();
        if guard.iter().any(|l| same(l, &listener)) {
            return false;
        }
        let mut next = Vec::with_capacity(guard.len() + 1);
        next.extend(guard.iter().cloned());
        next.push(listener);
        *guard = Arc::new(next);
        true
    }

    /// Remove a listener. Returns false if it was not registered.
    pub fn remove(&self, listener: &Arc<T>) -> bool {
        let mut guard = self.inner.write();
        if !guard.iter().any(|l| same(l, listener)) {
            return false;
        }
        let next: Vec<Arc<T>> = guard.iter().filter(|l| !same(l, listener)).cloned().collect();
        *guard = Arc::new(next);
        true
    }

    pub fn snapshot(&self) -> Arc<Vec<Arc<T>>> {
        Arc::clone(&self.inner.read())
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

/// An event listener together with the events still waiting for it.
pub struct EventQueue {
    listener: Arc<dyn BgapiEventListener>,
    state: Mutex<QueueState>,
}

#[derive(Default)]
struct QueueState {
    events: VecDeque<Arc<BgapiEvent>>,
    draining: bool,
}

impl EventQueue {
    pub fn new(listener: Arc<dyn BgapiEventListener>) -> Self {
        Self {
            listener,
            state: Mutex::new(QueueState::default()),
        }
    }

    /// Queue an event. Returns true when no drain is running and the
    /// caller has to start one.
    pub fn push(&self, event: Arc<BgapiEvent>) -> bool {
        let mut state = self.state.lock();
        state.events.push_back(event);
        !std::mem::replace(&mut state.draining, true)
    }

    /// Deliver queued events in order until the queue is empty.
    ///
    /// `on_panic` is called with the event a listener call panicked on.
    pub fn drain<F: Fn(&BgapiEvent)>(&self, on_panic: F) {
        loop {
            let event = {
                let mut state = self.state.lock();
                match state.events.pop_front() {
                    Some(event) => event,
                    None => {
                        state.draining = false;
                        return;
                    }
                }
            };
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.listener.bgapi_event_received(&event)));
            if outcome.is_err() {
                on_panic(&event);
            }
        }
    }
}

impl ListenerSet<EventQueue> {
    /// Add an event listener with an empty queue. Returns false if it was
    /// already registered.
    pub fn add_listener(&self, listener: Arc<dyn BgapiEventListener>) -> bool {
        let mut guard = self.inner.write();
        if guard.iter().any(|q| same(&q.listener, &listener)) {
            return false;
        }
        let mut next = Vec::with_capacity(guard.len() + 1);
        next.extend(guard.iter().cloned());
        next.push(Arc::new(EventQueue::new(listener)));
        *guard = Arc::new(next);
        true
    }

    /// Remove an event listener. Returns false if it was not registered.
    pub fn remove_listener(&self, listener: &Arc<dyn BgapiEventListener>) -> bool {
        let mut guard = self.inner.write();
        if !guard.iter().any(|q| same(&q.listener, listener)) {
            return false;
        }
        let next: Vec<Arc<EventQueue>> = guard.iter().filter(|q| !same(&q.listener, listener)).cloned().collect();
        *guard = Arc::new(next);
        true
    }
}
