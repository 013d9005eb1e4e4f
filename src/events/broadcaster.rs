//! Non-blocking fan-out of lifecycle events.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use super::LifecycleEvent;

/// Events buffered per observer before new ones are dropped for it.
pub const DEFAULT_OBSERVER_CAPACITY: usize = 32;

/// Global counter for observer ID generation.
static COUNTER: AtomicU64 = AtomicU64::new(1);

/// Identifier of a connected observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

impl ObserverId {
    fn next() -> Self {
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "obs-{:08x}", self.0)
    }
}

/// Receiving end held by one observer.
#[derive(Debug)]
pub struct Subscription {
    id: ObserverId,
    rx: mpsc::Receiver<LifecycleEvent>,
}

impl Subscription {
    pub fn id(&self) -> ObserverId {
        self.id
    }

    /// Wait for the next event. `None` once the broadcaster dropped us.
    pub async fn recv(&mut self) -> Option<LifecycleEvent> {
        self.rx.recv().await
    }

    /// Take an already-delivered event without waiting.
    pub fn try_recv(&mut self) -> Option<LifecycleEvent> {
        self.rx.try_recv().ok()
    }
}

/// Delivers events to whoever is connected right now.
///
/// Nothing is queued for observers that are gone and nothing is replayed
/// to new ones, apart from the optional first event passed to
/// [`subscribe`](Self::subscribe). Publication never waits: an observer
/// whose buffer is full misses the event, and a closed one is dropped.
pub struct EventBroadcaster {
    observers: RwLock<HashMap<ObserverId, mpsc::Sender<LifecycleEvent>>>,
    capacity: usize,
}

impl EventBroadcaster {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_OBSERVER_CAPACITY)
    }

    /// Create a broadcaster buffering `capacity` events per observer.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            observers: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Register an observer, optionally handing it `first` before anything
    /// published later.
    pub fn subscribe(&self, first: Option<LifecycleEvent>) -> Subscription {
        let (tx, rx) = mpsc::channel(self.capacity);
        let id = ObserverId::next();

        if let Some(event) = first {
            // Fresh channel with capacity >= 1, cannot be full.
            let _ = tx.try_send(event);
        }

        self.observers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, tx);
        debug!("Observer {} connected", id);

        Subscription { id, rx }
    }

    /// Remove an observer.
    pub fn unsubscribe(&self, id: ObserverId) {
        if self
            .observers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id)
            .is_some()
        {
            debug!("Observer {} disconnected", id);
        }
    }

    /// Deliver `event` to every connected observer.
    ///
    /// Returns the number of observers that received it.
    pub fn publish(&self, event: &LifecycleEvent) -> usize {
        let mut observers = self.observers.write().unwrap_or_else(|e| e.into_inner());
        let mut delivered = 0;

        observers.retain(|id, tx| match tx.try_send(event.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                warn!("Observer {} is lagging, dropped {:?} event", id, event.state);
                true
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Observer {} went away", id);
                false
            }
        });

        delivered
    }

    /// Number of registered observers.
    pub fn observer_count(&self) -> usize {
        self.observers.read().map(|o| o.len()).unwrap_or(0)
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}
