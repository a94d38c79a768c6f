// In-process change notifications for the item store

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::{debug, warn};

/// What changed in the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    Created { id: String },
    Updated { id: String },
    /// Ids actually removed by one delete call; may be empty
    Deleted { ids: Vec<String> },
}

type Observer = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    revision: u64,
    observers: Vec<(u64, Observer)>,
}

/// Publish/subscribe channel owned by whoever builds the store
///
/// Cloning yields another handle to the same channel, so the store and each
/// view can hold one without any process-wide state.
#[derive(Clone, Default)]
pub struct ChangeNotifier {
    registry: Arc<Mutex<Registry>>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer for every future event
    ///
    /// The observer stays registered until the returned handle is dropped.
    pub fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        let mut registry = self.lock();
        let id = registry.next_id;
        registry.next_id += 1;
        registry.observers.push((id, Arc::new(observer)));
        debug!(subscription = id, "Observer subscribed");

        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Deliver an event to all current observers in subscription order
    ///
    /// Runs on the calling thread. A panicking observer is logged and skipped.
    /// Returns the number of observers that handled the event without panicking.
    pub fn notify(&self, event: &ChangeEvent) -> usize {
        // Snapshot so observers can (un)subscribe from inside their callback
        let observers: Vec<(u64, Observer)> = {
            let mut registry = self.lock();
            registry.revision += 1;
            registry.observers.clone()
        };

        let mut delivered = 0;
        for (id, observer) in observers {
            match catch_unwind(AssertUnwindSafe(|| observer(event))) {
                Ok(()) => delivered += 1,
                Err(_) => warn!(subscription = id, ?event, "Observer panicked, skipping"),
            }
        }
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().observers.len()
    }

    /// Number of events published so far
    pub fn revision(&self) -> u64 {
        self.lock().revision
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registry = self.lock();
        f.debug_struct("ChangeNotifier")
            .field("subscribers", &registry.observers.len())
            .field("revision", &registry.revision)
            .finish()
    }
}

/// Handle for a registered observer. Dropping it unregisters the observer.
#[must_use = "dropping a Subscription immediately unsubscribes the observer"]
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Unsubscribe now rather than at end of scope
    pub fn cancel(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        // Notifier already gone: nothing to unregister
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        // The observer may own other subscriptions, so drop it after releasing the lock
        let removed = {
            let mut registry = registry.lock().unwrap_or_else(PoisonError::into_inner);
            let position = registry.observers.iter().position(|(id, _)| *id == self.id);
            position.map(|idx| registry.observers.remove(idx))
        };
        drop(removed);
        debug!(subscription = self.id, "Observer unsubscribed");
    }
}
