use super::change::RegistryChange;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;
use tracing::{Level, event};

/// Synchronous observer of structural changes.
///
/// Called on the mutating thread after the registry state reflects the
/// change and before the mutating call returns. Implementations may read the
/// registry but must not mutate it from inside the callback. A panicking
/// listener is logged and skipped; it does not stop delivery.
pub trait ChangeListener: Send + Sync {
    fn on_change(&self, change: &RegistryChange);
}

impl<F> ChangeListener for F
where
    F: Fn(&RegistryChange) + Send + Sync,
{
    fn on_change(&self, change: &RegistryChange) {
        self(change)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener_{}", self.0)
    }
}

/// Fans one change out to registered listeners, in registration order, and
/// then to every async feed receiver.
pub struct ChangeNotifier {
    listeners: RwLock<Vec<(ListenerId, Arc<dyn ChangeListener>)>>,
    next_id: AtomicU64,
    feed: broadcast::Sender<RegistryChange>,
}

impl ChangeNotifier {
    /// `feed_capacity` must be non-zero.
    pub fn new(feed_capacity: usize) -> Self {
        let (feed, _) = broadcast::channel(feed_capacity);
        Self {
            listeners: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            feed,
        }
    }

    pub fn subscribe(&self, listener: Arc<dyn ChangeListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, listener));
        id
    }

    /// Returns `false` when the id was not registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// New receiver for the async feed. Only events sent after this call are
    /// delivered.
    pub fn feed(&self) -> broadcast::Receiver<RegistryChange> {
        self.feed.subscribe()
    }

    pub(crate) fn notify(&self, change: RegistryChange) {
        // Listeners run without the list lock held so they may (un)subscribe.
        let listeners: Vec<Arc<dyn ChangeListener>> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in &listeners {
            let delivered = panic::catch_unwind(AssertUnwindSafe(|| listener.on_change(&change)));
            if delivered.is_err() {
                // The change is already committed; the rest still get it.
                event!(Level::ERROR, kind = ?change.kind(), "change listener panicked");
            }
        }

        // No receivers is not an error.
        let _ = self.feed.send(change);
    }
}

impl fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeNotifier")
            .field("listeners", &self.listener_count())
            .field("feed_receivers", &self.feed.receiver_count())
            .finish()
    }
}
