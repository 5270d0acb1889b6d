use parking_lot::Mutex;
use std::sync::Arc;

use super::observable::Observable;
use super::subscriber::Subscriber;
use crate::error::CatError;

/// A hot, multicast list of subscribers.
///
/// Dispatch notifies a snapshot of the live subscribers in registration
/// order. The lock is released before any subscriber runs, so callbacks may
/// subscribe, unsubscribe or dispatch again. A subscriber added during a
/// dispatch is not part of it; one disposed during a dispatch is skipped.
///
/// Unsubscribing only marks the subscriber closed; closed entries are
/// compacted on the next dispatch, or on `add` once the list has doubled
/// since it was last compacted.
pub struct Subject<T> {
    subscribers: Mutex<Subscribers<T>>,
}

/// Smallest list `add` bothers compacting.
const MIN_COMPACT_LEN: usize = 8;

struct Subscribers<T> {
    list: Vec<Subscriber<T>>,
    // Length right after the last compaction.
    compacted_len: usize,
}

impl<T: 'static> Subscribers<T> {
    fn compact(&mut self) {
        self.list.retain(|s| !s.is_closed());
        self.compacted_len = self.list.len();
    }
}

impl<T: Clone + Send + 'static> Subject<T> {
    /// Create a subject without subscribers.
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Subscribers {
                list: Vec::new(),
                compacted_len: 0,
            }),
        }
    }

    /// Notify every live subscriber of `value`.
    pub fn next(&self, value: T) {
        for subscriber in self.snapshot() {
            subscriber.on_next(value.clone());
        }
    }

    /// Deliver `error` to every live subscriber.
    ///
    /// The subscribers terminate; the subject stays usable for new ones.
    pub fn error(&self, error: CatError) {
        for subscriber in self.snapshot() {
            subscriber.on_error(error.clone());
        }
    }

    /// Whether any subscriber is still listening.
    pub fn has_observers(&self) -> bool {
        self.subscribers.lock().list.iter().any(|s| !s.is_closed())
    }

    /// Number of live subscribers.
    pub fn observer_count(&self) -> usize {
        self.subscribers
            .lock()
            .list
            .iter()
            .filter(|s| !s.is_closed())
            .count()
    }

    /// Add a subscriber. It is removed once its subscription closes.
    pub fn add(&self, subscriber: Subscriber<T>) {
        let mut subscribers = self.subscribers.lock();
        if subscribers.list.len() >= (2 * subscribers.compacted_len).max(MIN_COMPACT_LEN) {
            subscribers.compact();
        }
        subscribers.list.push(subscriber);
    }

    /// An observable that subscribes to this subject.
    pub fn observable(self: &Arc<Self>) -> Observable<T> {
        let subject = Arc::clone(self);
        Observable::new(move |subscriber| subject.add(subscriber))
    }

    fn snapshot(&self) -> Vec<Subscriber<T>> {
        let mut subscribers = self.subscribers.lock();
        subscribers.compact();
        subscribers.list.clone()
    }
}

impl<T: Clone + Send + 'static> Default for Subject<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for Subject<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subject")
            .field("subscribers", &self.subscribers.lock().list.len())
            .finish()
    }
}
