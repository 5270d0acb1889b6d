use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

type Teardown = Box<dyn FnOnce() + Send>;

/// Shared disposal state of one subscription chain.
///
/// Every operator in a chain shares the state of the final subscriber, so
/// disposing the outer [`Subscription`] tears down the whole chain.
#[derive(Default)]
pub(crate) struct SubscriptionState {
    closed: AtomicBool,
    teardowns: Mutex<Vec<Teardown>>,
}

impl SubscriptionState {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Run `teardown` when the state closes, or right away if it already has.
    pub(crate) fn add_teardown(&self, teardown: Teardown) {
        if self.is_closed() {
            teardown();
            return;
        }

        let mut teardowns = self.teardowns.lock();
        if self.is_closed() {
            drop(teardowns);
            teardown();
            return;
        }
        teardowns.push(teardown);
    }

    /// Close the state and run every teardown exactly once.
    pub(crate) fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        // Taken out of the lock so teardowns may touch this state again.
        let teardowns = std::mem::take(&mut *self.teardowns.lock());
        for teardown in teardowns {
            teardown();
        }
    }
}

/// RAII guard for an active subscription.
///
/// Dropping the guard (or calling [`unsubscribe`](Self::unsubscribe))
/// disposes the subscription: no further notifications are delivered and
/// the subscriber is removed from its source. Disposal is idempotent and
/// may happen from inside a notification callback.
#[must_use = "dropping a Subscription unsubscribes it"]
pub struct Subscription {
    state: Option<Arc<SubscriptionState>>,
}

impl Subscription {
    pub(crate) fn from_state(state: Arc<SubscriptionState>) -> Self {
        Self { state: Some(state) }
    }

    /// Create a subscription that runs `teardown` when disposed.
    pub fn new<F>(teardown: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let state = SubscriptionState::new();
        state.add_teardown(Box::new(teardown));
        Self::from_state(state)
    }

    /// A subscription that is already closed.
    pub fn empty() -> Self {
        let state = SubscriptionState::new();
        state.close();
        Self::from_state(state)
    }

    /// Whether the subscription was disposed or its stream terminated.
    pub fn is_closed(&self) -> bool {
        self.state.as_ref().map_or(true, |state| state.is_closed())
    }

    /// Dispose `child` together with this subscription.
    pub fn add(&self, child: Subscription) {
        match &self.state {
            Some(state) => state.add_teardown(Box::new(move || drop(child))),
            None => drop(child),
        }
    }

    /// Dispose the subscription now.
    pub fn unsubscribe(self) {
        drop(self);
    }

    /// Let the subscription live as long as its source instead of this guard.
    ///
    /// The subscription can no longer be disposed from the outside; it still
    /// ends when the stream errors or completes.
    pub fn detach(mut self) {
        self.state.take();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(state) = self.state.take() {
            state.close();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn drop_runs_teardown_once() {
        let runs = Arc::new(AtomicUsize::new(0));
        let runs_clone = runs.clone();

        let subscription = Subscription::new(move || {
            runs_clone.fetch_add(1, Ordering::SeqCst);
        });
        assert!(!subscription.is_closed());

        drop(subscription);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn children_are_disposed_with_parent() {
        let runs = Arc::new(AtomicUsize::new(0));
        let runs_clone = runs.clone();

        let parent = Subscription::new(|| {});
        parent.add(Subscription::new(move || {
            runs_clone.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        parent.unsubscribe();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn adding_to_closed_subscription_disposes_immediately() {
        let runs = Arc::new(AtomicUsize::new(0));
        let runs_clone = runs.clone();

        let closed = Subscription::empty();
        assert!(closed.is_closed());
        closed.add(Subscription::new(move || {
            runs_clone.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn detach_keeps_teardown_pending() {
        let runs = Arc::new(AtomicUsize::new(0));
        let runs_clone = runs.clone();

        Subscription::new(move || {
            runs_clone.fetch_add(1, Ordering::SeqCst);
        })
        .detach();
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }
}
