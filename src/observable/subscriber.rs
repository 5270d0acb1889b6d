use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::subscription::{Subscription, SubscriptionState};
use crate::error::CatError;

struct Handlers<T> {
    next: Box<dyn Fn(T) + Send + Sync>,
    error: Box<dyn Fn(CatError) + Send + Sync>,
    completed: Box<dyn Fn() + Send + Sync>,
    stopped: AtomicBool,
    // Operator-internal subscribers leave closing to the end of the chain.
    closes_state: bool,
}

/// The receiving end of an [`Observable`](super::Observable).
///
/// A subscriber accepts any number of `on_next` calls followed by at most one
/// `on_error` or `on_completed`. Nothing is delivered after a terminal
/// notification or after its subscription was disposed.
pub struct Subscriber<T> {
    handlers: Arc<Handlers<T>>,
    state: Arc<SubscriptionState>,
}

impl<T> Clone for Subscriber<T> {
    fn clone(&self) -> Self {
        Self {
            handlers: Arc::clone(&self.handlers),
            state: Arc::clone(&self.state),
        }
    }
}

impl<T: 'static> Subscriber<T> {
    pub(crate) fn new<N, E, C>(
        state: Arc<SubscriptionState>,
        next: N,
        error: E,
        completed: C,
    ) -> Self
    where
        N: Fn(T) + Send + Sync + 'static,
        E: Fn(CatError) + Send + Sync + 'static,
        C: Fn() + Send + Sync + 'static,
    {
        Self::build(state, true, next, error, completed)
    }

    fn build<N, E, C>(
        state: Arc<SubscriptionState>,
        closes_state: bool,
        next: N,
        error: E,
        completed: C,
    ) -> Self
    where
        N: Fn(T) + Send + Sync + 'static,
        E: Fn(CatError) + Send + Sync + 'static,
        C: Fn() + Send + Sync + 'static,
    {
        Self {
            handlers: Arc::new(Handlers {
                next: Box::new(next),
                error: Box::new(error),
                completed: Box::new(completed),
                stopped: AtomicBool::new(false),
                closes_state,
            }),
            state,
        }
    }

    /// Deliver a value.
    pub fn on_next(&self, value: T) {
        if self.is_closed() {
            return;
        }
        (self.handlers.next)(value);
    }

    /// Deliver a terminal error and dispose the subscription.
    pub fn on_error(&self, error: CatError) {
        if self.stop() {
            (self.handlers.error)(error);
            self.finish();
        }
    }

    /// Deliver completion and dispose the subscription.
    pub fn on_completed(&self) {
        if self.stop() {
            (self.handlers.completed)();
            self.finish();
        }
    }

    /// Whether notifications are still accepted.
    pub fn is_closed(&self) -> bool {
        self.state.is_closed() || self.handlers.stopped.load(Ordering::Acquire)
    }

    /// Run `teardown` when the subscription is disposed.
    pub fn add_teardown<F>(&self, teardown: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.state.add_teardown(Box::new(teardown));
    }

    /// Dispose `child` when this subscriber's subscription is disposed.
    pub fn add(&self, child: Subscription) {
        self.add_teardown(move || drop(child));
    }

    /// An upstream subscriber for an operator: values go to `next`, terminal
    /// notifications are forwarded to `self`.
    ///
    /// The derived subscriber shares this subscriber's subscription, so
    /// disposing either tears down both.
    pub(crate) fn derive<U, N>(&self, next: N) -> Subscriber<U>
    where
        U: 'static,
        N: Fn(U) + Send + Sync + 'static,
    {
        let on_error = self.clone();
        let on_completed = self.clone();
        self.derive_with(
            next,
            move |err| on_error.on_error(err),
            move || on_completed.on_completed(),
        )
    }

    /// Like [`derive`](Self::derive) with custom terminal handlers.
    pub(crate) fn derive_with<U, N, E, C>(&self, next: N, error: E, completed: C) -> Subscriber<U>
    where
        U: 'static,
        N: Fn(U) + Send + Sync + 'static,
        E: Fn(CatError) + Send + Sync + 'static,
        C: Fn() + Send + Sync + 'static,
    {
        Subscriber::build(Arc::clone(&self.state), false, next, error, completed)
    }

    fn stop(&self) -> bool {
        !self.state.is_closed() && !self.handlers.stopped.swap(true, Ordering::AcqRel)
    }

    fn finish(&self) {
        if self.handlers.closes_state {
            self.state.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn recording() -> (Subscriber<i32>, Arc<Mutex<Vec<String>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (l1, l2, l3) = (log.clone(), log.clone(), log.clone());
        let subscriber = Subscriber::new(
            SubscriptionState::new(),
            move |v| l1.lock().push(format!("next {v}")),
            move |e| l2.lock().push(format!("error {e}")),
            move || l3.lock().push("completed".to_string()),
        );
        (subscriber, log)
    }

    #[test]
    fn nothing_after_completion() {
        let (subscriber, log) = recording();
        subscriber.on_next(1);
        subscriber.on_completed();
        subscriber.on_next(2);
        subscriber.on_error(CatError::NoRuntime);
        subscriber.on_completed();

        assert_eq!(*log.lock(), vec!["next 1", "completed"]);
        assert!(subscriber.is_closed());
    }

    #[test]
    fn error_runs_teardowns() {
        let (subscriber, log) = recording();
        let torn_down = Arc::new(AtomicBool::new(false));
        let torn_down_clone = torn_down.clone();
        subscriber.add_teardown(move || torn_down_clone.store(true, Ordering::SeqCst));

        subscriber.on_error(CatError::NoRuntime);

        assert!(torn_down.load(Ordering::SeqCst));
        assert_eq!(log.lock().len(), 1);
    }

    #[test]
    fn derived_error_reaches_downstream() {
        let (subscriber, log) = recording();
        let upstream: Subscriber<&str> = subscriber.derive({
            let downstream = subscriber.clone();
            move |s: &str| downstream.on_next(s.len() as i32)
        });

        upstream.on_next("abc");
        upstream.on_error(CatError::NoRuntime);
        upstream.on_next("ignored");

        assert_eq!(
            *log.lock(),
            vec![
                "next 3".to_string(),
                format!("error {}", CatError::NoRuntime)
            ]
        );
    }
}
