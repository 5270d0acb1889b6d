use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::oneshot;

use super::subscriber::Subscriber;
use super::subscription::{Subscription, SubscriptionState};
use crate::error::CatError;

type SubscribeFn<T> = dyn Fn(Subscriber<T>) + Send + Sync;

/// A cold stream of values.
///
/// An observable is defined by the function that runs for every new
/// subscriber. Nothing happens until [`subscribe`](Self::subscribe) is called,
/// and each subscription runs the function again.
///
/// # Examples
///
/// ```
/// use fluxcat::Observable;
/// use std::sync::{Arc, Mutex};
///
/// let seen = Arc::new(Mutex::new(Vec::new()));
/// let seen_clone = seen.clone();
///
/// let _subscription = Observable::from_iter(vec![1, 2, 3])
///     .map(|n| n * 10)
///     .subscribe_next(move |n| seen_clone.lock().unwrap().push(n));
///
/// assert_eq!(*seen.lock().unwrap(), vec![10, 20, 30]);
/// ```
pub struct Observable<T> {
    subscribe_fn: Arc<SubscribeFn<T>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            subscribe_fn: Arc::clone(&self.subscribe_fn),
        }
    }
}

impl<T: Send + 'static> Observable<T> {
    /// Create an observable from its subscribe function.
    pub fn new<F>(subscribe: F) -> Self
    where
        F: Fn(Subscriber<T>) + Send + Sync + 'static,
    {
        Self {
            subscribe_fn: Arc::new(subscribe),
        }
    }

    /// Emit `value` then complete.
    pub fn of(value: T) -> Self
    where
        T: Clone + Sync,
    {
        Self::new(move |subscriber| {
            subscriber.on_next(value.clone());
            subscriber.on_completed();
        })
    }

    /// Emit every item in order then complete.
    pub fn from_iter<I>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Clone + Sync,
    {
        let items: Vec<T> = items.into_iter().collect();
        Self::new(move |subscriber| {
            for item in &items {
                if subscriber.is_closed() {
                    return;
                }
                subscriber.on_next(item.clone());
            }
            subscriber.on_completed();
        })
    }

    /// Complete without emitting.
    pub fn empty() -> Self {
        Self::new(|subscriber| subscriber.on_completed())
    }

    /// Never emit and never terminate.
    pub fn never() -> Self {
        Self::new(|_| {})
    }

    /// Fail with `error` on subscription.
    pub fn throw(error: CatError) -> Self {
        Self::new(move |subscriber| subscriber.on_error(error.clone()))
    }

    /// Subscribe with handlers for values, errors and completion.
    pub fn subscribe<N, E, C>(&self, on_next: N, on_error: E, on_completed: C) -> Subscription
    where
        N: Fn(T) + Send + Sync + 'static,
        E: Fn(CatError) + Send + Sync + 'static,
        C: Fn() + Send + Sync + 'static,
    {
        let state = SubscriptionState::new();
        let subscriber = Subscriber::new(Arc::clone(&state), on_next, on_error, on_completed);
        self.subscribe_with(subscriber);
        Subscription::from_state(state)
    }

    /// Subscribe to values only.
    pub fn subscribe_next<N>(&self, on_next: N) -> Subscription
    where
        N: Fn(T) + Send + Sync + 'static,
    {
        self.subscribe(on_next, |_| {}, || {})
    }

    /// Subscribe to the error notification only.
    pub fn subscribe_error<E>(&self, on_error: E) -> Subscription
    where
        E: Fn(CatError) + Send + Sync + 'static,
    {
        self.subscribe(|_| {}, on_error, || {})
    }

    /// Subscribe to the completion notification only.
    pub fn subscribe_completed<C>(&self, on_completed: C) -> Subscription
    where
        C: Fn() + Send + Sync + 'static,
    {
        self.subscribe(|_| {}, |_| {}, on_completed)
    }

    /// Run the subscribe function for an existing subscriber.
    pub(crate) fn subscribe_with(&self, subscriber: Subscriber<T>) {
        (self.subscribe_fn)(subscriber);
    }

    /// Resolve with the last value once the stream completes.
    ///
    /// Yields `Ok(None)` when the stream completes without a value or its
    /// source goes away without terminating, and `Err` when it errors.
    pub fn to_future(&self) -> impl Future<Output = Result<Option<T>, CatError>> + Send + 'static {
        let (tx, rx) = oneshot::channel();
        let tx = Arc::new(Mutex::new(Some(tx)));
        let last = Arc::new(Mutex::new(None));

        let subscription = self.subscribe(
            {
                let last = Arc::clone(&last);
                move |value| *last.lock() = Some(value)
            },
            {
                let tx = Arc::clone(&tx);
                move |err| {
                    if let Some(tx) = tx.lock().take() {
                        let _ = tx.send(Err(err));
                    }
                }
            },
            move || {
                if let Some(tx) = tx.lock().take() {
                    let _ = tx.send(Ok(last.lock().take()));
                }
            },
        );

        async move {
            let _subscription = subscription;
            rx.await.unwrap_or(Ok(None))
        }
    }
}

impl<T> std::fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observable").finish_non_exhaustive()
    }
}
