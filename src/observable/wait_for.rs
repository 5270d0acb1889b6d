use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::observable::Observable;
use super::subscriber::Subscriber;

/// Wait until every source has emitted a new value.
///
/// Only values published after `wait_for` subscribed count: anything a
/// source emits while it is being subscribed, such as a store replaying its
/// current value, is ignored. Emits the first new value of each source, in
/// source order, as soon as the last of them emitted, then completes and
/// unsubscribes from all of them. With no sources it emits an empty list
/// right away.
///
/// # Examples
///
/// ```
/// use fluxcat::{wait_for, Subject};
/// use std::sync::{Arc, Mutex};
///
/// let a = Arc::new(Subject::new());
/// let b = Arc::new(Subject::new());
/// let seen = Arc::new(Mutex::new(Vec::new()));
/// let seen_clone = seen.clone();
///
/// let _s = wait_for(vec![a.observable(), b.observable()])
///     .subscribe_next(move |values| seen_clone.lock().unwrap().push(values));
///
/// a.next(1);
/// b.next(2);
/// assert_eq!(*seen.lock().unwrap(), vec![vec![1, 2]]);
/// ```
pub fn wait_for<T>(sources: Vec<Observable<T>>) -> Observable<Vec<T>>
where
    T: Clone + Send + Sync + 'static,
{
    if sources.is_empty() {
        return Observable::of(Vec::new());
    }
    Observable::combine_latest(sources.into_iter().map(|s| published(s).first()).collect())
        .first()
}

/// `source` without the values it emits while being subscribed.
fn published<T: Send + 'static>(source: Observable<T>) -> Observable<T> {
    Observable::new(move |downstream: Subscriber<T>| {
        let connecting = Arc::new(AtomicBool::new(true));
        let forward = downstream.clone();
        let live = Arc::clone(&connecting);
        source.subscribe_with(downstream.derive(move |value| {
            if !live.load(Ordering::Acquire) {
                forward.on_next(value);
            }
        }));
        connecting.store(false, Ordering::Release);
    })
}
