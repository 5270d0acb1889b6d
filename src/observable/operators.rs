//! Operators over [`Observable`].
//!
//! Only the operators the action/store machinery needs: transformation
//! (`map`, `filter`), flattening (`flat_map`), joining (`combine_latest`),
//! slicing (`take`, `first`, `skip`) and timing (`delay`).

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use super::observable::Observable;
use super::subscriber::Subscriber;
use super::subscription::Subscription;
use crate::error::CatError;

impl<T: Send + 'static> Observable<T> {
    /// Transform every value with `f`.
    pub fn map<U, F>(&self, f: F) -> Observable<U>
    where
        U: Send + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        let source = self.clone();
        let f = Arc::new(f);
        Observable::new(move |downstream: Subscriber<U>| {
            let f = Arc::clone(&f);
            let forward = downstream.clone();
            source.subscribe_with(downstream.derive(move |value| forward.on_next(f(value))));
        })
    }

    /// Keep only the values matching `predicate`.
    pub fn filter<F>(&self, predicate: F) -> Observable<T>
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let source = self.clone();
        let predicate = Arc::new(predicate);
        Observable::new(move |downstream: Subscriber<T>| {
            let predicate = Arc::clone(&predicate);
            let forward = downstream.clone();
            source.subscribe_with(downstream.derive(move |value| {
                if predicate(&value) {
                    forward.on_next(value);
                }
            }));
        })
    }

    /// Map every value to an inner observable and merge their outputs.
    ///
    /// Completes once the source and every inner observable completed.
    /// An error from any of them is forwarded.
    pub fn flat_map<U, F>(&self, f: F) -> Observable<U>
    where
        U: Send + 'static,
        F: Fn(T) -> Observable<U> + Send + Sync + 'static,
    {
        let source = self.clone();
        let f = Arc::new(f);
        Observable::new(move |downstream: Subscriber<U>| {
            let progress = Arc::new(Mutex::new(FlatMapProgress::default()));
            let inners: Arc<Mutex<Vec<Subscription>>> = Arc::new(Mutex::new(Vec::new()));
            downstream.add_teardown({
                let inners = Arc::clone(&inners);
                move || drop(std::mem::take(&mut *inners.lock()))
            });

            let on_next = {
                let f = Arc::clone(&f);
                let progress = Arc::clone(&progress);
                let downstream = downstream.clone();
                let inners = Arc::clone(&inners);
                move |value| {
                    progress.lock().active += 1;
                    let inner = f(value);

                    let next = downstream.clone();
                    let error = downstream.clone();
                    let completed = downstream.clone();
                    let progress = Arc::clone(&progress);
                    let subscription = inner.subscribe(
                        move |item| next.on_next(item),
                        move |err| error.on_error(err),
                        move || {
                            let done = {
                                let mut progress = progress.lock();
                                progress.active -= 1;
                                progress.active == 0 && progress.outer_done
                            };
                            if done {
                                completed.on_completed();
                            }
                        },
                    );

                    if subscription.is_closed() || downstream.is_closed() {
                        return;
                    }
                    let mut inners = inners.lock();
                    inners.retain(|s| !s.is_closed());
                    inners.push(subscription);
                }
            };

            let on_error = {
                let downstream = downstream.clone();
                move |err| downstream.on_error(err)
            };

            let on_completed = {
                let downstream = downstream.clone();
                move || {
                    let done = {
                        let mut progress = progress.lock();
                        progress.outer_done = true;
                        progress.active == 0
                    };
                    if done {
                        downstream.on_completed();
                    }
                }
            };

            source.subscribe_with(downstream.derive_with(on_next, on_error, on_completed));
        })
    }

    /// Emit the first `count` values then complete.
    pub fn take(&self, count: usize) -> Observable<T> {
        let source = self.clone();
        Observable::new(move |downstream: Subscriber<T>| {
            if count == 0 {
                downstream.on_completed();
                return;
            }
            let remaining = Mutex::new(count);
            let forward = downstream.clone();
            source.subscribe_with(downstream.derive(move |value| {
                let last = {
                    let mut remaining = remaining.lock();
                    if *remaining == 0 {
                        return;
                    }
                    *remaining -= 1;
                    *remaining == 0
                };
                forward.on_next(value);
                if last {
                    forward.on_completed();
                }
            }));
        })
    }

    /// Emit the first value then complete.
    pub fn first(&self) -> Observable<T> {
        self.take(1)
    }

    /// Drop the first `count` values.
    pub fn skip(&self, count: usize) -> Observable<T> {
        let source = self.clone();
        Observable::new(move |downstream: Subscriber<T>| {
            let skipped = Mutex::new(0usize);
            let forward = downstream.clone();
            source.subscribe_with(downstream.derive(move |value| {
                {
                    let mut skipped = skipped.lock();
                    if *skipped < count {
                        *skipped += 1;
                        return;
                    }
                }
                forward.on_next(value);
            }));
        })
    }

    /// Shift every value and the completion by `duration`.
    ///
    /// Values keep their order. Errors are forwarded immediately. Must be
    /// subscribed from within a tokio runtime; otherwise the subscriber
    /// receives [`CatError::NoRuntime`].
    pub fn delay(&self, duration: Duration) -> Observable<T> {
        let source = self.clone();
        Observable::new(move |downstream: Subscriber<T>| {
            let Ok(handle) = tokio::runtime::Handle::try_current() else {
                downstream.on_error(CatError::NoRuntime);
                return;
            };

            let (tx, mut rx) = mpsc::unbounded_channel::<(Instant, Delayed<T>)>();
            let worker = {
                let downstream = downstream.clone();
                handle.spawn(async move {
                    while let Some((at, item)) = rx.recv().await {
                        tokio::time::sleep_until(at).await;
                        match item {
                            Delayed::Next(value) => downstream.on_next(value),
                            Delayed::Completed => {
                                downstream.on_completed();
                                break;
                            }
                        }
                    }
                })
            };
            downstream.add_teardown(move || worker.abort());

            let next_tx = tx.clone();
            let forward = downstream.clone();
            source.subscribe_with(downstream.derive_with(
                move |value| {
                    let _ = next_tx.send((Instant::now() + duration, Delayed::Next(value)));
                },
                move |err| forward.on_error(err),
                move || {
                    let _ = tx.send((Instant::now() + duration, Delayed::Completed));
                },
            ));
        })
    }
}

impl<T: Clone + Send + Sync + 'static> Observable<T> {
    /// Emit the latest value of every source each time one of them emits,
    /// once all of them have emitted at least once.
    ///
    /// Completes when every source completed, or as soon as a source
    /// completes without ever emitting. With no sources it completes
    /// immediately.
    pub fn combine_latest(sources: Vec<Observable<T>>) -> Observable<Vec<T>> {
        let sources = Arc::new(sources);
        Observable::new(move |downstream: Subscriber<Vec<T>>| {
            let count = sources.len();
            if count == 0 {
                downstream.on_completed();
                return;
            }

            let latest = Arc::new(Mutex::new(Latest {
                values: vec![None; count],
                completed: 0,
            }));

            for (index, source) in sources.iter().enumerate() {
                if downstream.is_closed() {
                    return;
                }

                let next = downstream.clone();
                let error = downstream.clone();
                let completed = downstream.clone();
                let latest_next = Arc::clone(&latest);
                let latest_completed = Arc::clone(&latest);

                let subscription = source.subscribe(
                    move |value| {
                        let combined = {
                            let mut latest = latest_next.lock();
                            latest.values[index] = Some(value);
                            latest.values.iter().cloned().collect::<Option<Vec<T>>>()
                        };
                        if let Some(combined) = combined {
                            next.on_next(combined);
                        }
                    },
                    move |err| error.on_error(err),
                    move || {
                        let done = {
                            let mut latest = latest_completed.lock();
                            latest.completed += 1;
                            latest.completed == count || latest.values[index].is_none()
                        };
                        if done {
                            completed.on_completed();
                        }
                    },
                );
                downstream.add(subscription);
            }
        })
    }
}

#[derive(Default)]
struct FlatMapProgress {
    active: usize,
    outer_done: bool,
}

struct Latest<T> {
    values: Vec<Option<T>>,
    completed: usize,
}

enum Delayed<T> {
    Next(T),
    Completed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observable::Subject;

    fn collect<T: Clone + Send + 'static>(
        observable: &Observable<T>,
    ) -> (Subscription, Arc<Mutex<Vec<T>>>, Arc<Mutex<bool>>) {
        let values = Arc::new(Mutex::new(Vec::new()));
        let done = Arc::new(Mutex::new(false));
        let (values_clone, done_clone) = (values.clone(), done.clone());
        let subscription = observable.subscribe(
            move |v| values_clone.lock().push(v),
            |_| {},
            move || *done_clone.lock() = true,
        );
        (subscription, values, done)
    }

    #[test]
    fn map_and_filter() {
        let source = Observable::from_iter(1..=6);
        let (_s, values, done) = collect(&source.filter(|n| n % 2 == 0).map(|n| n * n));
        assert_eq!(*values.lock(), vec![4, 16, 36]);
        assert!(*done.lock());
    }

    #[test]
    fn take_and_skip() {
        let source = Observable::from_iter(vec!["a", "b", "c", "d"]);

        let (_s, values, done) = collect(&source.take(2));
        assert_eq!(*values.lock(), vec!["a", "b"]);
        assert!(*done.lock());

        let (_s, values, _) = collect(&source.skip(3));
        assert_eq!(*values.lock(), vec!["d"]);

        let (_s, values, done) = collect(&source.take(0));
        assert!(values.lock().is_empty());
        assert!(*done.lock());
    }

    #[test]
    fn first_unsubscribes_from_hot_source() {
        let subject = Arc::new(Subject::new());
        let (subscription, values, done) = collect(&subject.observable().first());
        assert!(subject.has_observers());

        subject.next(1);
        subject.next(2);

        assert_eq!(*values.lock(), vec![1]);
        assert!(*done.lock());
        assert!(subscription.is_closed());
        assert!(!subject.has_observers());
    }

    #[test]
    fn flat_map_completes_after_inners() {
        let outer = Arc::new(Subject::<i32>::new());
        let inner = Arc::new(Subject::<i32>::new());
        let inner_clone = inner.clone();

        let merged = outer
            .observable()
            .take(1)
            .flat_map(move |n| inner_clone.observable().take(1).map(move |m| n + m));
        let (_s, values, done) = collect(&merged);

        outer.next(10);
        assert!(!*done.lock());

        inner.next(5);
        assert_eq!(*values.lock(), vec![15]);
        assert!(*done.lock());
    }

    #[test]
    fn combine_latest_waits_for_every_source() {
        let a = Arc::new(Subject::<&str>::new());
        let b = Arc::new(Subject::<&str>::new());
        let combined = Observable::combine_latest(vec![a.observable(), b.observable()]);
        let (_s, values, _) = collect(&combined);

        a.next("a1");
        a.next("a2");
        assert!(values.lock().is_empty());

        b.next("b1");
        a.next("a3");
        assert_eq!(
            *values.lock(),
            vec![vec!["a2", "b1"], vec!["a3", "b1"]]
        );
    }

    #[test]
    fn combine_latest_completes_when_a_silent_source_completes() {
        let combined = Observable::combine_latest(vec![
            Observable::<i32>::never(),
            Observable::<i32>::empty(),
        ]);
        let (_s, values, done) = collect(&combined);
        assert!(values.lock().is_empty());
        assert!(*done.lock());
    }

    #[test]
    fn delay_without_runtime_errors() {
        let error = Arc::new(Mutex::new(None));
        let error_clone = error.clone();
        let _s = Observable::of(1)
            .delay(Duration::from_millis(10))
            .subscribe_error(move |e| *error_clone.lock() = Some(e));
        assert_eq!(*error.lock(), Some(CatError::NoRuntime));
    }

    #[tokio::test(start_paused = true)]
    async fn delay_shifts_values_in_order() {
        let subject = Arc::new(Subject::<i32>::new());
        let (_s, values, done) = collect(&subject.observable().take(2).delay(Duration::from_millis(500)));

        subject.next(1);
        subject.next(2);
        assert!(values.lock().is_empty());

        tokio::time::sleep(Duration::from_millis(499)).await;
        assert!(values.lock().is_empty());

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(*values.lock(), vec![1, 2]);
        assert!(*done.lock());
    }
}
