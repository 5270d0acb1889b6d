use parking_lot::{Mutex, ReentrantMutex, RwLock};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;

use tracing::{debug, warn};

use super::reduction::Reduction;
use crate::cat::Cat;
use crate::error::CatError;
use crate::observable::{Observable, Subject, Subscriber, Subscription};

type StoreInitFn = Arc<dyn Fn(StoreInit<'_>) -> anyhow::Result<()> + Send + Sync>;

/// Arguments of a store init hook.
pub struct StoreInit<'a> {
    /// The store being built.
    pub instance: &'a Store,
    /// The container registering it, if any.
    pub cat: Option<&'a Cat>,
    /// Construction arguments passed to the registration.
    pub args: &'a [Value],
}

/// Declarative definition of a store.
///
/// # Examples
///
/// ```
/// use fluxcat::{Action, Reduction, StoreDefinition};
/// use serde_json::json;
///
/// let rename = Action::<serde_json::Value>::new("rename").unwrap();
/// let hook_action = rename.clone();
///
/// let store = StoreDefinition::new("ProfileStore")
///     .value(json!({"name": "anon", "age": 3}))
///     .init(move |init| {
///         init.instance.register(hook_action.map(|name| {
///             Reduction::merge(json!({ "name": name }).as_object().cloned().unwrap_or_default())
///         }));
///         Ok(())
///     })
///     .create(None)
///     .unwrap();
///
/// rename.invoke(json!("lion-o"));
/// assert_eq!(store.value(), json!({"name": "lion-o", "age": 3}));
/// ```
#[derive(Clone)]
pub struct StoreDefinition {
    display_name: Option<String>,
    initial: Result<Value, CatError>,
    init: Vec<StoreInitFn>,
    props: Map<String, Value>,
    refs: Map<String, Value>,
    statics: Map<String, Value>,
}

impl Default for StoreDefinition {
    fn default() -> Self {
        Self {
            display_name: None,
            initial: Ok(Value::Object(Map::new())),
            init: Vec::new(),
            props: Map::new(),
            refs: Map::new(),
            statics: Map::new(),
        }
    }
}

impl StoreDefinition {
    /// Start a definition with the given display name and an empty object
    /// as initial value.
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            display_name: Some(display_name.into()),
            ..Self::default()
        }
    }

    /// Start a definition without a display name.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Set the display name.
    pub fn display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    /// Set the initial value.
    pub fn value(mut self, value: impl Into<Value>) -> Self {
        self.initial = Ok(value.into());
        self
    }

    /// Set the initial value from any serializable type.
    ///
    /// An encoding failure surfaces when the store is built.
    pub fn serialized_value<S: Serialize>(mut self, value: &S) -> Self {
        self.initial = serde_json::to_value(value).map_err(CatError::from);
        self
    }

    /// Add an init hook. Hooks run in the order they were added.
    pub fn init<F>(mut self, hook: F) -> Self
    where
        F: Fn(StoreInit<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.init.push(Arc::new(hook));
        self
    }

    /// Per-instance data copied into every store.
    pub fn props(mut self, props: Map<String, Value>) -> Self {
        self.props.extend(props);
        self
    }

    /// Shared data copied into every store.
    pub fn refs(mut self, refs: Map<String, Value>) -> Self {
        self.refs.extend(refs);
        self
    }

    /// Data attached to the definition itself.
    pub fn statics(mut self, statics: Map<String, Value>) -> Self {
        self.statics.extend(statics);
        self
    }

    /// The display name, if set and non-empty.
    pub fn name(&self) -> Option<&str> {
        self.display_name.as_deref().filter(|name| !name.is_empty())
    }

    /// The definition's statics.
    pub fn get_statics(&self) -> &Map<String, Value> {
        &self.statics
    }

    /// Build a store and run its init hooks with `cat`.
    pub fn create(&self, cat: Option<&Cat>) -> Result<Store, CatError> {
        self.create_with_args(cat, &[])
    }

    /// Build a store and run its init hooks with `cat` and `args`.
    pub fn create_with_args(
        &self,
        cat: Option<&Cat>,
        args: &[Value],
    ) -> Result<Store, CatError> {
        let display_name = self
            .name()
            .ok_or(CatError::MissingDisplayName { kind: "store" })?;
        let initial = self.initial.clone()?;

        let store = Store::new(display_name, initial, self.props.clone(), self.refs.clone());
        for hook in &self.init {
            hook(StoreInit {
                instance: &store,
                cat,
                args,
            })
            .map_err(|err| CatError::init(store.display_name(), &err))?;
        }

        debug!(store = %store.display_name(), "store created");
        Ok(store)
    }
}

impl std::fmt::Debug for StoreDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreDefinition")
            .field("display_name", &self.display_name)
            .field("initial", &self.initial)
            .field("init", &self.init.len())
            .finish_non_exhaustive()
    }
}

struct StoreInner {
    display_name: String,
    state: RwLock<Value>,
    // Held across a state change and its notification, and across a
    // subscriber's replay. Reentrant so callbacks may touch the store.
    dispatch: ReentrantMutex<()>,
    subscribers: Arc<Subject<Value>>,
    registrations: Mutex<Vec<Subscription>>,
    props: Map<String, Value>,
    refs: Map<String, Value>,
}

/// A thread-safe container for one piece of application state.
///
/// The value changes only through [`Reduction`]s, either applied directly
/// or received from streams passed to [`register`](Self::register). Every
/// change is published to the store's subscribers.
///
/// Clones share the same state. Once the last clone is dropped, every
/// registered stream is unsubscribed.
///
/// Changes and replays are serialized, so every subscriber sees values in
/// the order they were applied, whichever threads apply them. Two stores
/// whose subscribers apply to each other from different threads can
/// deadlock.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl Store {
    fn new(
        display_name: &str,
        initial: Value,
        props: Map<String, Value>,
        refs: Map<String, Value>,
    ) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                display_name: display_name.to_string(),
                state: RwLock::new(initial),
                dispatch: ReentrantMutex::new(()),
                subscribers: Arc::new(Subject::new()),
                registrations: Mutex::new(Vec::new()),
                props,
                refs,
            }),
        }
    }

    /// The store's display name.
    pub fn display_name(&self) -> &str {
        &self.inner.display_name
    }

    /// A clone of the current value.
    pub fn value(&self) -> Value {
        self.inner.state.read().clone()
    }

    /// Read the value without cloning it.
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&Value) -> R,
    {
        let state = self.inner.state.read();
        f(&state)
    }

    /// Apply a reduction, publish the new value and return it.
    pub fn apply(&self, reduction: Reduction) -> Value {
        apply(&self.inner, reduction)
    }

    pub(crate) fn replace(&self, value: Value) {
        self.apply(Reduction::Replace(value));
    }

    /// Reduce every instruction `reductions` emits into the value.
    ///
    /// The subscription lives as long as the store. Errors are logged and
    /// forwarded to the store's subscribers.
    pub fn register(&self, reductions: Observable<Reduction>) {
        let on_next = {
            let store = Arc::downgrade(&self.inner);
            move |reduction: Reduction| {
                if let Some(inner) = store.upgrade() {
                    apply(&inner, reduction);
                }
            }
        };
        let on_error = {
            let store = Arc::downgrade(&self.inner);
            move |err: CatError| {
                if let Some(inner) = store.upgrade() {
                    warn!(store = %inner.display_name, error = %err, "registered stream failed");
                    let _dispatch = inner.dispatch.lock();
                    inner.subscribers.error(err);
                }
            }
        };

        let subscription = reductions.subscribe(on_next, on_error, || {});
        if subscription.is_closed() {
            return;
        }
        let mut registrations = self.inner.registrations.lock();
        registrations.retain(|s| !s.is_closed());
        registrations.push(subscription);
    }

    /// The current value followed by every later value.
    pub fn observable(&self) -> Observable<Value> {
        let inner = Arc::clone(&self.inner);
        Observable::new(move |subscriber: Subscriber<Value>| {
            let _dispatch = inner.dispatch.lock();
            let current = inner.state.read().clone();
            inner.subscribers.add(subscriber.clone());
            subscriber.on_next(current);
        })
    }

    /// Later values only.
    pub fn changes(&self) -> Observable<Value> {
        self.inner.subscribers.observable()
    }

    /// Subscribe to the current and later values, errors and completion.
    pub fn subscribe<N, E, C>(&self, on_next: N, on_error: E, on_completed: C) -> Subscription
    where
        N: Fn(Value) + Send + Sync + 'static,
        E: Fn(CatError) + Send + Sync + 'static,
        C: Fn() + Send + Sync + 'static,
    {
        self.observable().subscribe(on_next, on_error, on_completed)
    }

    /// Subscribe to the current and later values.
    pub fn subscribe_next<N>(&self, on_next: N) -> Subscription
    where
        N: Fn(Value) + Send + Sync + 'static,
    {
        self.observable().subscribe_next(on_next)
    }

    /// Per-instance data.
    pub fn props(&self) -> &Map<String, Value> {
        &self.inner.props
    }

    /// Shared data.
    pub fn refs(&self) -> &Map<String, Value> {
        &self.inner.refs
    }
}

fn apply(inner: &StoreInner, reduction: Reduction) -> Value {
    let _dispatch = inner.dispatch.lock();
    let value = {
        let mut state = inner.state.write();
        let next = reduction.reduce(std::mem::take(&mut *state));
        *state = next.clone();
        next
    };
    debug!(store = %inner.display_name, "reduction applied");
    inner.subscribers.next(value.clone());
    value
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("display_name", &self.inner.display_name)
            .field("value", &*self.inner.state.read())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Action;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn store(value: Value) -> Store {
        StoreDefinition::new("TestStore").value(value).create(None).unwrap()
    }

    #[test]
    fn default_value_is_empty_object() {
        let store = StoreDefinition::new("Empty").create(None).unwrap();
        assert_eq!(store.value(), json!({}));
        assert_eq!(store.display_name(), "Empty");
    }

    #[test]
    fn apply_replace_and_merge() {
        let store = store(json!({"count": 0, "name": "test"}));

        store.apply(Reduction::merge(
            json!({"count": 42}).as_object().cloned().unwrap(),
        ));
        assert_eq!(store.value(), json!({"count": 42, "name": "test"}));

        store.apply(Reduction::replace(json!([1, 2])));
        assert_eq!(store.read(|v| v.as_array().map(Vec::len)), Some(2));
    }

    #[test]
    fn subscribe_replays_then_follows() {
        let store = store(json!(0));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();

        let _s = store.subscribe_next(move |v| seen_clone.lock().push(v));
        store.apply(Reduction::replace(1));
        store.apply(Reduction::replace(2));

        assert_eq!(*seen.lock(), vec![json!(0), json!(1), json!(2)]);
    }

    #[test]
    fn changes_skip_current_value() {
        let store = store(json!(0));
        let call_count = Arc::new(AtomicUsize::new(0));
        let call_count_clone = call_count.clone();

        let _s = store.changes().subscribe_next(move |_| {
            call_count_clone.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(call_count.load(Ordering::SeqCst), 0);

        store.apply(Reduction::replace(1));
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn registered_action_drives_the_value() {
        let set_name = Action::<Value>::new("setName").unwrap();
        let hook_action = set_name.clone();
        let store = StoreDefinition::new("NameStore")
            .init(move |init| {
                init.instance.register(
                    hook_action.map(|name| Reduction::replace(json!({ "name": name }))),
                );
                Ok(())
            })
            .create(None)
            .unwrap();

        set_name.invoke(json!("cheetara"));
        assert_eq!(store.value(), json!({"name": "cheetara"}));
    }

    #[test]
    fn registered_stream_error_reaches_subscribers() {
        let store = store(json!({}));
        let errors = Arc::new(Mutex::new(Vec::new()));
        let errors_clone = errors.clone();
        let _s = store.subscribe(|_| {}, move |e| errors_clone.lock().push(e), || {});

        store.register(Observable::throw(CatError::NoRuntime));
        assert_eq!(*errors.lock(), vec![CatError::NoRuntime]);
    }

    #[test]
    fn dropping_the_store_unsubscribes_registrations() {
        let action = Action::<Value>::new("poke").unwrap();
        let store = store(json!(null));
        store.register(action.map(Reduction::Replace));
        assert!(action.has_observers());

        drop(store);
        assert!(!action.has_observers());
    }

    #[test]
    fn replay_never_interleaves_with_concurrent_changes() {
        let store = store(json!(0));
        let writer = {
            let store = store.clone();
            std::thread::spawn(move || {
                for i in 1..=500 {
                    store.apply(Reduction::replace(i));
                }
            })
        };

        let out_of_order = Arc::new(AtomicUsize::new(0));
        let subscriptions: Vec<Subscription> = (0..100)
            .map(|_| {
                let last = Mutex::new(-1);
                let out_of_order = out_of_order.clone();
                store.subscribe_next(move |value| {
                    let value = value.as_i64().unwrap();
                    let mut last = last.lock();
                    if value < *last {
                        out_of_order.fetch_add(1, Ordering::SeqCst);
                    }
                    *last = value;
                })
            })
            .collect();
        writer.join().unwrap();

        assert_eq!(out_of_order.load(Ordering::SeqCst), 0);
        assert_eq!(store.value(), json!(500));
        drop(subscriptions);
    }

    #[test]
    fn init_hooks_receive_construction_args() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let store = StoreDefinition::new("Configured")
            .init(move |init| {
                seen_clone.lock().extend_from_slice(init.args);
                init.instance.apply(Reduction::replace(init.args.len()));
                Ok(())
            })
            .create_with_args(None, &[json!({"page": 2})])
            .unwrap();

        assert_eq!(*seen.lock(), vec![json!({"page": 2})]);
        assert_eq!(store.value(), json!(1));
    }

    #[test]
    fn missing_name_and_failing_init() {
        let err = StoreDefinition::anonymous().create(None).unwrap_err();
        assert_eq!(err, CatError::MissingDisplayName { kind: "store" });

        let err = StoreDefinition::new("Broken")
            .init(|_| anyhow::bail!("boom"))
            .create(None)
            .unwrap_err();
        assert!(err.to_string().contains("init of Broken failed: boom"));
    }

    #[test]
    fn serialized_value_accepts_serde_types() {
        #[derive(Serialize)]
        struct Profile {
            name: &'static str,
            lives: u8,
        }

        let store = StoreDefinition::new("Profile")
            .serialized_value(&Profile {
                name: "snarf",
                lives: 9,
            })
            .create(None)
            .unwrap();
        assert_eq!(store.value(), json!({"name": "snarf", "lives": 9}));
    }
}
