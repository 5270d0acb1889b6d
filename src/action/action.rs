use serde_json::Value;
use std::sync::{Arc, Weak};

use tracing::debug;

use super::actions::{Actions, ActionsInner};
use crate::error::CatError;
use crate::observable::{wait_for, Observable, Subject, Subscription};

/// Mapping function of an action.
///
/// Receives the [`MapContext`] and the payload, returns the payload to
/// broadcast. An `Err` is delivered to subscribers only.
pub type MapFn<T> = Arc<dyn Fn(&MapContext, T) -> anyhow::Result<T> + Send + Sync>;

/// What a mapping function is bound to.
///
/// Actions created with `should_bind` set see their owning collection here,
/// so a mapping can reach sibling actions or the collection's props.
#[derive(Clone, Default)]
pub struct MapContext {
    actions: Option<Weak<ActionsInner>>,
}

impl MapContext {
    /// A context bound to nothing.
    pub fn unbound() -> Self {
        Self::default()
    }

    pub(crate) fn bound(actions: Weak<ActionsInner>) -> Self {
        Self {
            actions: Some(actions),
        }
    }

    /// The collection the action belongs to, if it was bound and still lives.
    pub fn actions(&self) -> Option<Actions> {
        self.actions
            .as_ref()
            .and_then(Weak::upgrade)
            .map(Actions::from_inner)
    }
}

/// Declaration of a single action: its name and optional mapping.
pub struct ActionDef<T = Value> {
    /// Display name of the action.
    pub name: String,
    /// Mapping applied to every payload; `None` is the identity.
    pub map: Option<MapFn<T>>,
}

impl<T> Clone for ActionDef<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            map: self.map.clone(),
        }
    }
}

/// An invocable, observable event emitter.
///
/// Invoking an action maps the payload, notifies every subscriber
/// synchronously in subscription order and returns the mapped payload.
/// A failing mapping never reaches the caller of [`invoke`](Self::invoke);
/// subscribers receive it as an error instead.
///
/// # Examples
///
/// ```
/// use fluxcat::Action;
/// use std::sync::{Arc, Mutex};
///
/// let double = Action::with_map("double", |n: i32| n * 2).unwrap();
/// let seen = Arc::new(Mutex::new(Vec::new()));
/// let seen_clone = seen.clone();
///
/// let _subscription = double.subscribe_next(move |n| seen_clone.lock().unwrap().push(n));
///
/// assert_eq!(double.invoke(21), 42);
/// assert_eq!(*seen.lock().unwrap(), vec![42]);
/// ```
pub struct Action<T = Value> {
    inner: Arc<ActionInner<T>>,
}

struct ActionInner<T> {
    display_name: String,
    map: Option<MapFn<T>>,
    context: MapContext,
    observers: Arc<Subject<T>>,
    start: Arc<Subject<T>>,
}

impl<T> Clone for Action<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Action<T> {
    /// Create an action that broadcasts its payload unchanged.
    ///
    /// Fails when `name` is empty.
    pub fn new(name: impl Into<String>) -> Result<Self, CatError> {
        Self::create(
            false,
            ActionDef {
                name: name.into(),
                map: None,
            },
            MapContext::unbound(),
        )
    }

    /// Create an action with an infallible mapping.
    pub fn with_map<F>(name: impl Into<String>, map: F) -> Result<Self, CatError>
    where
        F: Fn(T) -> T + Send + Sync + 'static,
    {
        Self::with_try_map(name, move |payload| Ok(map(payload)))
    }

    /// Create an action whose mapping may fail.
    pub fn with_try_map<F>(name: impl Into<String>, map: F) -> Result<Self, CatError>
    where
        F: Fn(T) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        Self::create(
            false,
            ActionDef {
                name: name.into(),
                map: Some(Arc::new(move |_: &MapContext, payload| map(payload))),
            },
            MapContext::unbound(),
        )
    }

    /// Create an action from its definition.
    ///
    /// When `should_bind` is false the mapping sees an unbound context,
    /// whatever `context` holds. An empty name is rejected with
    /// [`CatError::MissingDisplayName`].
    pub fn create(
        should_bind: bool,
        def: ActionDef<T>,
        context: MapContext,
    ) -> Result<Self, CatError> {
        if def.name.is_empty() {
            return Err(CatError::MissingDisplayName { kind: "action" });
        }
        Ok(Self::build(should_bind, def, context))
    }

    /// [`create`](Self::create) for a name that is known to be non-empty.
    pub(crate) fn build(should_bind: bool, def: ActionDef<T>, context: MapContext) -> Self {
        debug_assert!(!def.name.is_empty());
        let context = if should_bind {
            context
        } else {
            MapContext::unbound()
        };

        let action = Self {
            inner: Arc::new(ActionInner {
                display_name: def.name,
                map: def.map,
                context,
                observers: Arc::new(Subject::new()),
                start: Arc::new(Subject::new()),
            }),
        };
        debug!(action = %action.display_name(), "action created");
        action
    }

    /// The action's display name.
    pub fn display_name(&self) -> &str {
        &self.inner.display_name
    }

    /// Fire the action.
    ///
    /// Returns the mapped payload, or the original payload when the mapping
    /// failed (subscribers then receive the error).
    pub fn invoke(&self, payload: T) -> T {
        match self.dispatch(payload) {
            Ok(mapped) => mapped,
            Err((original, _)) => original,
        }
    }

    /// Fire the action and also report a failing mapping to the caller.
    ///
    /// Subscribers are notified exactly as with [`invoke`](Self::invoke).
    pub fn try_invoke(&self, payload: T) -> Result<T, CatError> {
        self.dispatch(payload).map_err(|(_, err)| err)
    }

    fn dispatch(&self, payload: T) -> Result<T, (T, CatError)> {
        let inner = &self.inner;
        let mapped = match &inner.map {
            Some(map) => map(&inner.context, payload.clone()),
            None => Ok(payload.clone()),
        };

        match mapped {
            Ok(value) => {
                inner.start.next(value.clone());
                inner.observers.next(value.clone());
                Ok(value)
            }
            Err(err) => {
                let err = CatError::action_mapping(&inner.display_name, &err);
                debug!(action = %inner.display_name, error = %err, "action mapping failed");
                inner.start.next(payload.clone());
                inner.observers.error(err.clone());
                Err((payload, err))
            }
        }
    }

    /// Whether anything listens to this action, including `wait_for` chains.
    pub fn has_observers(&self) -> bool {
        self.inner.observers.has_observers() || self.inner.start.has_observers()
    }

    /// The action as a stream of mapped payloads.
    pub fn observable(&self) -> Observable<T> {
        self.inner.observers.observable()
    }

    /// Subscribe to payloads, mapping errors and completion.
    pub fn subscribe<N, E, C>(&self, on_next: N, on_error: E, on_completed: C) -> Subscription
    where
        N: Fn(T) + Send + Sync + 'static,
        E: Fn(CatError) + Send + Sync + 'static,
        C: Fn() + Send + Sync + 'static,
    {
        self.observable().subscribe(on_next, on_error, on_completed)
    }

    /// Subscribe to payloads only.
    pub fn subscribe_next<N>(&self, on_next: N) -> Subscription
    where
        N: Fn(T) + Send + Sync + 'static,
    {
        self.observable().subscribe_next(on_next)
    }

    /// Transform the action's payloads.
    pub fn map<U, F>(&self, f: F) -> Observable<U>
    where
        U: Send + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        self.observable().map(f)
    }

    /// For every firing, emit the payload once each of `sources` has emitted
    /// since that firing.
    ///
    /// Lets a store update only after the stores it depends on have handled
    /// the same action.
    pub fn wait_for<U>(&self, sources: Vec<Observable<U>>) -> Observable<T>
    where
        U: Clone + Send + Sync + 'static,
    {
        let sources = Arc::new(sources);
        self.inner.start.observable().flat_map(move |payload: T| {
            wait_for(sources.as_ref().clone()).map(move |_| payload.clone())
        })
    }
}

impl<T> std::fmt::Debug for Action<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Action")
            .field("display_name", &self.inner.display_name)
            .finish_non_exhaustive()
    }
}
