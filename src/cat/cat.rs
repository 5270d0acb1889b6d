use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::hash_map::{Entry, HashMap};

use tracing::{debug, error};

use crate::action::{Actions, ActionsDefinition};
use crate::error::{json_kind, CatError};
use crate::observable::{Observable, Subscriber};
use crate::store::{Store, StoreDefinition};

/// Turns the extra registration argument into the construction arguments
/// handed to init hooks.
pub type ArgsMapper = dyn Fn(Value) -> Vec<Value>;

fn construction_args(map_args: Option<&ArgsMapper>, extra: Value) -> Vec<Value> {
    match map_args {
        Some(map_args) => map_args(extra),
        None => vec![extra],
    }
}

/// Outcome of a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// The instance was added under its display name.
    Added,
    /// The name was taken; the registry kept the earlier instance.
    AlreadyExists,
}

/// A registry of actions collections and stores.
///
/// Names are unique per registry. The container also moves the aggregate
/// store state in and out: [`dehydrate`](Self::dehydrate) and
/// [`serialize`](Self::serialize) export a JSON object keyed by store name,
/// [`hydrate`](Self::hydrate) and [`deserialize`](Self::deserialize)
/// restore one.
///
/// # Examples
///
/// ```
/// use fluxcat::{ActionsDefinition, Cat, Reduction, StoreDefinition};
/// use serde_json::json;
///
/// let cat = Cat::new();
/// cat.register_actions(&ActionsDefinition::new("CounterActions").property("reset", true))
///     .unwrap();
/// cat.register_store(&StoreDefinition::new("CounterStore").value(7).init(|init| {
///     let actions = init.cat.and_then(|cat| cat.get_actions("CounterActions"));
///     if let Some(reset) = actions.as_ref().and_then(|a| a.get("reset")) {
///         init.instance.register(reset.map(|_| Reduction::replace(0)));
///     }
///     Ok(())
/// }))
/// .unwrap();
///
/// let _s = cat
///     .serialize()
///     .subscribe_next(|state| assert_eq!(state, r#"{"CounterStore":7}"#));
/// ```
#[derive(Default)]
pub struct Cat {
    actions: RwLock<HashMap<String, Actions>>,
    stores: RwLock<HashMap<String, Store>>,
}

impl Cat {
    /// Create an empty container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an actions collection from `definition` and register it.
    ///
    /// The collection's init hooks receive this container.
    pub fn register_actions(
        &self,
        definition: &ActionsDefinition,
    ) -> Result<Registration, CatError> {
        let actions = definition.create(Some(self))?;
        Ok(self.register_actions_instance(actions))
    }

    /// [`register_actions`](Self::register_actions) with construction
    /// arguments.
    ///
    /// The init hooks receive `map_args(extra)`, or just `extra` without a
    /// mapper.
    pub fn register_actions_with(
        &self,
        definition: &ActionsDefinition,
        map_args: Option<&ArgsMapper>,
        extra: Value,
    ) -> Result<Registration, CatError> {
        let args = construction_args(map_args, extra);
        let actions = definition.create_with_args(Some(self), &args)?;
        Ok(self.register_actions_instance(actions))
    }

    /// Register an already built actions collection.
    pub fn register_actions_instance(&self, actions: Actions) -> Registration {
        let name = actions.display_name().to_string();
        let registration = match self.actions.write().entry(name.clone()) {
            Entry::Occupied(_) => Registration::AlreadyExists,
            Entry::Vacant(slot) => {
                slot.insert(actions);
                Registration::Added
            }
        };

        match registration {
            Registration::Added => debug!(actions = %name, "actions registered"),
            Registration::AlreadyExists => {
                error!(actions = %name, "actions named {name} already exists")
            }
        }
        registration
    }

    /// Build a store from `definition` and register it.
    ///
    /// The store's init hooks receive this container, so they can look up
    /// the actions registered before it.
    pub fn register_store(&self, definition: &StoreDefinition) -> Result<Registration, CatError> {
        let store = definition.create(Some(self))?;
        Ok(self.register_store_instance(store))
    }

    /// [`register_store`](Self::register_store) with construction arguments,
    /// built like those of [`register_actions_with`](Self::register_actions_with).
    pub fn register_store_with(
        &self,
        definition: &StoreDefinition,
        map_args: Option<&ArgsMapper>,
        extra: Value,
    ) -> Result<Registration, CatError> {
        let args = construction_args(map_args, extra);
        let store = definition.create_with_args(Some(self), &args)?;
        Ok(self.register_store_instance(store))
    }

    /// Register an already built store.
    pub fn register_store_instance(&self, store: Store) -> Registration {
        let name = store.display_name().to_string();
        let registration = match self.stores.write().entry(name.clone()) {
            Entry::Occupied(_) => Registration::AlreadyExists,
            Entry::Vacant(slot) => {
                slot.insert(store);
                Registration::Added
            }
        };

        match registration {
            Registration::Added => debug!(store = %name, "store registered"),
            Registration::AlreadyExists => error!(store = %name, "store named {name} already exists"),
        }
        registration
    }

    /// Look up an actions collection by display name.
    pub fn get_actions(&self, name: &str) -> Option<Actions> {
        self.actions.read().get(name).cloned()
    }

    /// Look up a store by display name.
    pub fn get_store(&self, name: &str) -> Option<Store> {
        self.stores.read().get(name).cloned()
    }

    /// Number of registered actions collections.
    pub fn actions_len(&self) -> usize {
        self.actions.read().len()
    }

    /// Number of registered stores.
    pub fn stores_len(&self) -> usize {
        self.stores.read().len()
    }

    /// Names of the registered actions collections, sorted.
    pub fn action_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.actions.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Names of the registered stores, sorted.
    pub fn store_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.stores.read().keys().cloned().collect();
        names.sort();
        names
    }

    fn snapshot_stores(&self) -> Vec<Store> {
        self.stores.read().values().cloned().collect()
    }

    /// Replace the value of every store named in `state`.
    ///
    /// Runs on subscription against the stores registered when this was
    /// called, then completes. `null` hydrates nothing; any other non-object
    /// fails with [`CatError::HydrateInput`].
    pub fn hydrate(&self, state: Value) -> Observable<()> {
        let stores = self.snapshot_stores();
        Observable::new(move |subscriber: Subscriber<()>| {
            let entries = match &state {
                Value::Object(entries) => entries,
                Value::Null => {
                    subscriber.on_completed();
                    return;
                }
                other => {
                    subscriber.on_error(CatError::HydrateInput {
                        found: json_kind(other),
                    });
                    return;
                }
            };

            for store in &stores {
                if let Some(value) = entries.get(store.display_name()) {
                    store.replace(value.clone());
                }
            }
            debug!(stores = entries.len(), "state hydrated");
            subscriber.on_completed();
        })
    }

    /// The current value of every store, keyed by display name.
    ///
    /// A store holding `null` is exported as an empty object.
    /// Emits one snapshot per subscription, then completes.
    pub fn dehydrate(&self) -> Observable<Map<String, Value>> {
        let stores = self.snapshot_stores();
        Observable::new(move |subscriber: Subscriber<Map<String, Value>>| {
            let state = stores
                .iter()
                .map(|store| {
                    let value = match store.value() {
                        Value::Null => Value::Object(Map::new()),
                        value => value,
                    };
                    (store.display_name().to_string(), value)
                })
                .collect();
            subscriber.on_next(state);
            subscriber.on_completed();
        })
    }

    /// [`dehydrate`](Self::dehydrate) encoded as a JSON string.
    pub fn serialize(&self) -> Observable<String> {
        self.dehydrate()
            .flat_map(|state| match serde_json::to_string(&state) {
                Ok(encoded) => Observable::of(encoded),
                Err(err) => Observable::throw(err.into()),
            })
    }

    /// Parse `serialized` and [`hydrate`](Self::hydrate) the stores with it.
    ///
    /// The parsed state must be an object or `null`.
    pub fn deserialize(&self, serialized: &str) -> Observable<()> {
        match serde_json::from_str::<Value>(serialized) {
            Ok(state @ (Value::Object(_) | Value::Null)) => self.hydrate(state),
            Ok(other) => Observable::throw(CatError::NotObjectOrNull {
                found: json_kind(&other),
            }),
            Err(err) => Observable::throw(err.into()),
        }
    }

    /// [`deserialize`](Self::deserialize) for untyped input, which must be a
    /// JSON string.
    pub fn deserialize_value(&self, serialized: Value) -> Observable<()> {
        match serialized {
            Value::String(serialized) => self.deserialize(&serialized),
            other => Observable::throw(CatError::DeserializeInput {
                found: json_kind(&other),
            }),
        }
    }
}

impl std::fmt::Debug for Cat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cat")
            .field("actions", &self.action_names())
            .field("stores", &self.store_names())
            .finish()
    }
}
