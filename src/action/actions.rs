use serde_json::{Map, Value};
use std::sync::Arc;

use tracing::debug;

use super::action::{Action, ActionDef, MapContext, MapFn};
use crate::cat::Cat;
use crate::error::CatError;

/// Property names that never become actions.
///
/// These are the configuration keys of a definition; a declared property
/// with one of these names is configuration, not an action.
pub const RESERVED_NAMES: &[&str] = &[
    "methods",
    "statics",
    "props",
    "refs",
    "init",
    "compose",
    "create",
    "isStamp",
    "shouldBindMethods",
    "displayName",
    "constructor",
];

/// Names containing this character are private and never become actions.
pub const PRIVATE_MARKER: char = '_';

/// Whether a declared property called `name` becomes an action.
pub fn is_action_name(name: &str) -> bool {
    !name.is_empty() && !name.contains(PRIVATE_MARKER) && !RESERVED_NAMES.contains(&name)
}

/// A declared property of an actions definition.
#[derive(Clone)]
pub enum ActionProperty {
    /// A mapping function.
    Map(MapFn<Value>),
    /// Any other value. It becomes an identity action.
    Value(Value),
}

type ActionsInitFn = Arc<dyn Fn(ActionsInit<'_>) -> anyhow::Result<()> + Send + Sync>;

/// Arguments of an actions init hook.
pub struct ActionsInit<'a> {
    /// The collection being built.
    pub instance: &'a Actions,
    /// The container registering it, if any.
    pub cat: Option<&'a Cat>,
    /// Construction arguments passed to the registration.
    pub args: &'a [Value],
}

/// Declarative definition of an actions collection.
///
/// # Examples
///
/// ```
/// use fluxcat::ActionsDefinition;
/// use serde_json::json;
///
/// let todo_actions = ActionsDefinition::new("todoActions")
///     .action("addTodo", |text| Ok(json!({ "text": text, "done": false })))
///     .property("clearCompleted", true)
///     .property("_cache", 0);
///
/// let actions = todo_actions.create(None).unwrap();
/// assert_eq!(actions.names().collect::<Vec<_>>(), vec!["addTodo", "clearCompleted"]);
/// ```
#[derive(Clone, Default)]
pub struct ActionsDefinition {
    display_name: Option<String>,
    should_bind_methods: bool,
    properties: Vec<(String, ActionProperty)>,
    init: Vec<ActionsInitFn>,
    props: Map<String, Value>,
    refs: Map<String, Value>,
    statics: Map<String, Value>,
}

impl ActionsDefinition {
    /// Start a definition with the given display name.
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            display_name: Some(display_name.into()),
            ..Self::default()
        }
    }

    /// Start a definition without a display name.
    ///
    /// It cannot be built or registered until one is set.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Set the display name.
    pub fn display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    /// Hand the collection to every mapping through its [`MapContext`].
    pub fn should_bind_methods(mut self, should_bind: bool) -> Self {
        self.should_bind_methods = should_bind;
        self
    }

    /// Declare an action with a mapping over its payload.
    pub fn action<F>(self, name: impl Into<String>, map: F) -> Self
    where
        F: Fn(Value) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.bound_action(name, move |_, payload| map(payload))
    }

    /// Declare an action whose mapping also receives its [`MapContext`].
    pub fn bound_action<F>(self, name: impl Into<String>, map: F) -> Self
    where
        F: Fn(&MapContext, Value) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.with_property(name.into(), ActionProperty::Map(Arc::new(map)))
    }

    /// Declare a non-callable property; it becomes an identity action.
    pub fn property(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with_property(name.into(), ActionProperty::Value(value.into()))
    }

    fn with_property(mut self, name: String, property: ActionProperty) -> Self {
        match self.properties.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, slot)) => *slot = property,
            None => self.properties.push((name, property)),
        }
        self
    }

    /// Add an init hook. Hooks run in the order they were added.
    pub fn init<F>(mut self, hook: F) -> Self
    where
        F: Fn(ActionsInit<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.init.push(Arc::new(hook));
        self
    }

    /// Per-instance data copied into every collection.
    pub fn props(mut self, props: Map<String, Value>) -> Self {
        self.props.extend(props);
        self
    }

    /// Shared data copied into every collection.
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

    /// Derive the action definitions from the declared properties.
    ///
    /// Private and reserved names are skipped; non-callable properties map
    /// to the identity.
    pub fn action_defs(&self) -> Vec<ActionDef<Value>> {
        self.properties
            .iter()
            .filter(|(name, _)| is_action_name(name))
            .map(|(name, property)| ActionDef {
                name: name.clone(),
                map: match property {
                    ActionProperty::Map(map) => Some(Arc::clone(map)),
                    ActionProperty::Value(_) => None,
                },
            })
            .collect()
    }

    /// Build a collection and run its init hooks with `cat`.
    pub fn create(&self, cat: Option<&Cat>) -> Result<Actions, CatError> {
        self.create_with_args(cat, &[])
    }

    /// Build a collection and run its init hooks with `cat` and `args`.
    pub fn create_with_args(
        &self,
        cat: Option<&Cat>,
        args: &[Value],
    ) -> Result<Actions, CatError> {
        let display_name = self
            .name()
            .ok_or(CatError::MissingDisplayName { kind: "actions" })?
            .to_string();

        let defs = self.action_defs();
        let should_bind = self.should_bind_methods;
        let inner = Arc::new_cyclic(|weak| {
            let actions = defs
                .into_iter()
                .map(|def| Action::build(should_bind, def, MapContext::bound(weak.clone())))
                .collect();
            ActionsInner {
                display_name,
                actions,
                props: self.props.clone(),
                refs: self.refs.clone(),
            }
        });
        let instance = Actions { inner };

        for hook in &self.init {
            hook(ActionsInit {
                instance: &instance,
                cat,
                args,
            })
            .map_err(|err| CatError::init(instance.display_name(), &err))?;
        }

        debug!(
            actions = %instance.display_name(),
            count = instance.len(),
            "actions collection created"
        );
        Ok(instance)
    }
}

impl std::fmt::Debug for ActionsDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionsDefinition")
            .field("display_name", &self.display_name)
            .field(
                "properties",
                &self.properties.iter().map(|(n, _)| n).collect::<Vec<_>>(),
            )
            .field("init", &self.init.len())
            .finish_non_exhaustive()
    }
}

pub(crate) struct ActionsInner {
    display_name: String,
    actions: Vec<Action<Value>>,
    props: Map<String, Value>,
    refs: Map<String, Value>,
}

/// A named collection of actions.
///
/// Cheap to clone; clones share the same actions.
#[derive(Clone)]
pub struct Actions {
    inner: Arc<ActionsInner>,
}

impl Actions {
    pub(crate) fn from_inner(inner: Arc<ActionsInner>) -> Self {
        Self { inner }
    }

    /// The collection's display name.
    pub fn display_name(&self) -> &str {
        &self.inner.display_name
    }

    /// Look up an action by name.
    pub fn get(&self, name: &str) -> Option<&Action<Value>> {
        self.inner
            .actions
            .iter()
            .find(|action| action.display_name() == name)
    }

    /// Action names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.inner.actions.iter().map(|action| action.display_name())
    }

    /// Every action in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Action<Value>> {
        self.inner.actions.iter()
    }

    /// Number of actions.
    pub fn len(&self) -> usize {
        self.inner.actions.len()
    }

    /// Whether the collection has no actions.
    pub fn is_empty(&self) -> bool {
        self.inner.actions.is_empty()
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

impl std::fmt::Debug for Actions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Actions")
            .field("display_name", &self.inner.display_name)
            .field("actions", &self.names().collect::<Vec<_>>())
            .finish()
    }
}
