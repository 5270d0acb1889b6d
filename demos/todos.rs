//! Todo list wired through a Cat container

use std::time::Duration;

use anyhow::Context;
use fluxcat::{ActionsDefinition, Cat, Reduction, StoreDefinition};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Todo {
    id: u64,
    text: String,
    completed: bool,
}

fn todos_of(state: &Value) -> Vec<Todo> {
    state
        .get("todos")
        .cloned()
        .and_then(|todos| serde_json::from_value(todos).ok())
        .unwrap_or_default()
}

fn todo_actions() -> ActionsDefinition {
    ActionsDefinition::new("TodoActions")
        .action("addTodo", |text| {
            let text = text.as_str().context("addTodo takes a string")?.trim().to_string();
            anyhow::ensure!(!text.is_empty(), "todo text is empty");
            Ok(json!({ "text": text }))
        })
        .property("toggleTodo", true)
        .property("clearCompleted", true)
        .property("save", true)
}

fn todo_store() -> StoreDefinition {
    StoreDefinition::new("TodoStore")
        .value(json!({ "todos": [], "nextId": 1, "savedAt": null }))
        .init(|init| {
            let cat = init.cat.context("TodoStore needs a container")?;
            let actions = cat
                .get_actions("TodoActions")
                .context("TodoActions must be registered first")?;
            let store = init.instance.clone();
            let action = |name: &str| {
                actions
                    .get(name)
                    .cloned()
                    .with_context(|| format!("TodoActions has no {name}"))
            };

            let reader = store.clone();
            init.instance.register(action("addTodo")?.map(move |payload| {
                let state = reader.value();
                let id = state.get("nextId").and_then(Value::as_u64).unwrap_or(1);
                let mut todos = todos_of(&state);
                todos.push(Todo {
                    id,
                    text: payload["text"].as_str().unwrap_or_default().to_string(),
                    completed: false,
                });
                merge(json!({ "todos": todos, "nextId": id + 1 }))
            }));

            let reader = store.clone();
            init.instance.register(action("toggleTodo")?.map(move |id| {
                let mut todos = todos_of(&reader.value());
                for todo in todos.iter_mut().filter(|t| Some(t.id) == id.as_u64()) {
                    todo.completed = !todo.completed;
                }
                merge(json!({ "todos": todos }))
            }));

            let reader = store;
            init.instance.register(action("clearCompleted")?.map(move |_| {
                let todos: Vec<Todo> = todos_of(&reader.value())
                    .into_iter()
                    .filter(|t| !t.completed)
                    .collect();
                merge(json!({ "todos": todos }))
            }));

            // Saving waits a moment, like a round trip to a backend would.
            init.instance.register(
                action("save")?
                    .observable()
                    .delay(Duration::from_millis(200))
                    .map(|stamp| merge(json!({ "savedAt": stamp }))),
            );
            Ok(())
        })
}

fn merge(partial: Value) -> Reduction {
    match partial {
        Value::Object(partial) => Reduction::merge(partial),
        other => Reduction::replace(other),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    println!("=== Todos ===\n");

    let cat = Cat::new();
    cat.register_actions(&todo_actions())?;
    cat.register_store(&todo_store())?;

    let store = cat.get_store("TodoStore").context("TodoStore is registered")?;
    let actions = cat.get_actions("TodoActions").context("TodoActions is registered")?;

    let _watch = store.changes().subscribe_next(|state| {
        let todos = todos_of(&state);
        let active = todos.iter().filter(|t| !t.completed).count();
        println!("Todos updated: {} total, {} active", todos.len(), active);
    });

    let invoke = |name: &str, payload: Value| -> anyhow::Result<Value> {
        let action = actions
            .get(name)
            .with_context(|| format!("unknown action {name}"))?;
        Ok(action.try_invoke(payload)?)
    };

    invoke("addTodo", json!("Feed Snarf"))?;
    invoke("addTodo", json!("Polish the Sword of Omens"))?;
    invoke("toggleTodo", json!(1))?;
    invoke("clearCompleted", Value::Null)?;

    invoke("save", json!("2026-10-18T12:00:00Z"))?;
    let saved = store.changes().first().to_future().await?;
    println!("\nSaved: {}", saved.unwrap_or_default()["savedAt"]);

    let snapshot = cat
        .serialize()
        .to_future()
        .await?
        .context("serialize emits a snapshot")?;
    println!("\nSerialized: {snapshot}");

    let restored = Cat::new();
    restored.register_actions(&todo_actions())?;
    restored.register_store(&todo_store())?;
    restored.deserialize(&snapshot).to_future().await?;

    let restored_todos = restored
        .get_store("TodoStore")
        .map(|store| todos_of(&store.value()))
        .unwrap_or_default();
    println!("\nRestored: {restored_todos:#?}");

    Ok(())
}
