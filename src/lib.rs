//! # Fluxcat
//!
//! Unidirectional data flow for Rust, in the Flux style.
//!
//! Fluxcat is built from three parts:
//!
//! ## Actions
//!
//! Named event emitters that are invocable and observable at once:
//! - `Action<T>` - maps a payload, notifies its subscribers and returns the result
//! - `ActionsDefinition` / `Actions` - a named collection derived from a declaration
//!
//! ## Stores
//!
//! State containers that react to actions:
//! - `Store` - holds a JSON value and publishes every change
//! - `Reduction` - replace or shallow-merge instructions a store applies
//!
//! ## Cat
//!
//! The container that registers actions and stores by name and moves the
//! aggregate store state in and out (`hydrate`, `dehydrate`, `serialize`,
//! `deserialize`).
//!
//! Everything is wired with the small `Observable` type in [`observable`].

pub mod action;
pub mod cat;
pub mod error;
pub mod observable;
pub mod store;

// Re-export main types for convenience
pub use action::{
    Action, ActionDef, ActionProperty, Actions, ActionsDefinition, ActionsInit, MapContext, MapFn,
};
pub use cat::{ArgsMapper, Cat, Registration};
pub use error::CatError;
pub use observable::{wait_for, Observable, Subject, Subscriber, Subscription};
pub use store::{Reduction, Store, StoreDefinition, StoreInit};
