//! Invocable, observable actions.
//!
//! This module provides:
//! - `Action`: a named event emitter that maps its payload, notifies its
//!   subscribers and hands the mapped payload back to the caller
//! - `ActionsDefinition`: a declaration that derives a named collection of
//!   actions from its properties
//! - `Actions`: the collection built from a definition

mod action;
mod actions;

pub use action::{Action, ActionDef, MapContext, MapFn};
pub use actions::{
    is_action_name, ActionProperty, Actions, ActionsDefinition, ActionsInit, PRIVATE_MARKER,
    RESERVED_NAMES,
};
