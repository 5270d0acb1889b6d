//! State containers driven by reductions.
//!
//! A [`Store`] holds one JSON value. It changes only through a
//! [`Reduction`], either applied directly or received from a registered
//! stream, and publishes every new value to its subscribers.

mod reduction;
mod store;

pub use reduction::Reduction;
pub use store::{Store, StoreDefinition, StoreInit};
