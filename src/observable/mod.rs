//! Observable streams.
//!
//! This module provides the stream primitives actions and stores are built on:
//! - `Observable`: cold streams with a small set of operators
//! - `Subject`: hot multicast subscriber lists
//! - `Subscription`: RAII disposal guards
//! - `wait_for`: join several streams on their first values

mod observable;
mod operators;
mod subject;
mod subscriber;
mod subscription;
mod wait_for;

pub use observable::Observable;
pub use subject::Subject;
pub use subscriber::Subscriber;
pub use subscription::Subscription;
pub use wait_for::wait_for;
