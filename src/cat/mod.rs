//! The container wiring actions and stores together.

mod cat;

pub use cat::{ArgsMapper, Cat, Registration};
