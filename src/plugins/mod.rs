//! Built-in plugins.

pub mod health;
