//! Configuration registry for both daemons.
//!
//! A single [`Params`] struct carries every recognized tunable. Values come
//! from an optional TOML file; missing keys fall back to built-in defaults,
//! unknown keys are rejected so a typo cannot silently disable a feature.

mod defaults;
mod types;

pub use types::{ConfigError, Params};
