//! Configuration loading
//!
//! Layers built-in defaults, the fleet YAML file and `SHEPHERD_*`
//! environment overrides with figment, then validates the result.

pub mod loader;

pub use loader::{ConfigError, ConfigLoader};
