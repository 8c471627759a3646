//! Configuration for the resilience engine.
//!
//! Values are layered: builtin defaults, then an optional YAML file, then `RESILIENCE__*`
//! environment overrides, then a JSON override blob. Callers that already hold a flat
//! options map (camelCase keys such as `maxRetryAttempts`) can apply it with
//! [`ResilienceConfig::apply_options`].

pub mod defaults;
pub mod errors;
pub mod loader;
pub mod model;
pub mod options;

pub use defaults::default_config;
pub use errors::ConfigError;
pub use loader::{load_config, load_config_with_options, LoadOptions};
pub use model::*;

#[cfg(test)]
mod tests;
