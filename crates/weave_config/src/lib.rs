//! Parsing and validation of `weave.toml` code generation configuration.
//!
//! This crate reads the project configuration file and produces a strongly-typed
//! [`WeaveConfig`], then resolves it against the project directory into the
//! absolute [`ResolvedGeneration`] settings consumed by the generation session.

#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod resolve;
pub mod types;

pub use error::ConfigError;
pub use loader::{load_config, load_config_from_str, CONFIG_FILE};
pub use resolve::{resolve_generation, ResolvedGeneration};
pub use types::*;
