//! Fixed-point orchestration of pluggable code generators.
//!
//! A [`GenerationSession`] drives the registered [`CodeGenerator`]s over the
//! input sources of a module. Generators run in rounds, each round seeing the
//! files the previous round produced, until a round produces nothing new.
//! Flushing generators then emit their final output once, and private
//! generators run once over everything. Outputs of unchanged sources are
//! restored from the generated-file cache instead of being regenerated.
//!
//! # Generator kinds
//!
//! - **Ordinary:** runs every round.
//! - **Flushing:** runs every round, then is flushed once after the fixed point.
//! - **Private:** runs once after the flush; its output is never fed back.

#![warn(missing_docs)]

pub mod context;
pub mod error;
pub mod generator;
mod ledger;
pub mod orchestrator;
pub mod registry;
pub mod session;

pub use context::{GenerationContext, ModuleView};
pub use error::GenerationError;
pub use generator::{Capabilities, CodeGenerator, GeneratorError, GeneratorKind, GeneratorResult};
pub use orchestrator::{GenerationOutcome, Orchestrator};
pub use registry::GeneratorRegistry;
pub use session::{GenerationSession, PassOutcome};
