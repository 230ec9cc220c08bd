//! Shared foundational types used across the weave code generation toolchain.
//!
//! This crate provides content fingerprints for change detection and the
//! validated relative path type used to name generated artifacts.

#![warn(missing_docs)]

pub mod hash;
pub mod rel_path;

pub use hash::ContentHash;
pub use rel_path::{RelPath, RelPathError};
