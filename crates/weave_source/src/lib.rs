//! Compilation files flowing through code generation.
//!
//! This crate provides [`SourceUnit`] (one input or generated file with a
//! stable [`SourceId`] and change-detecting fingerprint), [`FileSet`] (the
//! immutable snapshot of every file visible to generators), and
//! [`GeneratedArtifact`] (one output produced by a generator).

#![warn(missing_docs)]

pub mod artifact;
pub mod file_set;
pub mod source_id;
pub mod source_unit;

pub use artifact::GeneratedArtifact;
pub use file_set::FileSet;
pub use source_id::SourceId;
pub use source_unit::{Origin, SourceUnit};
