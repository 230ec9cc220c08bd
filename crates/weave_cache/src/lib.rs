//! Incremental generated-file cache.
//!
//! This crate persists which generated artifacts came from which source
//! units, so that a later pass with partially changed inputs restores the
//! artifacts of unaffected sources without re-running generators and evicts
//! the artifacts of removed or changed ones.

#![warn(missing_docs)]

pub mod blob;
pub mod cache;
pub mod delta;
pub mod error;
pub mod store;

pub use blob::BlobStore;
pub use cache::{IncrementalCache, RestoreOutcome, RetainedArtifact};
pub use delta::SourceDelta;
pub use error::CacheError;
pub use store::{ArtifactRef, CacheEntry, CacheStore, CACHE_FILE};
