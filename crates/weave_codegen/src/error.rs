//! Error types for generation passes.

use std::path::PathBuf;

use weave_cache::CacheError;
use weave_common::RelPath;
use weave_config::ConfigError;

use crate::generator::GeneratorError;

/// Errors that abort a generation pass.
///
/// A pass that fails never commits: the cache store on disk keeps describing
/// the previous successful pass.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    /// Two producers emitted different content for the same output path.
    #[error(
        "conflicting output for {path}: '{first_generator}' and '{second_generator}' \
         produced different content\n--- {first_generator}\n{first_content}\n--- {second_generator}\n{second_content}"
    )]
    ConflictingOutput {
        /// The contested output path.
        path: RelPath,
        /// The producer that wrote the path first.
        first_generator: String,
        /// The producer whose content disagreed.
        second_generator: String,
        /// Content from the first producer.
        first_content: String,
        /// Content from the second producer.
        second_content: String,
    },

    /// A generator emitted an artifact without declaring its sources while
    /// incremental tracking is enabled.
    #[error("generator '{generator}' produced {path} without declaring its source files")]
    UntrackedArtifact {
        /// The artifact path.
        path: RelPath,
        /// The generator that produced it.
        generator: String,
    },

    /// A generator was rejected at registration.
    #[error("invalid generator '{id}': {reason}")]
    InvalidGenerator {
        /// The generator identity.
        id: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Generation kept producing new artifacts past the configured ceiling.
    #[error("generation did not reach a fixed point within {limit} rounds")]
    RoundLimitExceeded {
        /// The configured round ceiling.
        limit: u32,
    },

    /// A generator reported a failure.
    #[error("generator '{id}' failed: {source}")]
    Generator {
        /// The failing generator.
        id: String,
        /// The generator's error.
        source: GeneratorError,
    },

    /// A generated file could not be written.
    #[error("failed to write generated file {path}: {source}")]
    Io {
        /// The file path.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The generated-file cache failed.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// The project configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
}
