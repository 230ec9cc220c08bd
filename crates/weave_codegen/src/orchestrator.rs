//! The fixed-point generation loop.
//!
//! A pass runs in three phases:
//!
//! 1. **Rounds.** Ordinary and flushing generators are fed the files that are
//!    new to the round. Every artifact is checked against the [`OutputLedger`]
//!    and written under the output root before the next round starts. Only
//!    artifacts at paths not produced earlier in the pass are fed forward.
//!    The loop ends after a round that produces nothing new.
//! 2. **Flush.** Every flushing generator is flushed once and may replace its
//!    own earlier output.
//! 3. **Private.** Every private generator runs once over all files the pass
//!    has seen. Its output is never fed to another generator.
//!
//! Flush and private outputs summarize the whole module and are marked
//! aggregating for the cache.

use std::collections::BTreeMap;
use std::path::Path;

use weave_cache::RetainedArtifact;
use weave_common::RelPath;
use weave_source::{FileSet, GeneratedArtifact, SourceUnit};

use crate::context::{GenerationContext, ModuleView};
use crate::error::GenerationError;
use crate::ledger::OutputLedger;
use crate::registry::{GeneratorRegistry, Phase};

/// Result of running the generators over one set of inputs.
#[derive(Debug, Clone, Default)]
pub struct GenerationOutcome {
    /// Every artifact produced by the pass, ordered by path.
    pub artifacts: Vec<GeneratedArtifact>,
    /// Number of rounds run before the fixed point.
    pub rounds: u32,
    /// Inputs plus every generated file visible to non-private generators.
    pub files: FileSet,
}

/// Drives the generators of a registry through one pass.
pub struct Orchestrator<'a> {
    registry: &'a mut GeneratorRegistry,
    ctx: &'a GenerationContext,
    max_rounds: Option<u32>,
    ledger: OutputLedger,
    /// Files visible to generators without being fed to them.
    module: FileSet,
}

impl<'a> Orchestrator<'a> {
    /// Creates an orchestrator for `registry` under `ctx`.
    pub fn new(registry: &'a mut GeneratorRegistry, ctx: &'a GenerationContext) -> Self {
        Self {
            registry,
            ctx,
            max_rounds: None,
            ledger: OutputLedger::default(),
            module: FileSet::default(),
        }
    }

    /// Fails the pass with [`GenerationError::RoundLimitExceeded`] if more
    /// than `limit` rounds would be needed.
    pub fn with_max_rounds(mut self, limit: Option<u32>) -> Self {
        self.max_rounds = limit;
        self
    }

    /// Treats artifacts kept from the cache as already produced, so that a
    /// generator writing different content to one of their paths conflicts.
    pub fn with_retained(mut self, retained: &BTreeMap<RelPath, RetainedArtifact>) -> Self {
        self.ledger = OutputLedger::with_retained(retained);
        self
    }

    /// Makes `files` part of the module view from the first round on.
    ///
    /// These files are never fed to generators. A session passes the
    /// unchanged inputs and the artifacts kept from the cache, so that an
    /// incremental pass sees the same module as a clean one.
    pub fn with_module(mut self, files: FileSet) -> Self {
        self.module = files;
        self
    }

    /// Runs the pass over `inputs`.
    pub fn run(mut self, inputs: Vec<SourceUnit>) -> Result<GenerationOutcome, GenerationError> {
        let mut files = std::mem::take(&mut self.module).extended(inputs.iter().cloned());
        let rounds = self.run_rounds(&mut files, inputs)?;
        self.run_flush(&mut files)?;
        self.run_private(&files)?;

        let artifacts = self.ledger.into_artifacts();
        tracing::info!(
            rounds,
            artifacts = artifacts.len(),
            files = files.len(),
            "generation reached a fixed point"
        );
        Ok(GenerationOutcome {
            artifacts,
            rounds,
            files,
        })
    }

    fn run_rounds(
        &mut self,
        files: &mut FileSet,
        inputs: Vec<SourceUnit>,
    ) -> Result<u32, GenerationError> {
        let selected = self.registry.select(self.ctx, Phase::Rounds);
        let mut pending = inputs;
        let mut rounds = 0u32;

        while !pending.is_empty() {
            if let Some(limit) = self.max_rounds {
                if rounds >= limit {
                    return Err(GenerationError::RoundLimitExceeded { limit });
                }
            }
            rounds += 1;
            tracing::debug!(round = rounds, sources = pending.len(), "starting generation round");

            let mut produced = Vec::new();
            for &index in &selected {
                let generator = self.registry.generator_mut(index);
                let id = generator.id().to_string();
                let view = ModuleView::new(&self.ctx.module_name, files);
                let artifacts = generator
                    .generate(self.ctx, &view, &pending)
                    .map_err(|source| GenerationError::Generator {
                        id: id.clone(),
                        source,
                    })?;
                for artifact in artifacts {
                    if let Some(unit) = self.accept(&id, artifact, false)? {
                        produced.push(unit);
                    }
                }
            }

            *files = files.extended(produced.iter().cloned());
            pending = produced;
        }
        Ok(rounds)
    }

    fn run_flush(&mut self, files: &mut FileSet) -> Result<(), GenerationError> {
        let mut flushed = Vec::new();
        for index in self.registry.select(self.ctx, Phase::Flush) {
            let generator = self.registry.generator_mut(index);
            let id = generator.id().to_string();
            let view = ModuleView::new(&self.ctx.module_name, files);
            let artifacts =
                generator
                    .flush(self.ctx, &view)
                    .map_err(|source| GenerationError::Generator {
                        id: id.clone(),
                        source,
                    })?;
            tracing::debug!(generator = %id, artifacts = artifacts.len(), "flushed generator");
            for artifact in artifacts {
                if let Some(unit) = self.accept(&id, artifact.aggregating(), true)? {
                    flushed.push(unit);
                }
            }
        }
        *files = files.extended(flushed);
        Ok(())
    }

    fn run_private(&mut self, files: &FileSet) -> Result<(), GenerationError> {
        let everything = files.to_vec();
        let view = ModuleView::new(&self.ctx.module_name, files);
        for index in self.registry.select(self.ctx, Phase::Private) {
            let generator = self.registry.generator_mut(index);
            let id = generator.id().to_string();
            let artifacts = generator
                .generate(self.ctx, &view, &everything)
                .map_err(|source| GenerationError::Generator {
                    id: id.clone(),
                    source,
                })?;
            tracing::debug!(generator = %id, artifacts = artifacts.len(), "ran private generator");
            for artifact in artifacts {
                self.accept(&id, artifact.aggregating(), false)?;
            }
        }
        Ok(())
    }

    /// Checks `artifact` and writes it to disk if it is new or changed.
    ///
    /// Returns the artifact as a source unit when it must be fed forward.
    fn accept(
        &mut self,
        generator: &str,
        artifact: GeneratedArtifact,
        flushing: bool,
    ) -> Result<Option<SourceUnit>, GenerationError> {
        if self.ctx.track_source_files && !artifact.is_tracked() {
            return Err(GenerationError::UntrackedArtifact {
                path: artifact.path,
                generator: generator.to_string(),
            });
        }

        let root = &self.ctx.output_root;
        let unit = artifact.to_source_unit(root);
        let target = artifact.output_path(root);
        let bytes = artifact.content.clone();
        let admission = self.ledger.admit(generator, artifact, flushing, root)?;
        if !admission.needs_write() {
            return Ok(None);
        }
        write_output(&target, bytes.as_bytes())?;
        tracing::trace!(generator, path = %target.display(), "wrote generated file");
        Ok(Some(unit))
    }
}

fn write_output(path: &Path, bytes: &[u8]) -> Result<(), GenerationError> {
    let io = |source| GenerationError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io)?;
    }
    std::fs::write(path, bytes).map_err(io)
}
