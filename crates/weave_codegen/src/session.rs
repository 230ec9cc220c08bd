//! Generation sessions: one host-driven pass after another over a project.

use std::collections::BTreeMap;
use std::path::Path;

use weave_cache::{IncrementalCache, RetainedArtifact};
use weave_common::RelPath;
use weave_config::{load_config, resolve_generation, ResolvedGeneration};
use weave_source::{FileSet, GeneratedArtifact, SourceId, SourceUnit};

use crate::context::GenerationContext;
use crate::error::GenerationError;
use crate::orchestrator::{GenerationOutcome, Orchestrator};
use crate::registry::GeneratorRegistry;

/// Summary of one generation pass.
#[derive(Debug, Clone, Default)]
pub struct PassOutcome {
    /// Artifacts produced by generators in this pass, ordered by path.
    pub generated: Vec<GeneratedArtifact>,
    /// Paths kept from the cache without running generators.
    pub retained: Vec<RelPath>,
    /// Retained paths that were rewritten from cached bytes.
    pub restored: Vec<RelPath>,
    /// Paths deleted during restore.
    pub evicted: Vec<RelPath>,
    /// Sources fed to generators.
    pub residual: Vec<SourceId>,
    /// Rounds run before the fixed point.
    pub rounds: u32,
}

/// A generation session over one output root and cache directory.
///
/// The session owns the generators and the cache. Each call to
/// [`run_pass`](GenerationSession::run_pass) restores what it can from the
/// cache, runs the generators over the rest, and commits the result.
pub struct GenerationSession {
    settings: ResolvedGeneration,
    context: GenerationContext,
    registry: GeneratorRegistry,
    cache: IncrementalCache,
}

impl GenerationSession {
    /// Opens a session with already resolved settings.
    ///
    /// Generators listed in `settings.disabled` are disabled in `registry`.
    pub fn open(
        settings: ResolvedGeneration,
        mut registry: GeneratorRegistry,
    ) -> Result<Self, GenerationError> {
        for id in &settings.disabled {
            registry.disable(id.clone());
        }
        let cache = IncrementalCache::open(
            &settings.output_dir,
            &settings.cache_dir,
            settings.track_source_files,
            settings.strict_cache,
        )?;
        tracing::debug!(
            output_dir = %settings.output_dir.display(),
            cache_dir = %settings.cache_dir.display(),
            generators = registry.len(),
            tracking = settings.track_source_files,
            "opened generation session"
        );
        Ok(Self {
            context: GenerationContext::from_settings(&settings),
            settings,
            registry,
            cache,
        })
    }

    /// Loads `weave.toml` from `project_dir` and opens a session.
    pub fn load(project_dir: &Path, registry: GeneratorRegistry) -> Result<Self, GenerationError> {
        let config = load_config(project_dir)?;
        Self::open(resolve_generation(&config.generation, project_dir), registry)
    }

    /// Returns the resolved settings.
    pub fn settings(&self) -> &ResolvedGeneration {
        &self.settings
    }

    /// Returns the context handed to generators.
    pub fn context(&self) -> &GenerationContext {
        &self.context
    }

    /// Returns the registered generators.
    pub fn registry(&self) -> &GeneratorRegistry {
        &self.registry
    }

    /// Returns the generated-file cache.
    pub fn cache(&self) -> &IncrementalCache {
        &self.cache
    }

    /// Runs one pass over the complete current set of input sources.
    ///
    /// Generators, flushing and private ones included, are not run at all
    /// when every source is restored from the cache.
    ///
    /// On error nothing is committed; the next pass starts from the cache
    /// state of the last successful pass.
    pub fn run_pass(&mut self, sources: Vec<SourceUnit>) -> Result<PassOutcome, GenerationError> {
        let restore = self.cache.restore(&sources)?;
        let residual: Vec<SourceId> = restore.residual.iter().map(|u| u.id.clone()).collect();

        let outcome = if restore.residual.is_empty() {
            tracing::debug!("no sources need generation, skipping generators");
            GenerationOutcome::default()
        } else {
            let module = self.module_files(&sources, &restore.retained)?;
            Orchestrator::new(&mut self.registry, &self.context)
                .with_max_rounds(self.settings.max_rounds)
                .with_retained(&restore.retained)
                .with_module(module)
                .run(restore.residual.clone())?
        };

        self.cache.commit(&restore.residual, &outcome.artifacts)?;

        let retained: Vec<RelPath> = restore
            .retained
            .keys()
            .filter(|path| {
                outcome
                    .artifacts
                    .binary_search_by(|a| a.path.cmp(path))
                    .is_err()
            })
            .cloned()
            .collect();
        tracing::info!(
            sources = sources.len(),
            residual = residual.len(),
            generated = outcome.artifacts.len(),
            retained = retained.len(),
            rounds = outcome.rounds,
            "generation pass complete"
        );
        Ok(PassOutcome {
            generated: outcome.artifacts,
            retained,
            restored: restore.restored,
            evicted: restore.evicted.into_iter().collect(),
            residual,
            rounds: outcome.rounds,
        })
    }

    /// Collects every input plus the artifacts kept on disk from the cache.
    fn module_files(
        &self,
        sources: &[SourceUnit],
        retained: &BTreeMap<RelPath, RetainedArtifact>,
    ) -> Result<FileSet, GenerationError> {
        let mut files = sources.to_vec();
        for path in retained.keys() {
            let target = path.to_path(&self.settings.output_dir);
            let text = std::fs::read_to_string(&target).map_err(|source| GenerationError::Io {
                path: target.clone(),
                source,
            })?;
            files.push(SourceUnit::generated(target, text));
        }
        Ok(files.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ModuleView;
    use crate::generator::{CodeGenerator, GeneratorResult};
    use std::collections::BTreeSet;
    use std::sync::{Arc, Mutex};

    /// Emits `<stem>_Factory.kt` per input and records the inputs it saw.
    struct Factories {
        seen: Arc<Mutex<Vec<String>>>,
    }

    impl CodeGenerator for Factories {
        fn id(&self) -> &str {
            "factories"
        }
        fn generate(
            &mut self,
            _ctx: &GenerationContext,
            _module: &ModuleView<'_>,
            sources: &[SourceUnit],
        ) -> GeneratorResult {
            let mut out = Vec::new();
            for unit in sources.iter().filter(|u| !u.is_generated()) {
                self.seen.lock().unwrap().push(unit.id.to_string());
                let stem = unit.path.file_stem().and_then(|s| s.to_str()).unwrap_or("");
                let path = RelPath::new(&format!("{stem}_Factory.kt"))?;
                out.push(
                    GeneratedArtifact::new(path, format!("// {}", unit.text))
                        .sourced_from([unit.id.clone()]),
                );
            }
            Ok(out)
        }
    }

    fn settings(root: &Path) -> ResolvedGeneration {
        ResolvedGeneration {
            output_dir: root.join("generated"),
            cache_dir: root.join("cache"),
            track_source_files: true,
            strict_cache: false,
            module_name: "main".into(),
            max_rounds: None,
            disabled: BTreeSet::new(),
        }
    }

    fn session(root: &Path, seen: &Arc<Mutex<Vec<String>>>) -> GenerationSession {
        let mut registry = GeneratorRegistry::new();
        registry
            .register(Box::new(Factories {
                seen: Arc::clone(seen),
            }))
            .unwrap();
        GenerationSession::open(settings(root), registry).unwrap()
    }

    #[test]
    fn second_pass_restores_unchanged_sources() {
        let dir = tempfile::tempdir().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sources = vec![
            SourceUnit::new("/src/A.kt", "class A"),
            SourceUnit::new("/src/B.kt", "class B"),
        ];

        let first = session(dir.path(), &seen).run_pass(sources.clone()).unwrap();
        assert_eq!(first.generated.len(), 2);
        assert_eq!(first.residual.len(), 2);

        seen.lock().unwrap().clear();
        let mut changed = sources;
        changed[1] = SourceUnit::new("/src/B.kt", "class B { }");
        let second = session(dir.path(), &seen).run_pass(changed).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["/src/B.kt"]);
        assert_eq!(second.residual, vec![SourceId::from("/src/B.kt")]);
        assert_eq!(second.retained, vec![RelPath::new("A_Factory.kt").unwrap()]);
        let b = std::fs::read_to_string(dir.path().join("generated/B_Factory.kt")).unwrap();
        assert_eq!(b, "// class B { }");
    }

    #[test]
    fn disabled_generators_do_not_run() {
        let dir = tempfile::tempdir().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut registry = GeneratorRegistry::new();
        registry
            .register(Box::new(Factories {
                seen: Arc::clone(&seen),
            }))
            .unwrap();
        let mut settings = settings(dir.path());
        settings.disabled.insert("factories".into());

        let mut session = GenerationSession::open(settings, registry).unwrap();
        let outcome = session
            .run_pass(vec![SourceUnit::new("/src/A.kt", "class A")])
            .unwrap();
        assert!(outcome.generated.is_empty());
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn load_reads_project_config() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("weave.toml"),
            "[generation]\noutput_dir = \"out\"\nmodule_name = \"app\"\n",
        )
        .unwrap();
        let session = GenerationSession::load(dir.path(), GeneratorRegistry::new()).unwrap();
        assert_eq!(session.settings().output_dir, dir.path().join("out"));
        assert_eq!(session.context().module_name, "app");
    }

    #[test]
    fn load_without_config_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = GenerationSession::load(dir.path(), GeneratorRegistry::new());
        assert!(matches!(result, Err(GenerationError::Config(_))));
    }
}
