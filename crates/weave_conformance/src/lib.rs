//! Conformance test helpers for weave generation passes.
//!
//! Provides a temporary project [`Workspace`] and a small family of
//! generators modelled on annotation processors: factories for annotated
//! classes, members injectors chained off those factories, an aggregating
//! index, and a private manifest. Integration tests in `tests/` drive them
//! through full generation sessions.

#![warn(missing_docs)]

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tempfile::TempDir;
use weave_cache::CACHE_FILE;
use weave_codegen::{
    Capabilities, CodeGenerator, GenerationContext, GenerationError, GenerationSession,
    GeneratorRegistry, GeneratorResult, ModuleView,
};
use weave_common::RelPath;
use weave_config::{resolve_generation, GenerationConfig, ResolvedGeneration};
use weave_source::{GeneratedArtifact, SourceId, SourceUnit};

/// Annotation that makes [`FactoryGenerator`] and [`IndexGenerator`] pick up
/// a source file.
pub const MARKER: &str = "@Inject";

/// Shared, ordered record of generator calls.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one entry.
    pub fn record(&self, entry: impl Into<String>) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry.into());
    }

    /// Returns a copy of all entries.
    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Returns the entries starting with `prefix`.
    pub fn entries_for(&self, prefix: &str) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter(|e| e.starts_with(prefix))
            .collect()
    }

    /// Removes all entries.
    pub fn clear(&self) {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }

    /// Returns `true` if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).is_empty()
    }
}

/// Returns the file name of `unit`.
pub fn file_name(unit: &SourceUnit) -> String {
    unit.path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn stem(unit: &SourceUnit) -> String {
    unit.path
        .file_stem()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn rel(path: &str) -> Result<RelPath, weave_codegen::GeneratorError> {
    Ok(RelPath::new(path)?)
}

// ---------------------------------------------------------------------------
// Generators
// ---------------------------------------------------------------------------

/// Emits `<Stem>_Factory.kt` for every input containing [`MARKER`].
///
/// Records `factories:<file name>` for every unit it receives.
pub struct FactoryGenerator {
    log: CallLog,
}

impl FactoryGenerator {
    /// Creates the generator writing to `log`.
    pub fn new(log: &CallLog) -> Self {
        Self { log: log.clone() }
    }
}

impl CodeGenerator for FactoryGenerator {
    fn id(&self) -> &str {
        "factories"
    }

    fn generate(
        &mut self,
        ctx: &GenerationContext,
        _module: &ModuleView<'_>,
        sources: &[SourceUnit],
    ) -> GeneratorResult {
        let mut out = Vec::new();
        for unit in sources {
            self.log.record(format!("factories:{}", file_name(unit)));
            if unit.is_generated() || !unit.text.contains(MARKER) {
                continue;
            }
            let name = stem(unit);
            let content = format!(
                "// module {}\nclass {name}_Factory // {}\n",
                ctx.module_name, unit.fingerprint
            );
            out.push(
                GeneratedArtifact::new(rel(&format!("{name}_Factory.kt"))?, content)
                    .sourced_from([unit.id.clone()]),
            );
        }
        Ok(out)
    }
}

/// Emits `<Stem>_MembersInjector.kt` for every generated `<Stem>_Factory.kt`.
///
/// Artifacts name the factory file as their source.
pub struct MembersInjectorGenerator {
    log: CallLog,
}

impl MembersInjectorGenerator {
    /// Creates the generator writing to `log`.
    pub fn new(log: &CallLog) -> Self {
        Self { log: log.clone() }
    }
}

impl CodeGenerator for MembersInjectorGenerator {
    fn id(&self) -> &str {
        "injectors"
    }

    fn generate(
        &mut self,
        _ctx: &GenerationContext,
        _module: &ModuleView<'_>,
        sources: &[SourceUnit],
    ) -> GeneratorResult {
        let mut out = Vec::new();
        for unit in sources {
            self.log.record(format!("injectors:{}", file_name(unit)));
            let name = stem(unit);
            let Some(class) = name.strip_suffix("_Factory") else {
                continue;
            };
            if !unit.is_generated() {
                continue;
            }
            out.push(
                GeneratedArtifact::new(
                    rel(&format!("{class}_MembersInjector.kt"))?,
                    format!("class {class}_MembersInjector\n"),
                )
                .sourced_from([unit.id.clone()]),
            );
        }
        Ok(out)
    }
}

/// Flushing generator listing every annotated input in `Index.kt`.
///
/// With `early` set it also writes a placeholder index in the first round
/// that the flush then replaces.
pub struct IndexGenerator {
    early: bool,
    seen: BTreeSet<SourceId>,
    names: BTreeSet<String>,
    log: CallLog,
}

impl IndexGenerator {
    /// Creates the generator writing to `log`.
    pub fn new(log: &CallLog) -> Self {
        Self {
            early: false,
            seen: BTreeSet::new(),
            names: BTreeSet::new(),
            log: log.clone(),
        }
    }

    /// Also emits a placeholder index during the first round.
    pub fn early(mut self) -> Self {
        self.early = true;
        self
    }
}

impl CodeGenerator for IndexGenerator {
    fn id(&self) -> &str {
        "index"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::FLUSHING
    }

    fn generate(
        &mut self,
        _ctx: &GenerationContext,
        _module: &ModuleView<'_>,
        sources: &[SourceUnit],
    ) -> GeneratorResult {
        let first_call = self.seen.is_empty();
        for unit in sources.iter().filter(|u| !u.is_generated()) {
            if unit.text.contains(MARKER) {
                self.seen.insert(unit.id.clone());
                self.names.insert(stem(unit));
            }
        }
        if self.early && first_call && !self.seen.is_empty() {
            return Ok(vec![GeneratedArtifact::new(rel("Index.kt")?, "// pending\n")
                .sourced_from(self.seen.iter().cloned())]);
        }
        Ok(Vec::new())
    }

    fn flush(&mut self, _ctx: &GenerationContext, _module: &ModuleView<'_>) -> GeneratorResult {
        let seen = std::mem::take(&mut self.seen);
        let names = std::mem::take(&mut self.names);
        self.log.record(format!("index:flush:{}", names.len()));
        if seen.is_empty() {
            return Ok(Vec::new());
        }
        let mut content = String::from("object Index {\n");
        for name in &names {
            content.push_str(&format!("    val {name} = {name}_Factory\n"));
        }
        content.push_str("}\n");
        Ok(vec![
            GeneratedArtifact::new(rel("Index.kt")?, content).sourced_from(seen)
        ])
    }
}

/// Private generator writing the names of every file it sees to
/// `manifest.txt`.
pub struct ManifestGenerator {
    log: CallLog,
}

impl ManifestGenerator {
    /// Creates the generator writing to `log`.
    pub fn new(log: &CallLog) -> Self {
        Self { log: log.clone() }
    }
}

impl CodeGenerator for ManifestGenerator {
    fn id(&self) -> &str {
        "manifest"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::PRIVATE
    }

    fn generate(
        &mut self,
        _ctx: &GenerationContext,
        _module: &ModuleView<'_>,
        sources: &[SourceUnit],
    ) -> GeneratorResult {
        self.log.record(format!("manifest:{}", sources.len()));
        let names: BTreeSet<String> = sources.iter().map(file_name).collect();
        let mut content = String::new();
        for name in &names {
            content.push_str(name);
            content.push('\n');
        }
        let inputs = sources
            .iter()
            .filter(|u| !u.is_generated())
            .map(|u| u.id.clone());
        Ok(vec![
            GeneratedArtifact::new(rel("manifest.txt")?, content).sourced_from(inputs)
        ])
    }
}

/// Emits the same artifact whenever it receives input sources.
pub struct FixedGenerator {
    id: String,
    path: String,
    content: String,
    tracked: bool,
    declared: Option<Vec<SourceId>>,
    capabilities: Capabilities,
}

impl FixedGenerator {
    /// Creates a tracked ordinary generator writing `content` to `path`.
    pub fn new(id: &str, path: &str, content: &str) -> Self {
        Self {
            id: id.to_string(),
            path: path.to_string(),
            content: content.to_string(),
            tracked: true,
            declared: None,
            capabilities: Capabilities::ORDINARY,
        }
    }

    /// Declares `sources` as the artifact's sources instead of the inputs
    /// the generator was fed.
    pub fn sourced_from<'a>(mut self, sources: impl IntoIterator<Item = &'a str>) -> Self {
        self.declared = Some(sources.into_iter().map(SourceId::from).collect());
        self
    }

    /// Emits the artifact without declaring its sources.
    pub fn untracked(mut self) -> Self {
        self.tracked = false;
        self
    }

    /// Overrides the declared capabilities.
    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }
}

impl CodeGenerator for FixedGenerator {
    fn id(&self) -> &str {
        &self.id
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn generate(
        &mut self,
        _ctx: &GenerationContext,
        _module: &ModuleView<'_>,
        sources: &[SourceUnit],
    ) -> GeneratorResult {
        let inputs: Vec<SourceId> = sources
            .iter()
            .filter(|u| !u.is_generated())
            .map(|u| u.id.clone())
            .collect();
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        let artifact = GeneratedArtifact::new(rel(&self.path)?, self.content.as_str());
        Ok(vec![match (&self.declared, self.tracked) {
            (_, false) => artifact,
            (Some(declared), true) => artifact.sourced_from(declared.iter().cloned()),
            (None, true) => artifact.sourced_from(inputs),
        }])
    }
}

/// Emits a new file on every call and never reaches a fixed point.
#[derive(Default)]
pub struct RunawayGenerator {
    calls: u32,
}

impl CodeGenerator for RunawayGenerator {
    fn id(&self) -> &str {
        "runaway"
    }

    fn generate(
        &mut self,
        _ctx: &GenerationContext,
        _module: &ModuleView<'_>,
        sources: &[SourceUnit],
    ) -> GeneratorResult {
        self.calls += 1;
        let owners = sources.iter().map(|u| u.id.clone()).collect::<Vec<_>>();
        Ok(vec![GeneratedArtifact::new(
            rel(&format!("runaway/R{}.kt", self.calls))?,
            "class R",
        )
        .sourced_from(owners)])
    }
}

/// Records what it is shown without producing anything.
///
/// Logs `<id>:generate:<received>:<visible>` and `<id>:flush:<visible>`.
pub struct ObserverGenerator {
    id: String,
    capabilities: Capabilities,
    log: CallLog,
}

impl ObserverGenerator {
    /// Creates an observer with the given identity and capabilities.
    pub fn new(id: &str, capabilities: Capabilities, log: &CallLog) -> Self {
        Self {
            id: id.to_string(),
            capabilities,
            log: log.clone(),
        }
    }
}

impl CodeGenerator for ObserverGenerator {
    fn id(&self) -> &str {
        &self.id
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn generate(
        &mut self,
        _ctx: &GenerationContext,
        module: &ModuleView<'_>,
        sources: &[SourceUnit],
    ) -> GeneratorResult {
        self.log.record(format!(
            "{}:generate:{}:{}",
            self.id,
            sources.len(),
            module.files().len()
        ));
        Ok(Vec::new())
    }

    fn flush(&mut self, _ctx: &GenerationContext, module: &ModuleView<'_>) -> GeneratorResult {
        self.log
            .record(format!("{}:flush:{}", self.id, module.files().len()));
        Ok(Vec::new())
    }
}

/// Builds a registry holding `generators`, panicking on rejection.
pub fn registry(generators: Vec<Box<dyn CodeGenerator>>) -> GeneratorRegistry {
    let mut registry = GeneratorRegistry::new();
    for generator in generators {
        registry.register(generator).unwrap();
    }
    registry
}

/// Registry with factories and members injectors.
pub fn injection_registry(log: &CallLog) -> GeneratorRegistry {
    registry(vec![
        Box::new(FactoryGenerator::new(log)),
        Box::new(MembersInjectorGenerator::new(log)),
    ])
}

// ---------------------------------------------------------------------------
// Workspace
// ---------------------------------------------------------------------------

/// A temporary project with a `src/` directory and default build layout.
pub struct Workspace {
    dir: TempDir,
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new()
    }
}

impl Workspace {
    /// Creates an empty project.
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        Self { dir }
    }

    /// Returns the project directory.
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Returns the directory holding input sources.
    pub fn src_dir(&self) -> PathBuf {
        self.root().join("src")
    }

    /// Returns the default generation settings for this project.
    pub fn settings(&self) -> ResolvedGeneration {
        resolve_generation(&GenerationConfig::default(), self.root())
    }

    /// Returns the generation root.
    pub fn output_dir(&self) -> PathBuf {
        self.settings().output_dir
    }

    /// Returns the path of the cache file.
    pub fn cache_file(&self) -> PathBuf {
        self.settings().cache_dir.join(CACHE_FILE)
    }

    /// Writes an input source file.
    pub fn write_source(&self, name: &str, text: &str) {
        std::fs::write(self.src_dir().join(name), text).unwrap();
    }

    /// Deletes an input source file.
    pub fn remove_source(&self, name: &str) {
        std::fs::remove_file(self.src_dir().join(name)).unwrap();
    }

    /// Returns the identity of the input source `name`.
    pub fn source_id(&self, name: &str) -> SourceId {
        SourceId::from_path(&self.src_dir().join(name))
    }

    /// Loads every input source, sorted by path.
    pub fn sources(&self) -> Vec<SourceUnit> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(self.src_dir())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .filter(|path| path.is_file())
            .collect();
        paths.sort();
        paths
            .iter()
            .map(|path| SourceUnit::load(path).unwrap())
            .collect()
    }

    /// Reads a generated file, if present.
    pub fn output(&self, rel: &str) -> Option<String> {
        std::fs::read_to_string(self.output_dir().join(rel)).ok()
    }

    /// Writes a file directly under the generation root.
    pub fn write_output(&self, rel: &str, text: &str) {
        let path = self.output_dir().join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, text).unwrap();
    }

    /// Lists every file under the generation root, relative and sorted.
    pub fn output_files(&self) -> Vec<String> {
        let root = self.output_dir();
        let mut files = Vec::new();
        let mut dirs = vec![root.clone()];
        while let Some(dir) = dirs.pop() {
            let Ok(entries) = std::fs::read_dir(&dir) else {
                continue;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    dirs.push(path);
                } else if let Some(rel) = RelPath::from_path(&root, &path) {
                    files.push(rel.as_str().to_string());
                }
            }
        }
        files.sort();
        files
    }

    /// Opens a session with the default settings.
    pub fn session(&self, registry: GeneratorRegistry) -> GenerationSession {
        GenerationSession::open(self.settings(), registry).unwrap()
    }

    /// Opens a session after adjusting the default settings.
    pub fn session_with(
        &self,
        registry: GeneratorRegistry,
        adjust: impl FnOnce(&mut ResolvedGeneration),
    ) -> Result<GenerationSession, GenerationError> {
        let mut settings = self.settings();
        adjust(&mut settings);
        GenerationSession::open(settings, registry)
    }
}
