//! Host-provided context handed to generators.

use std::path::PathBuf;

use weave_config::ResolvedGeneration;
use weave_source::{FileSet, SourceId, SourceUnit};

/// Settings every generator sees for the duration of a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationContext {
    /// Absolute generation root.
    pub output_root: PathBuf,
    /// Name of the module being compiled.
    pub module_name: String,
    /// Whether artifacts must declare their source files.
    pub track_source_files: bool,
}

impl GenerationContext {
    /// Builds the context from resolved generation settings.
    pub fn from_settings(settings: &ResolvedGeneration) -> Self {
        Self {
            output_root: settings.output_dir.clone(),
            module_name: settings.module_name.clone(),
            track_source_files: settings.track_source_files,
        }
    }
}

/// Read-only view of the module as seen by a generator.
///
/// The view is a snapshot: files produced during the current round become
/// visible only from the next round on.
#[derive(Debug, Clone, Copy)]
pub struct ModuleView<'a> {
    name: &'a str,
    files: &'a FileSet,
}

impl<'a> ModuleView<'a> {
    /// Creates a view of `files` for the module `name`.
    pub fn new(name: &'a str, files: &'a FileSet) -> Self {
        Self { name, files }
    }

    /// Returns the module name.
    pub fn name(&self) -> &'a str {
        self.name
    }

    /// Returns every file known to the module: all inputs of the pass,
    /// artifacts kept from the cache, and files generated in earlier rounds.
    pub fn files(&self) -> &'a FileSet {
        self.files
    }

    /// Looks up one file.
    pub fn get(&self, id: &SourceId) -> Option<&'a SourceUnit> {
        self.files.get(id)
    }
}
