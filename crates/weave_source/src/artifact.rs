//! Output files produced by generators.

use crate::source_id::SourceId;
use crate::source_unit::SourceUnit;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use weave_common::{ContentHash, RelPath};

/// One file produced by a generator.
///
/// An artifact that declares a sourced-from set is *tracked*: the cache
/// attributes it to those sources and can restore or evict it without
/// re-running generators. An artifact without one is *untracked* and is
/// regenerated on every pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GeneratedArtifact {
    /// Output path relative to the generation root.
    pub path: RelPath,
    /// Full text of the generated file.
    pub content: String,
    /// Sources whose content determined this artifact, if declared.
    pub sourced_from: Option<BTreeSet<SourceId>>,
    /// Marks the artifact as an intended replacement of an identical earlier write.
    pub flush_overwrite: bool,
    /// The artifact summarizes many sources, so any added or modified source
    /// invalidates it.
    pub aggregating: bool,
}

impl GeneratedArtifact {
    /// Creates an untracked artifact.
    pub fn new(path: RelPath, content: impl Into<String>) -> Self {
        Self {
            path,
            content: content.into(),
            sourced_from: None,
            flush_overwrite: false,
            aggregating: false,
        }
    }

    /// Declares the sources this artifact was generated from, making it tracked.
    ///
    /// An empty iterator still yields a tracked artifact with no owners.
    pub fn sourced_from(mut self, sources: impl IntoIterator<Item = SourceId>) -> Self {
        self.sourced_from = Some(sources.into_iter().collect());
        self
    }

    /// Marks this artifact as a flush overwrite.
    pub fn with_flush_overwrite(mut self) -> Self {
        self.flush_overwrite = true;
        self
    }

    /// Marks this artifact as aggregating.
    pub fn aggregating(mut self) -> Self {
        self.aggregating = true;
        self
    }

    /// Returns `true` if the artifact declares its provenance.
    pub fn is_tracked(&self) -> bool {
        self.sourced_from.is_some()
    }

    /// Fingerprint of the generated content.
    pub fn fingerprint(&self) -> ContentHash {
        ContentHash::from_bytes(self.content.as_bytes())
    }

    /// Absolute location of the artifact under `output_root`.
    pub fn output_path(&self, output_root: &Path) -> PathBuf {
        self.path.to_path(output_root)
    }

    /// Identity the artifact has once it is fed back to generators.
    pub fn source_id(&self, output_root: &Path) -> SourceId {
        SourceId::from_path(&self.output_path(output_root))
    }

    /// Converts the artifact into a generated [`SourceUnit`] under `output_root`.
    pub fn to_source_unit(&self, output_root: &Path) -> SourceUnit {
        SourceUnit::generated(self.output_path(output_root), self.content.as_str())
    }
}
