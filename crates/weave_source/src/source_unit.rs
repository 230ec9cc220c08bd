//! A single compilation file with its fingerprint.

use crate::source_id::SourceId;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use weave_common::ContentHash;

/// Where a [`SourceUnit`] came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Origin {
    /// Supplied by the host compiler as a compilation input.
    Input,
    /// Produced by a generator earlier in the current pass.
    Generated,
}

/// One file fed to generators: an original compilation input or a file
/// generated earlier in the same pass.
///
/// The text is shared, so cloning a unit into a new [`FileSet`](crate::FileSet)
/// snapshot does not copy file content.
#[derive(Clone, Debug)]
pub struct SourceUnit {
    /// Stable identity, derived from the absolute path.
    pub id: SourceId,
    /// The filesystem path of this file.
    pub path: PathBuf,
    /// The full text content of the file.
    pub text: Arc<str>,
    /// Fingerprint of the content, used for cache invalidation.
    pub fingerprint: ContentHash,
    /// Whether this is a host input or a generated file.
    pub origin: Origin,
}

impl SourceUnit {
    /// Creates an input unit from in-memory text.
    pub fn new(path: impl Into<PathBuf>, text: impl Into<Arc<str>>) -> Self {
        Self::with_origin(path.into(), text.into(), Origin::Input)
    }

    /// Creates a unit for a file generated in the current pass.
    pub fn generated(path: impl Into<PathBuf>, text: impl Into<Arc<str>>) -> Self {
        Self::with_origin(path.into(), text.into(), Origin::Generated)
    }

    /// Reads an input unit from the filesystem.
    pub fn load(path: &Path) -> Result<Self, io::Error> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::new(path, text))
    }

    fn with_origin(path: PathBuf, text: Arc<str>, origin: Origin) -> Self {
        Self {
            id: SourceId::from_path(&path),
            fingerprint: ContentHash::from_bytes(text.as_bytes()),
            path,
            text,
            origin,
        }
    }

    /// Returns `true` if this unit was produced by a generator.
    pub fn is_generated(&self) -> bool {
        self.origin == Origin::Generated
    }
}
