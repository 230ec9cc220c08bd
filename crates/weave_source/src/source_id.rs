//! Stable identity for compilation files.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Stable identity of one compilation file: its absolute path as a string.
///
/// Unlike a session-local index, a `SourceId` is the same across compiler
/// invocations, which is what lets the generated-file cache key its records
/// by it.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    /// Creates a `SourceId` from an identity string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Creates a `SourceId` from a filesystem path.
    pub fn from_path(path: &Path) -> Self {
        Self(path.to_string_lossy().into_owned())
    }

    /// Returns the identity string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SourceId({})", self.0)
    }
}

impl From<&str> for SourceId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_path_uses_full_path() {
        let id = SourceId::from_path(Path::new("/src/main/Foo.kt"));
        assert_eq!(id.as_str(), "/src/main/Foo.kt");
    }

    #[test]
    fn equal_paths_equal_ids() {
        assert_eq!(SourceId::from("/a.kt"), SourceId::new("/a.kt".to_string()));
        assert_ne!(SourceId::from("/a.kt"), SourceId::from("/b.kt"));
    }

    #[test]
    fn serde_is_transparent() {
        let id = SourceId::from("/src/A.kt");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"/src/A.kt\"");
        let back: SourceId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
