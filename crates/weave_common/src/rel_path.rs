//! Validated paths relative to a generation root.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// A normalized, `/`-separated path relative to the generation root.
///
/// Every generated artifact is named by a `RelPath`. Normalization makes the
/// textual form canonical, so two generators naming `a/./B.kt` and `a/B.kt`
/// are detected as writing the same file. Paths can never escape the root.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RelPath(String);

/// Reasons a string is rejected as a [`RelPath`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelPathError {
    /// The path has no components after normalization.
    #[error("relative path is empty")]
    Empty,

    /// The path is rooted or carries a drive prefix.
    #[error("path '{0}' is absolute")]
    Absolute(String),

    /// The path contains a `..` component.
    #[error("path '{0}' escapes the generation root")]
    Escapes(String),
}

impl RelPath {
    /// Parses and normalizes a relative path.
    ///
    /// Both `/` and `\` are accepted as separators; empty and `.` components
    /// are dropped.
    pub fn new(raw: &str) -> Result<Self, RelPathError> {
        if raw.starts_with('/') || raw.starts_with('\\') {
            return Err(RelPathError::Absolute(raw.to_string()));
        }
        let mut parts = Vec::new();
        for (idx, part) in raw.split(['/', '\\']).enumerate() {
            match part {
                "" | "." => {}
                ".." => return Err(RelPathError::Escapes(raw.to_string())),
                p if idx == 0 && p.len() == 2 && p.ends_with(':') => {
                    return Err(RelPathError::Absolute(raw.to_string()));
                }
                p => parts.push(p),
            }
        }
        if parts.is_empty() {
            return Err(RelPathError::Empty);
        }
        Ok(Self(parts.join("/")))
    }

    /// Computes the relative path of `path` under `root`, if it lies inside it.
    pub fn from_path(root: &Path, path: &Path) -> Option<Self> {
        let rel = path.strip_prefix(root).ok()?;
        Self::new(&rel.to_string_lossy()).ok()
    }

    /// Returns the normalized textual form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Joins this path onto a root directory.
    pub fn to_path(&self, root: &Path) -> PathBuf {
        let mut path = root.to_path_buf();
        path.extend(self.0.split('/'));
        path
    }
}

impl TryFrom<String> for RelPath {
    type Error = RelPathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<RelPath> for String {
    fn from(value: RelPath) -> Self {
        value.0
    }
}

impl fmt::Display for RelPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for RelPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RelPath({})", self.0)
    }
}
