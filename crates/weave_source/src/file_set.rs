//! Immutable snapshots of the files visible to generators.

use crate::source_id::SourceId;
use crate::source_unit::SourceUnit;
use std::collections::BTreeMap;
use std::sync::Arc;

/// An immutable, identity-ordered snapshot of compilation files.
///
/// The generation loop never mutates a snapshot in place: each round reads
/// the current snapshot and [`extended`](FileSet::extended) produces the next
/// one from the round's delta. Cloning a `FileSet` is cheap.
#[derive(Clone, Debug, Default)]
pub struct FileSet {
    files: Arc<BTreeMap<SourceId, SourceUnit>>,
}

impl FileSet {
    /// Creates an empty file set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a new snapshot containing this set's files plus `delta`.
    ///
    /// A unit in `delta` with an id already present replaces the existing
    /// entry; `self` is left unchanged.
    pub fn extended(&self, delta: impl IntoIterator<Item = SourceUnit>) -> Self {
        let mut files = (*self.files).clone();
        for unit in delta {
            files.insert(unit.id.clone(), unit);
        }
        Self {
            files: Arc::new(files),
        }
    }

    /// Returns the unit with the given id.
    pub fn get(&self, id: &SourceId) -> Option<&SourceUnit> {
        self.files.get(id)
    }

    /// Returns `true` if a unit with the given id is present.
    pub fn contains(&self, id: &SourceId) -> bool {
        self.files.contains_key(id)
    }

    /// Returns the number of files in the snapshot.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Returns `true` if the snapshot holds no files.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Iterates over the files in id order.
    pub fn iter(&self) -> impl Iterator<Item = &SourceUnit> {
        self.files.values()
    }

    /// Collects the files, in id order, into an owned list.
    pub fn to_vec(&self) -> Vec<SourceUnit> {
        self.files.values().cloned().collect()
    }
}

impl FromIterator<SourceUnit> for FileSet {
    fn from_iter<T: IntoIterator<Item = SourceUnit>>(iter: T) -> Self {
        Self::new().extended(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extended_leaves_original_untouched() {
        let base: FileSet = [SourceUnit::new("/src/A.kt", "class A")]
            .into_iter()
            .collect();
        let next = base.extended([SourceUnit::generated("/out/B.kt", "class B")]);
        assert_eq!(base.len(), 1);
        assert_eq!(next.len(), 2);
        assert!(!base.contains(&SourceId::from("/out/B.kt")));
        assert!(next.contains(&SourceId::from("/out/B.kt")));
    }

    #[test]
    fn extended_replaces_same_id() {
        let base: FileSet = [SourceUnit::generated("/out/B.kt", "v1")]
            .into_iter()
            .collect();
        let next = base.extended([SourceUnit::generated("/out/B.kt", "v2")]);
        assert_eq!(next.len(), 1);
        assert_eq!(&*next.get(&SourceId::from("/out/B.kt")).unwrap().text, "v2");
    }

    #[test]
    fn iteration_is_id_ordered() {
        let set: FileSet = [
            SourceUnit::new("/src/C.kt", ""),
            SourceUnit::new("/src/A.kt", ""),
            SourceUnit::new("/src/B.kt", ""),
        ]
        .into_iter()
        .collect();
        let ids: Vec<&str> = set.iter().map(|u| u.id.as_str()).collect();
        assert_eq!(ids, vec!["/src/A.kt", "/src/B.kt", "/src/C.kt"]);
    }

    #[test]
    fn empty_set() {
        let set = FileSet::new();
        assert!(set.is_empty());
        assert!(set.to_vec().is_empty());
    }
}
