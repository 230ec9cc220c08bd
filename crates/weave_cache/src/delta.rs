//! Change detection between the cache and the current source units.
//!
//! Compares the fingerprints of this pass's source units against the cache
//! store to classify each source as new, modified, removed, or unchanged.

use std::collections::BTreeMap;

use weave_source::{SourceId, SourceUnit};

use crate::store::CacheStore;

/// Result of comparing the current source units against the cache store.
///
/// Every list is sorted by source identity.
#[derive(Debug, Clone, Default)]
pub struct SourceDelta {
    /// Sources that have no cache entry.
    pub new: Vec<SourceId>,

    /// Sources whose fingerprint differs from their cache entry.
    pub modified: Vec<SourceId>,

    /// Sources with a cache entry that are absent from this pass.
    pub removed: Vec<SourceId>,

    /// Sources whose fingerprint matches their cache entry.
    pub unchanged: Vec<SourceId>,
}

impl SourceDelta {
    /// Classifies `sources` against `store`.
    pub fn compute(sources: &[SourceUnit], store: &CacheStore) -> Self {
        let current: BTreeMap<&SourceId, &SourceUnit> =
            sources.iter().map(|unit| (&unit.id, unit)).collect();

        let mut delta = Self::default();
        for (id, unit) in &current {
            match store.get(id) {
                Some(entry) if entry.fingerprint == unit.fingerprint => {
                    delta.unchanged.push((*id).clone());
                }
                Some(_) => delta.modified.push((*id).clone()),
                None => delta.new.push((*id).clone()),
            }
        }

        delta.removed = store
            .entries()
            .map(|(id, _)| id)
            .filter(|id| !current.contains_key(id))
            .cloned()
            .collect();

        delta
    }

    /// Returns `true` if nothing was added, modified, or removed.
    pub fn is_empty(&self) -> bool {
        self.new.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }

    /// Returns the number of sources that need generation (new + modified).
    pub fn dirty_count(&self) -> usize {
        self.new.len() + self.modified.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::CacheEntry;

    fn store_with(entries: &[(&str, &str)]) -> CacheStore {
        let mut store = CacheStore::empty("/tmp/unused.bin");
        for (path, text) in entries {
            let unit = SourceUnit::new(*path, *text);
            store.put(unit.id, CacheEntry::new(unit.fingerprint));
        }
        store
    }

    #[test]
    fn all_new() {
        let store = store_with(&[]);
        let sources = vec![
            SourceUnit::new("/src/B.kt", "class B"),
            SourceUnit::new("/src/A.kt", "class A"),
        ];
        let delta = SourceDelta::compute(&sources, &store);
        assert_eq!(delta.new.len(), 2);
        assert_eq!(delta.new[0].as_str(), "/src/A.kt");
        assert!(delta.modified.is_empty());
        assert!(delta.removed.is_empty());
        assert!(delta.unchanged.is_empty());
        assert_eq!(delta.dirty_count(), 2);
    }

    #[test]
    fn all_unchanged() {
        let store = store_with(&[("/src/A.kt", "class A")]);
        let sources = vec![SourceUnit::new("/src/A.kt", "class A")];
        let delta = SourceDelta::compute(&sources, &store);
        assert_eq!(delta.unchanged.len(), 1);
        assert!(delta.is_empty());
    }

    #[test]
    fn modified() {
        let store = store_with(&[("/src/A.kt", "class A")]);
        let sources = vec![SourceUnit::new("/src/A.kt", "class A { val x = 1 }")];
        let delta = SourceDelta::compute(&sources, &store);
        assert_eq!(delta.modified.len(), 1);
        assert!(delta.new.is_empty());
        assert!(!delta.is_empty());
    }

    #[test]
    fn removed() {
        let store = store_with(&[("/src/A.kt", "class A"), ("/src/B.kt", "class B")]);
        let sources = vec![SourceUnit::new("/src/A.kt", "class A")];
        let delta = SourceDelta::compute(&sources, &store);
        assert_eq!(delta.removed, vec![SourceId::from("/src/B.kt")]);
        assert_eq!(delta.unchanged, vec![SourceId::from("/src/A.kt")]);
    }
}
