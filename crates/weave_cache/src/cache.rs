//! Restore and commit phases of the generated-file cache.
//!
//! [`IncrementalCache`] ties together the cache store, the blob store, and
//! change detection. Before generation, [`restore`](IncrementalCache::restore)
//! evicts artifacts of removed or changed sources, puts back missing artifacts
//! of unchanged sources, and returns the sources that still need generation.
//! After generation, [`commit`](IncrementalCache::commit) records which
//! artifacts came from which sources and persists the store.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use weave_common::{ContentHash, RelPath};
use weave_source::{GeneratedArtifact, SourceId, SourceUnit};

use crate::blob::BlobStore;
use crate::delta::SourceDelta;
use crate::error::CacheError;
use crate::store::{ArtifactRef, CacheEntry, CacheStore, CACHE_FILE};

/// An artifact kept on disk from a previous pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetainedArtifact {
    /// Fingerprint of the cached content.
    pub fingerprint: ContentHash,
    /// Sources the artifact is attributed to.
    pub owners: BTreeSet<SourceId>,
}

/// Result of the restore phase.
#[derive(Debug, Clone, Default)]
pub struct RestoreOutcome {
    /// Sources that must be fed to generators, sorted by identity.
    pub residual: Vec<SourceUnit>,
    /// Artifacts kept from the cache.
    pub retained: BTreeMap<RelPath, RetainedArtifact>,
    /// Retained artifacts that were missing or altered and rewritten from cache.
    pub restored: Vec<RelPath>,
    /// Artifacts deleted because their sources were removed or changed,
    /// plus files under the output root that no cache entry owns.
    pub evicted: BTreeSet<RelPath>,
}

/// The generated-file cache for one output directory.
///
/// Opening the cache loads the store synchronously; nothing is initialized
/// lazily. The cache provides no locking: only one pass may use a given
/// cache directory at a time.
pub struct IncrementalCache {
    /// Generation root the cached artifacts live under.
    output_dir: PathBuf,
    /// Source-to-artifact associations.
    store: CacheStore,
    /// Bytes of every cached artifact.
    blobs: BlobStore,
    /// When `false` the cache is bypassed and the output root is wiped.
    tracking: bool,
}

impl IncrementalCache {
    /// Opens the cache stored in `cache_dir` for artifacts under `output_dir`.
    ///
    /// A missing or corrupt cache file yields an empty cache unless `strict`
    /// is set, see [`CacheStore::load`].
    pub fn open(
        output_dir: &Path,
        cache_dir: &Path,
        tracking: bool,
        strict: bool,
    ) -> Result<Self, CacheError> {
        let store = CacheStore::load(&cache_dir.join(CACHE_FILE), strict)?;
        Ok(Self {
            output_dir: output_dir.to_path_buf(),
            store,
            blobs: BlobStore::new(cache_dir),
            tracking,
        })
    }

    /// Returns the generation root.
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Returns `true` if incremental tracking is enabled.
    pub fn is_tracking(&self) -> bool {
        self.tracking
    }

    /// Returns the in-memory cache store.
    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    /// Brings the output root in line with the cache for this pass's sources.
    ///
    /// Removed and changed sources lose their artifacts and entries, as does
    /// every source sharing an artifact with them. When any source is left
    /// needing generation, every owner of an aggregating artifact is
    /// invalidated as well.
    /// Unchanged sources keep their artifacts; any that are missing or
    /// altered on disk are rewritten from cached bytes, and a source whose
    /// bytes are gone is regenerated instead. Files under the output root
    /// that no remaining entry owns are deleted. With tracking disabled the
    /// output root is wiped and every source is residual.
    pub fn restore(&mut self, sources: &[SourceUnit]) -> Result<RestoreOutcome, CacheError> {
        if !self.tracking {
            return self.reset(sources);
        }

        let delta = SourceDelta::compute(sources, &self.store);
        let mut invalid: BTreeSet<SourceId> = delta
            .removed
            .iter()
            .chain(&delta.modified)
            .cloned()
            .collect();

        let mut pending = BTreeMap::new();
        loop {
            self.close_over_co_owners(&mut invalid);
            if self.needs_generation(sources, &invalid) {
                let before = invalid.len();
                invalid.extend(self.aggregate_owners());
                if invalid.len() != before {
                    continue;
                }
            }
            pending.clear();

            let mut unrestorable = Vec::new();
            for id in delta.unchanged.iter().filter(|id| !invalid.contains(*id)) {
                let Some(entry) = self.store.get(id) else {
                    continue;
                };
                for artifact in &entry.artifacts {
                    if self.is_intact(artifact) {
                        continue;
                    }
                    match self.blobs.read_blob(&artifact.fingerprint) {
                        Some(bytes) => {
                            pending.insert(artifact.path.clone(), bytes);
                        }
                        None => {
                            tracing::warn!(
                                source = %id,
                                artifact = %artifact.path,
                                "cached artifact cannot be restored, regenerating source"
                            );
                            unrestorable.push(id.clone());
                            break;
                        }
                    }
                }
            }

            if unrestorable.is_empty() {
                break;
            }
            invalid.extend(unrestorable);
        }

        let mut outcome = RestoreOutcome::default();
        for id in &invalid {
            let Some(entry) = self.store.remove(id) else {
                continue;
            };
            tracing::debug!(
                source = %id,
                artifacts = entry.artifacts.len(),
                "evicting cache entry"
            );
            for artifact in entry.artifacts {
                if self.delete_artifact(&artifact.path)? {
                    outcome.evicted.insert(artifact.path);
                }
            }
        }

        for (path, bytes) in pending {
            let target = path.to_path(&self.output_dir);
            write_file(&target, &bytes)?;
            tracing::debug!(artifact = %path, "restored artifact from cache");
            outcome.restored.push(path);
        }

        for (id, entry) in self.store.entries() {
            for artifact in &entry.artifacts {
                outcome
                    .retained
                    .entry(artifact.path.clone())
                    .or_insert_with(|| RetainedArtifact {
                        fingerprint: artifact.fingerprint,
                        owners: BTreeSet::new(),
                    })
                    .owners
                    .insert(id.clone());
            }
        }
        outcome.evicted.extend(self.sweep_orphans(&outcome.retained)?);

        outcome.residual = residual_units(sources, |id| self.is_residual(id, &invalid));

        tracing::info!(
            new = delta.new.len(),
            modified = delta.modified.len(),
            removed = delta.removed.len(),
            unchanged = delta.unchanged.len(),
            residual = outcome.residual.len(),
            restored = outcome.restored.len(),
            evicted = outcome.evicted.len(),
            "restored generated files from cache"
        );
        Ok(outcome)
    }

    /// Records the artifacts of a finished generation run and persists the store.
    ///
    /// Every input unit in `fed` gets a fresh entry, then each tracked
    /// artifact is attributed to every source in its sourced-from set.
    /// Sourced-from ids naming generated files are followed back to the input
    /// sources they came from. Ids outside this compilation are dropped. An
    /// artifact left without an owner is attributed to every input in `fed`
    /// and recorded as aggregating, so it is restored while nothing changes
    /// and regenerated as soon as any source is added or changed.
    /// Untracked artifacts are not recorded.
    /// Calling this twice with the same inputs yields the same store.
    pub fn commit(
        &mut self,
        fed: &[SourceUnit],
        artifacts: &[GeneratedArtifact],
    ) -> Result<(), CacheError> {
        if !self.tracking {
            return Ok(());
        }

        let fed_inputs: BTreeSet<SourceId> = fed
            .iter()
            .filter(|unit| !unit.is_generated())
            .map(|unit| unit.id.clone())
            .collect();
        for unit in fed.iter().filter(|unit| !unit.is_generated()) {
            self.store
                .put(unit.id.clone(), CacheEntry::new(unit.fingerprint));
        }

        let produced: BTreeMap<SourceId, &GeneratedArtifact> = artifacts
            .iter()
            .map(|a| (a.source_id(&self.output_dir), a))
            .collect();

        for artifact in artifacts {
            let Some(sourced_from) = &artifact.sourced_from else {
                continue;
            };
            let mut owners = self.resolve_owners(sourced_from, &produced);
            owners.retain(|owner| {
                let known = self.store.get(owner).is_some();
                if !known {
                    tracing::debug!(
                        artifact = %artifact.path,
                        source = %owner,
                        "ignoring source outside this compilation"
                    );
                }
                known
            });

            let mut aggregating = artifact.aggregating;
            if owners.is_empty() {
                if fed_inputs.is_empty() {
                    tracing::warn!(
                        artifact = %artifact.path,
                        "artifact has no owning source and will not be restored"
                    );
                    continue;
                }
                tracing::debug!(
                    artifact = %artifact.path,
                    owners = fed_inputs.len(),
                    "attributing unowned artifact to every fed source"
                );
                owners = fed_inputs.clone();
                aggregating = true;
            }

            let fingerprint = self.blobs.write_blob(artifact.content.as_bytes())?;
            let reference = ArtifactRef {
                path: artifact.path.clone(),
                fingerprint,
                aggregating,
            };
            for owner in owners {
                if let Some(entry) = self.store.get_mut(&owner) {
                    entry.add_artifact(reference.clone());
                }
            }
        }

        let collected = self.blobs.gc(&self.store.live_fingerprints())?;
        self.store.persist()?;
        tracing::debug!(
            entries = self.store.len(),
            blobs_collected = collected,
            "committed generated files"
        );
        Ok(())
    }

    /// Wipes the output root and cache; every source is residual.
    fn reset(&mut self, sources: &[SourceUnit]) -> Result<RestoreOutcome, CacheError> {
        if self.output_dir.exists() {
            std::fs::remove_dir_all(&self.output_dir).map_err(|e| {
                CacheError::StaleArtifactDeleteFailed {
                    path: self.output_dir.clone(),
                    source: e,
                }
            })?;
        }
        std::fs::create_dir_all(&self.output_dir)
            .map_err(|e| CacheError::io(&self.output_dir, e))?;

        self.store.clear();
        self.store.persist()?;
        self.blobs.gc(&BTreeSet::new())?;

        tracing::info!(
            sources = sources.len(),
            "source tracking disabled, regenerating everything"
        );
        Ok(RestoreOutcome {
            residual: residual_units(sources, |_| true),
            ..RestoreOutcome::default()
        })
    }

    fn is_residual(&self, id: &SourceId, invalid: &BTreeSet<SourceId>) -> bool {
        invalid.contains(id) || self.store.get(id).is_none()
    }

    /// Returns `true` if any of `sources` would be fed to generators.
    fn needs_generation(&self, sources: &[SourceUnit], invalid: &BTreeSet<SourceId>) -> bool {
        sources.iter().any(|unit| self.is_residual(&unit.id, invalid))
    }

    /// Returns the sources owning at least one aggregating artifact.
    fn aggregate_owners(&self) -> Vec<SourceId> {
        self.store
            .entries()
            .filter(|(_, entry)| entry.artifacts.iter().any(|a| a.aggregating))
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Adds every source that shares an artifact with an invalid source.
    fn close_over_co_owners(&self, invalid: &mut BTreeSet<SourceId>) {
        let mut owners: BTreeMap<&RelPath, Vec<&SourceId>> = BTreeMap::new();
        for (id, entry) in self.store.entries() {
            for artifact in &entry.artifacts {
                owners.entry(&artifact.path).or_default().push(id);
            }
        }

        let mut work: Vec<SourceId> = invalid.iter().cloned().collect();
        while let Some(id) = work.pop() {
            let Some(entry) = self.store.get(&id) else {
                continue;
            };
            for artifact in &entry.artifacts {
                for co_owner in owners.get(&artifact.path).into_iter().flatten() {
                    if invalid.insert((*co_owner).clone()) {
                        tracing::debug!(
                            source = %co_owner,
                            shared_with = %id,
                            "invalidating co-owner"
                        );
                        work.push((*co_owner).clone());
                    }
                }
            }
        }
    }

    /// Follows sourced-from ids back to the input sources that own them.
    fn resolve_owners(
        &self,
        sourced_from: &BTreeSet<SourceId>,
        produced: &BTreeMap<SourceId, &GeneratedArtifact>,
    ) -> BTreeSet<SourceId> {
        let mut owners = BTreeSet::new();
        let mut visited = BTreeSet::new();
        let mut work: Vec<SourceId> = sourced_from.iter().cloned().collect();

        while let Some(id) = work.pop() {
            if !visited.insert(id.clone()) {
                continue;
            }
            if let Some(parent) = produced.get(&id) {
                work.extend(parent.sourced_from.iter().flatten().cloned());
                continue;
            }
            if let Some(rel) = RelPath::from_path(&self.output_dir, Path::new(id.as_str())) {
                let cached = self.store.owners_of(&rel);
                if !cached.is_empty() {
                    work.extend(cached);
                    continue;
                }
            }
            owners.insert(id);
        }
        owners
    }

    fn is_intact(&self, artifact: &ArtifactRef) -> bool {
        std::fs::read(artifact.path.to_path(&self.output_dir))
            .map(|bytes| ContentHash::from_bytes(&bytes) == artifact.fingerprint)
            .unwrap_or(false)
    }

    /// Deletes an artifact file, returning whether it existed.
    fn delete_artifact(&self, path: &RelPath) -> Result<bool, CacheError> {
        delete_file(&path.to_path(&self.output_dir))
    }

    /// Deletes files under the output root that are not in `live`.
    fn sweep_orphans(
        &self,
        live: &BTreeMap<RelPath, RetainedArtifact>,
    ) -> Result<Vec<RelPath>, CacheError> {
        let mut swept = Vec::new();
        if !self.output_dir.is_dir() {
            return Ok(swept);
        }

        let mut dirs = vec![self.output_dir.clone()];
        while let Some(dir) = dirs.pop() {
            let entries = std::fs::read_dir(&dir).map_err(|e| CacheError::io(&dir, e))?;
            for entry in entries {
                let path = entry.map_err(|e| CacheError::io(&dir, e))?.path();
                if path.is_dir() {
                    dirs.push(path);
                    continue;
                }
                let rel = RelPath::from_path(&self.output_dir, &path);
                if rel.as_ref().is_some_and(|rel| live.contains_key(rel)) {
                    continue;
                }
                delete_file(&path)?;
                tracing::debug!(path = %path.display(), "deleted orphaned output file");
                if let Some(rel) = rel {
                    swept.push(rel);
                }
            }
        }
        Ok(swept)
    }
}

/// Collects the units selected by `needs_generation`, sorted and unique by id.
fn residual_units(
    sources: &[SourceUnit],
    mut needs_generation: impl FnMut(&SourceId) -> bool,
) -> Vec<SourceUnit> {
    let mut by_id = BTreeMap::new();
    for unit in sources {
        if needs_generation(&unit.id) {
            by_id.insert(unit.id.clone(), unit.clone());
        }
    }
    by_id.into_values().collect()
}

fn delete_file(path: &Path) -> Result<bool, CacheError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(CacheError::StaleArtifactDeleteFailed {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<(), CacheError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| CacheError::io(parent, e))?;
    }
    std::fs::write(path, bytes).map_err(|e| CacheError::io(path, e))
}
