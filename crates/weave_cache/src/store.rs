//! Durable mapping from source identity to the artifacts it produced.
//!
//! The store is persisted as a single binary file in the cache directory.
//! Layout:
//!
//! - Header: magic `b"WVGC"`, format version `u32`, record count `u32`
//! - Records: each one a `u32` byte length followed by a bincode-encoded
//!   [`CacheRecord`]. Bytes of a record beyond what this version decodes are
//!   ignored, so newer writers may append fields.
//! - Footer: XXH3-64 checksum of all preceding bytes
//!
//! Records are written in source-identity order with artifacts sorted by
//! path, so a store that is reloaded and persisted again is byte-identical.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use weave_common::{ContentHash, RelPath};
use weave_source::SourceId;

use crate::error::CacheError;

/// Name of the cache file within the cache directory.
pub const CACHE_FILE: &str = "generated-files.bin";

/// Magic bytes identifying a weave cache file.
const CACHE_MAGIC: [u8; 4] = *b"WVGC";

/// Current cache file format version. Files written by a newer version are
/// treated as corrupt and rebuilt.
const CACHE_FORMAT_VERSION: u32 = 1;

/// Magic + version + record count.
const HEADER_LEN: usize = 12;

/// XXH3-64 footer.
const FOOTER_LEN: usize = 8;

/// A reference from a cache entry to one generated artifact.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArtifactRef {
    /// Output path relative to the generation root.
    pub path: RelPath,
    /// Fingerprint of the artifact content.
    pub fingerprint: ContentHash,
    /// The artifact summarizes many sources and is regenerated whenever
    /// any source is added or modified.
    pub aggregating: bool,
}

/// Cached state for a single source unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Fingerprint of the source when its artifacts were generated.
    pub fingerprint: ContentHash,
    /// Artifacts attributed to the source, sorted and unique by path.
    pub artifacts: Vec<ArtifactRef>,
}

impl CacheEntry {
    /// Creates an entry with no artifacts.
    pub fn new(fingerprint: ContentHash) -> Self {
        Self {
            fingerprint,
            artifacts: Vec::new(),
        }
    }

    /// Adds an artifact, replacing any earlier reference with the same path.
    pub fn add_artifact(&mut self, artifact: ArtifactRef) {
        match self
            .artifacts
            .binary_search_by(|a| a.path.cmp(&artifact.path))
        {
            Ok(idx) => self.artifacts[idx] = artifact,
            Err(idx) => self.artifacts.insert(idx, artifact),
        }
    }

    fn normalize(&mut self) {
        // Later references win, matching add_artifact.
        let mut by_path = BTreeMap::new();
        for artifact in self.artifacts.drain(..) {
            by_path.insert(artifact.path.clone(), artifact);
        }
        self.artifacts = by_path.into_values().collect();
    }
}

/// Logical record shape of the cache file.
#[derive(Debug, Serialize, Deserialize)]
struct CacheRecord {
    source: SourceId,
    fingerprint: ContentHash,
    artifacts: Vec<ArtifactRef>,
}

/// The in-memory index of the cache file, keyed by source identity.
///
/// Nothing is written until [`persist`](CacheStore::persist) is called, which
/// replaces the file atomically.
#[derive(Debug, Clone)]
pub struct CacheStore {
    /// Location of the cache file.
    path: PathBuf,
    /// Entries keyed by source identity.
    entries: BTreeMap<SourceId, CacheEntry>,
}

impl CacheStore {
    /// Creates an empty store that will persist to `path`.
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: BTreeMap::new(),
        }
    }

    /// Loads the store from `path`.
    ///
    /// A missing file is an empty store. An unreadable or undecodable file is
    /// an empty store with a warning, unless `strict` is set, in which case it
    /// is reported as [`CacheError::Io`] or [`CacheError::Corrupt`].
    pub fn load(path: &Path, strict: bool) -> Result<Self, CacheError> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no cache file, starting empty");
                return Ok(Self::empty(path));
            }
            Err(e) if strict => return Err(CacheError::io(path, e)),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "cache file unreadable, starting empty"
                );
                return Ok(Self::empty(path));
            }
        };

        match decode(&bytes) {
            Ok(entries) => {
                tracing::debug!(path = %path.display(), entries = entries.len(), "loaded cache");
                Ok(Self {
                    path: path.to_path_buf(),
                    entries,
                })
            }
            Err(reason) if strict => Err(CacheError::Corrupt {
                path: path.to_path_buf(),
                reason,
            }),
            Err(reason) => {
                tracing::warn!(
                    path = %path.display(),
                    %reason,
                    "cache file corrupt, starting empty"
                );
                Ok(Self::empty(path))
            }
        }
    }

    /// Returns the location of the cache file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the entry for a source.
    pub fn get(&self, source: &SourceId) -> Option<&CacheEntry> {
        self.entries.get(source)
    }

    /// Returns a mutable entry for a source.
    pub fn get_mut(&mut self, source: &SourceId) -> Option<&mut CacheEntry> {
        self.entries.get_mut(source)
    }

    /// Inserts or replaces the entry for a source.
    pub fn put(&mut self, source: SourceId, mut entry: CacheEntry) {
        entry.normalize();
        self.entries.insert(source, entry);
    }

    /// Removes and returns the entry for a source.
    pub fn remove(&mut self, source: &SourceId) -> Option<CacheEntry> {
        self.entries.remove(source)
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Iterates over entries in source-identity order.
    pub fn entries(&self) -> impl Iterator<Item = (&SourceId, &CacheEntry)> {
        self.entries.iter()
    }

    /// Returns the number of cached sources.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no source is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the sources that list an artifact at `path`.
    pub fn owners_of(&self, path: &RelPath) -> BTreeSet<SourceId> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.artifacts.iter().any(|a| &a.path == path))
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Returns the fingerprints of every referenced artifact.
    pub fn live_fingerprints(&self) -> BTreeSet<ContentHash> {
        self.entries
            .values()
            .flat_map(|entry| entry.artifacts.iter().map(|a| a.fingerprint))
            .collect()
    }

    /// Writes the whole store to disk.
    ///
    /// The encoded bytes go to a sibling temp file which is synced and then
    /// renamed over the cache file, so readers see either the old or the new
    /// store, never a partial one.
    pub fn persist(&self) -> Result<(), CacheError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CacheError::io(parent, e))?;
        }
        let data = self.encode()?;

        let mut tmp_name = self.path.file_name().unwrap_or_default().to_os_string();
        tmp_name.push(".tmp");
        let tmp_path = self.path.with_file_name(tmp_name);

        let mut file =
            std::fs::File::create(&tmp_path).map_err(|e| CacheError::io(&tmp_path, e))?;
        file.write_all(&data)
            .and_then(|()| file.sync_all())
            .map_err(|e| CacheError::io(&tmp_path, e))?;
        drop(file);

        std::fs::rename(&tmp_path, &self.path).map_err(|e| CacheError::io(&self.path, e))?;
        tracing::debug!(
            path = %self.path.display(),
            entries = self.entries.len(),
            "persisted cache"
        );
        Ok(())
    }

    fn encode(&self) -> Result<Vec<u8>, CacheError> {
        let count = u32::try_from(self.entries.len()).map_err(|_| CacheError::Serialization {
            reason: "too many cache records".to_string(),
        })?;

        let mut data = Vec::new();
        data.extend_from_slice(&CACHE_MAGIC);
        data.extend_from_slice(&CACHE_FORMAT_VERSION.to_le_bytes());
        data.extend_from_slice(&count.to_le_bytes());

        for (source, entry) in &self.entries {
            let record = CacheRecord {
                source: source.clone(),
                fingerprint: entry.fingerprint,
                artifacts: entry.artifacts.clone(),
            };
            let bytes = bincode::serde::encode_to_vec(&record, bincode::config::standard())
                .map_err(|e| CacheError::Serialization {
                    reason: e.to_string(),
                })?;
            let len = u32::try_from(bytes.len()).map_err(|_| CacheError::Serialization {
                reason: format!("cache record for {source} too large"),
            })?;
            data.extend_from_slice(&len.to_le_bytes());
            data.extend_from_slice(&bytes);
        }

        let checksum = xxhash_rust::xxh3::xxh3_64(&data);
        data.extend_from_slice(&checksum.to_le_bytes());
        Ok(data)
    }
}

fn read_u32(bytes: &[u8], at: usize) -> Option<u32> {
    let raw = bytes.get(at..at + 4)?;
    Some(u32::from_le_bytes(raw.try_into().ok()?))
}

/// Decodes a cache file, describing the first problem found.
fn decode(bytes: &[u8]) -> Result<BTreeMap<SourceId, CacheEntry>, String> {
    if bytes.len() < HEADER_LEN + FOOTER_LEN {
        return Err(format!("file too short ({} bytes)", bytes.len()));
    }
    if bytes[..4] != CACHE_MAGIC {
        return Err("bad magic bytes".to_string());
    }

    let (body, footer) = bytes.split_at(bytes.len() - FOOTER_LEN);
    let stored = u64::from_le_bytes(
        footer
            .try_into()
            .map_err(|_| "truncated checksum".to_string())?,
    );
    let actual = xxhash_rust::xxh3::xxh3_64(body);
    if stored != actual {
        return Err(format!(
            "checksum mismatch: expected {stored:016x}, got {actual:016x}"
        ));
    }

    let version = read_u32(body, 4).ok_or("truncated header")?;
    if version == 0 || version > CACHE_FORMAT_VERSION {
        return Err(format!("unsupported format version {version}"));
    }
    let count = read_u32(body, 8).ok_or("truncated header")?;

    let mut entries = BTreeMap::new();
    let mut cursor = HEADER_LEN;
    for idx in 0..count {
        let len = read_u32(body, cursor)
            .ok_or_else(|| format!("record {idx} truncated"))? as usize;
        cursor += 4;
        let slice = body
            .get(cursor..cursor + len)
            .ok_or_else(|| format!("record {idx} truncated"))?;
        cursor += len;

        let (record, _consumed): (CacheRecord, usize) =
            bincode::serde::decode_from_slice(slice, bincode::config::standard())
                .map_err(|e| format!("record {idx}: {e}"))?;
        let mut entry = CacheEntry {
            fingerprint: record.fingerprint,
            artifacts: record.artifacts,
        };
        entry.normalize();
        entries.insert(record.source, entry);
    }

    Ok(entries)
}
