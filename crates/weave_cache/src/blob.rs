//! Content-addressed storage of generated artifact bytes.
//!
//! Cache records only hold artifact fingerprints. To put a missing artifact
//! back on disk without re-running its generator, the bytes of every tracked
//! artifact are kept under `<cache_dir>/blobs/<fingerprint>.blob`, each with a
//! header containing magic bytes, a format version, and a checksum.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use weave_common::ContentHash;

use crate::error::CacheError;

/// Subdirectory of the cache directory holding blobs.
const BLOB_SUBDIR: &str = "blobs";

/// File extension of blob files.
const BLOB_EXT: &str = "blob";

/// Magic bytes identifying a weave blob.
const BLOB_MAGIC: [u8; 4] = *b"WVBL";

/// Current blob format version. Increment on breaking changes to the header.
const BLOB_FORMAT_VERSION: u32 = 1;

/// Header prepended to every blob for validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobHeader {
    /// Magic bytes: must be `b"WVBL"`.
    pub magic: [u8; 4],

    /// Blob format version.
    pub format_version: u32,

    /// Content hash of the payload.
    pub checksum: ContentHash,
}

/// Content-addressed store for artifact bytes.
pub struct BlobStore {
    /// Directory holding the blob files.
    dir: PathBuf,
}

impl BlobStore {
    /// Creates a blob store under the given cache directory.
    pub fn new(cache_dir: &Path) -> Self {
        Self {
            dir: cache_dir.join(BLOB_SUBDIR),
        }
    }

    /// Returns the file path of the blob for `hash`.
    pub fn blob_path(&self, hash: &ContentHash) -> PathBuf {
        self.dir.join(format!("{hash}.{BLOB_EXT}"))
    }

    /// Stores `data` under its fingerprint.
    ///
    /// A valid blob with the same fingerprint is left untouched.
    pub fn write_blob(&self, data: &[u8]) -> Result<ContentHash, CacheError> {
        let hash = ContentHash::from_bytes(data);
        if self.read_blob(&hash).is_some() {
            return Ok(hash);
        }
        std::fs::create_dir_all(&self.dir).map_err(|e| CacheError::io(&self.dir, e))?;

        let header = BlobHeader {
            magic: BLOB_MAGIC,
            format_version: BLOB_FORMAT_VERSION,
            checksum: hash,
        };
        let header_bytes = bincode::serde::encode_to_vec(&header, bincode::config::standard())
            .map_err(|e| CacheError::Serialization {
                reason: e.to_string(),
            })?;

        // Write: 4-byte header length (little-endian) + header + payload
        let header_len = header_bytes.len() as u32;
        let mut output = Vec::with_capacity(4 + header_bytes.len() + data.len());
        output.extend_from_slice(&header_len.to_le_bytes());
        output.extend_from_slice(&header_bytes);
        output.extend_from_slice(data);

        let path = self.blob_path(&hash);
        std::fs::write(&path, &output).map_err(|e| CacheError::io(path, e))?;
        Ok(hash)
    }

    /// Reads the blob for `hash`, validating its header and payload.
    ///
    /// Returns `None` if the blob is missing, truncated, of another format
    /// version, or its payload does not hash to `hash`.
    pub fn read_blob(&self, hash: &ContentHash) -> Option<Vec<u8>> {
        let raw = std::fs::read(self.blob_path(hash)).ok()?;
        if raw.len() < 4 {
            return None;
        }

        let header_len = u32::from_le_bytes(raw[..4].try_into().ok()?) as usize;
        if raw.len() < 4 + header_len {
            return None;
        }

        let header: BlobHeader =
            bincode::serde::decode_from_slice(&raw[4..4 + header_len], bincode::config::standard())
                .ok()?
                .0;
        if header.magic != BLOB_MAGIC || header.format_version != BLOB_FORMAT_VERSION {
            return None;
        }

        let payload = &raw[4 + header_len..];
        let actual = ContentHash::from_bytes(payload);
        if actual != header.checksum || actual != *hash {
            return None;
        }

        Some(payload.to_vec())
    }

    /// Removes blobs whose fingerprint is not in `live`.
    ///
    /// Returns the number of blobs removed.
    pub fn gc(&self, live: &BTreeSet<ContentHash>) -> Result<usize, CacheError> {
        if !self.dir.exists() {
            return Ok(0);
        }
        let live_names: BTreeSet<String> = live.iter().map(ContentHash::to_string).collect();

        let mut removed = 0;
        let entries = std::fs::read_dir(&self.dir).map_err(|e| CacheError::io(&self.dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| CacheError::io(&self.dir, e))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(BLOB_EXT) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if !live_names.contains(stem) {
                    std::fs::remove_file(&path).map_err(|e| CacheError::io(&path, e))?;
                    removed += 1;
                }
            }
        }

        Ok(removed)
    }
}
