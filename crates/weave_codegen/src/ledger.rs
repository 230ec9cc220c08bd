//! Bookkeeping of every output path written during a pass.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use weave_cache::RetainedArtifact;
use weave_common::{ContentHash, RelPath};
use weave_source::GeneratedArtifact;

use crate::error::GenerationError;

/// What currently occupies an output path.
enum Slot {
    /// Written by a generator in this pass.
    Produced {
        generator: String,
        artifact: GeneratedArtifact,
    },
    /// Kept from the cache for an unchanged source.
    Retained {
        owners: String,
        fingerprint: ContentHash,
    },
}

/// How an artifact was taken into the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Admission {
    /// The path had not been produced in this pass.
    New,
    /// A flushing generator replaced its own earlier output with new content.
    Replaced,
    /// The path already held identical content.
    Unchanged,
}

impl Admission {
    /// Returns `true` if the artifact must be written to disk.
    pub(crate) fn needs_write(self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

/// Tracks which producer owns each output path and rejects conflicting
/// writes.
#[derive(Default)]
pub(crate) struct OutputLedger {
    slots: BTreeMap<RelPath, Slot>,
}

impl OutputLedger {
    /// Seeds the ledger with artifacts kept from the cache.
    pub(crate) fn with_retained(retained: &BTreeMap<RelPath, RetainedArtifact>) -> Self {
        let slots = retained
            .iter()
            .map(|(path, kept)| {
                let owners = kept
                    .owners
                    .iter()
                    .map(|id| id.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                let slot = Slot::Retained {
                    owners: format!("cache of {owners}"),
                    fingerprint: kept.fingerprint,
                };
                (path.clone(), slot)
            })
            .collect();
        Self { slots }
    }

    /// Takes `artifact` from `generator` into the ledger.
    ///
    /// Identical content for an already produced path is accepted; differing
    /// content is a [`GenerationError::ConflictingOutput`] unless `flushing`
    /// is set and `generator` produced the path itself. `output_root` is only
    /// read to report the content of a conflicting cached artifact.
    pub(crate) fn admit(
        &mut self,
        generator: &str,
        artifact: GeneratedArtifact,
        flushing: bool,
        output_root: &Path,
    ) -> Result<Admission, GenerationError> {
        let Some(slot) = self.slots.get_mut(&artifact.path) else {
            self.slots.insert(
                artifact.path.clone(),
                Slot::Produced {
                    generator: generator.to_string(),
                    artifact,
                },
            );
            return Ok(Admission::New);
        };

        match &mut *slot {
            Slot::Retained {
                owners,
                fingerprint,
            } => {
                if *fingerprint != artifact.fingerprint() {
                    let on_disk = artifact.path.to_path(output_root);
                    return Err(GenerationError::ConflictingOutput {
                        path: artifact.path.clone(),
                        first_generator: owners.clone(),
                        second_generator: generator.to_string(),
                        first_content: std::fs::read_to_string(on_disk).unwrap_or_default(),
                        second_content: artifact.content,
                    });
                }
                *slot = Slot::Produced {
                    generator: generator.to_string(),
                    artifact,
                };
                Ok(Admission::New)
            }
            Slot::Produced {
                generator: first,
                artifact: existing,
            } => {
                if flushing && first.as_str() == generator {
                    let changed = existing.content != artifact.content;
                    *existing = artifact;
                    return Ok(if changed {
                        Admission::Replaced
                    } else {
                        Admission::Unchanged
                    });
                }
                if existing.content != artifact.content {
                    return Err(GenerationError::ConflictingOutput {
                        path: artifact.path.clone(),
                        first_generator: first.clone(),
                        second_generator: generator.to_string(),
                        first_content: existing.content.clone(),
                        second_content: artifact.content,
                    });
                }

                if artifact.flush_overwrite {
                    tracing::trace!(
                        path = %artifact.path,
                        generator,
                        "flush overwrite of identical output"
                    );
                    *existing = artifact;
                } else {
                    merge_provenance(existing, artifact);
                }
                Ok(Admission::Unchanged)
            }
        }
    }

    /// Returns the produced artifacts ordered by path.
    pub(crate) fn into_artifacts(self) -> Vec<GeneratedArtifact> {
        self.slots
            .into_values()
            .filter_map(|slot| match slot {
                Slot::Produced { artifact, .. } => Some(artifact),
                Slot::Retained { .. } => None,
            })
            .collect()
    }
}

/// Combines the declared sources of two identical artifacts so the result
/// does not depend on which producer ran first.
fn merge_provenance(existing: &mut GeneratedArtifact, other: GeneratedArtifact) {
    existing.aggregating |= other.aggregating;
    if let Some(theirs) = other.sourced_from {
        existing
            .sourced_from
            .get_or_insert_with(BTreeSet::new)
            .extend(theirs);
    }
}
