//! Orphan collection: evicting cache entries that no current source needs.

use std::collections::HashSet;
use std::path::Path;

use mediapress_common::ContentDigest;

use crate::artifact::ArtifactStore;
use crate::error::CacheError;
use crate::manifest::{CacheEntry, CacheManifest};

/// Removes every entry whose digest is not in `live`, deleting its artifact.
///
/// Entries that are live but whose artifact is missing or has the wrong size
/// are removed as well (their artifact can no longer be served). Returns the
/// removed entries, in digest order.
///
/// Must only be called once every source of the current run has been hashed,
/// otherwise entries for not-yet-hashed files would be evicted.
pub fn prune_orphans(
    manifest: &mut CacheManifest,
    artifacts: &ArtifactStore,
    live: &HashSet<ContentDigest>,
) -> Vec<CacheEntry> {
    let doomed: Vec<ContentDigest> = manifest
        .entries()
        .filter(|e| !live.contains(&e.digest) || !artifacts.is_intact(e))
        .map(|e| e.digest)
        .collect();

    let mut removed = Vec::with_capacity(doomed.len());
    for digest in doomed {
        let Some(entry) = manifest.remove(&digest) else {
            continue;
        };
        if let Err(e) = artifacts.remove(&entry) {
            tracing::warn!(digest = %entry.digest, "failed to delete orphaned artifact: {e}");
        }
        removed.push(entry);
    }
    removed
}

/// Deletes artifact files in the cache directory that the manifest does not
/// reference, such as leftovers from an invalidated manifest.
pub fn sweep_untracked(
    manifest: &CacheManifest,
    artifacts: &ArtifactStore,
) -> Result<usize, CacheError> {
    let live: Vec<&Path> = manifest.entries().map(|e| e.artifact_path.as_path()).collect();
    artifacts.gc(&live)
}
