//! High-level cache store shared by the scheduler and its workers.
//!
//! `CacheStore` ties together the manifest, the artifact store, and orphan
//! collection behind one owned object. All manifest mutation goes through an
//! internal mutex, so `&CacheStore` can be shared freely across worker
//! threads while inserts stay single-writer.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use mediapress_common::{ContentDigest, MediaKind};
use mediapress_config::ConfigSnapshot;

use crate::artifact::ArtifactStore;
use crate::error::CacheError;
use crate::gc;
use crate::manifest::{CacheEntry, CacheManifest, LoadOutcome};

/// Owned, thread-safe compression cache for one run.
pub struct CacheStore {
    /// Content-addressed artifact files.
    artifacts: ArtifactStore,

    /// The in-memory manifest. Guarded so concurrent completions serialize.
    manifest: Mutex<CacheManifest>,

    /// What was found on disk when the store was opened.
    load_outcome: LoadOutcome,
}

impl CacheStore {
    /// Opens the cache in `cache_dir` for the given settings.
    ///
    /// Creates the directory if needed; failure to do so is the only error.
    /// A missing, unreadable, or stale manifest results in an empty cache.
    pub fn open(cache_dir: &Path, current: &ConfigSnapshot) -> Result<Self, CacheError> {
        let artifacts = ArtifactStore::new(cache_dir);
        artifacts.ensure_dir()?;

        let (manifest, load_outcome) = CacheManifest::load(cache_dir, current);
        match &load_outcome {
            LoadOutcome::Missing => {
                tracing::debug!(cache_dir = %cache_dir.display(), "no cache manifest, starting fresh");
            }
            LoadOutcome::Unreadable { reason } => {
                tracing::warn!("ignoring unreadable cache manifest: {reason}");
            }
            LoadOutcome::Invalidated { changes } => {
                tracing::info!("Configuration changed, clearing cache...");
                for change in changes {
                    tracing::info!("  {}: {} → {}", change.field, change.old, change.new);
                }
            }
            LoadOutcome::Reused { entries } => {
                tracing::debug!(entries, "loaded cache manifest");
            }
        }

        Ok(Self {
            artifacts,
            manifest: Mutex::new(manifest),
            load_outcome,
        })
    }

    fn lock(&self) -> MutexGuard<'_, CacheManifest> {
        self.manifest.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The cache directory.
    pub fn cache_dir(&self) -> &Path {
        self.artifacts.cache_dir()
    }

    /// What was found on disk when the store was opened.
    pub fn load_outcome(&self) -> &LoadOutcome {
        &self.load_outcome
    }

    /// Looks up a usable cache entry for a digest and destination extension.
    ///
    /// The output format follows the extension, so an entry whose artifact
    /// was encoded for a different extension is a miss. So is an entry whose
    /// artifact is missing or has the wrong size.
    pub fn lookup(&self, digest: &ContentDigest, ext: &str) -> Option<CacheEntry> {
        let entry = self.lock().lookup(digest).cloned()?;
        if entry.artifact_path != ArtifactStore::artifact_name(digest, ext) {
            return None;
        }
        self.artifacts.is_intact(&entry).then_some(entry)
    }

    /// Adds or replaces an entry.
    pub fn insert(&self, entry: CacheEntry) {
        self.lock().insert(entry);
    }

    /// Writes a freshly compressed artifact and records it in the manifest.
    ///
    /// `ext` is the source file's extension. The artifact file is written
    /// before the manifest lock is taken, so slow writes never block other
    /// workers.
    pub fn store_artifact(
        &self,
        digest: ContentDigest,
        kind: MediaKind,
        ext: &str,
        original_size: u64,
        data: &[u8],
    ) -> Result<CacheEntry, CacheError> {
        let artifact_path = self.artifacts.write_artifact(&digest, ext, data)?;
        let entry = CacheEntry {
            digest,
            artifact_path,
            original_size,
            compressed_size: data.len() as u64,
            kind,
        };
        self.insert(entry.clone());
        Ok(entry)
    }

    /// Records an artifact that a transcoder left on disk.
    ///
    /// Like [`CacheStore::store_artifact`], but the file at `src` is streamed
    /// into the cache instead of being passed in memory.
    pub fn store_artifact_file(
        &self,
        digest: ContentDigest,
        kind: MediaKind,
        ext: &str,
        original_size: u64,
        src: &Path,
    ) -> Result<CacheEntry, CacheError> {
        let (artifact_path, compressed_size) = self.artifacts.import_artifact(&digest, ext, src)?;
        let entry = CacheEntry {
            digest,
            artifact_path,
            original_size,
            compressed_size,
            kind,
        };
        self.insert(entry.clone());
        Ok(entry)
    }

    /// Copies a cached artifact to `dest`, atomically replacing it.
    pub fn copy_out(&self, entry: &CacheEntry, dest: &Path) -> Result<u64, CacheError> {
        self.artifacts.copy_out(entry, dest)
    }

    /// Absolute path of an entry's artifact.
    pub fn artifact_path(&self, entry: &CacheEntry) -> PathBuf {
        self.artifacts.path_of(entry)
    }

    /// Evicts every entry not in `live`, plus entries with damaged artifacts,
    /// then deletes artifact files no entry references.
    ///
    /// Returns the evicted entries.
    pub fn prune_orphans(&self, live: &HashSet<ContentDigest>) -> Vec<CacheEntry> {
        let mut manifest = self.lock();
        let removed = gc::prune_orphans(&mut manifest, &self.artifacts, live);
        match gc::sweep_untracked(&manifest, &self.artifacts) {
            Ok(0) => {}
            Ok(swept) => tracing::debug!(swept, "removed untracked artifact files"),
            Err(e) => tracing::warn!("failed to sweep untracked artifacts: {e}"),
        }
        removed
    }

    /// Persists the manifest atomically to the cache directory.
    pub fn persist(&self) -> Result<(), CacheError> {
        self.lock().persist(self.artifacts.cache_dir())
    }

    /// A copy of the current manifest.
    pub fn manifest(&self) -> CacheManifest {
        self.lock().clone()
    }

    /// Number of entries currently in the manifest.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` if the manifest has no entries.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Deletes the manifest and every artifact in `cache_dir`.
    pub fn clear(cache_dir: &Path) -> Result<(), CacheError> {
        ArtifactStore::new(cache_dir).clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediapress_config::CompressionConfig;

    fn snapshot() -> ConfigSnapshot {
        ConfigSnapshot::capture(&CompressionConfig::default())
    }

    #[test]
    fn fresh_store_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::open(dir.path(), &snapshot()).unwrap();
        assert!(store.is_empty());
        assert_eq!(store.load_outcome(), &LoadOutcome::Missing);
    }

    #[test]
    fn open_creates_nested_cache_dir() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("deeply").join("nested").join("cache");
        CacheStore::open(&nested, &snapshot()).unwrap();
        assert!(nested.is_dir());
    }

    #[test]
    fn store_then_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::open(dir.path(), &snapshot()).unwrap();
        let digest = ContentDigest::from_bytes(b"original");
        let entry = store
            .store_artifact(digest, MediaKind::Image, "png", 8, b"small")
            .unwrap();

        assert_eq!(store.lookup(&digest, "png"), Some(entry.clone()));
        assert_eq!(store.lookup(&digest, "PNG"), Some(entry.clone()));
        assert_eq!(
            std::fs::read(store.artifact_path(&entry)).unwrap(),
            b"small"
        );
    }

    #[test]
    fn lookup_with_deleted_artifact_is_miss() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::open(dir.path(), &snapshot()).unwrap();
        let digest = ContentDigest::from_bytes(b"original");
        let entry = store
            .store_artifact(digest, MediaKind::Image, "png", 8, b"small")
            .unwrap();
        std::fs::remove_file(store.artifact_path(&entry)).unwrap();
        assert!(store.lookup(&digest, "png").is_none());
    }

    #[test]
    fn lookup_for_other_extension_is_miss() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::open(dir.path(), &snapshot()).unwrap();
        let digest = ContentDigest::from_bytes(b"same bytes");
        store
            .store_artifact(digest, MediaKind::Image, "png", 10, b"png data")
            .unwrap();
        assert!(store.lookup(&digest, "jpg").is_none());
        assert!(store.lookup(&digest, "png").is_some());
    }

    #[test]
    fn store_artifact_file_streams_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join("cache");
        let store = CacheStore::open(&cache, &snapshot()).unwrap();
        let scratch = dir.path().join("out.webm");
        std::fs::write(&scratch, b"webm bytes").unwrap();
        let digest = ContentDigest::from_bytes(b"raw");

        let entry = store
            .store_artifact_file(digest, MediaKind::Video, "webm", 3000, &scratch)
            .unwrap();
        assert_eq!(entry.compressed_size, 10);
        assert_eq!(store.lookup(&digest, "webm"), Some(entry.clone()));
        assert_eq!(std::fs::read(store.artifact_path(&entry)).unwrap(), b"webm bytes");
    }

    #[test]
    fn persist_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = CacheStore::open(dir.path(), &snapshot()).unwrap();
            store
                .store_artifact(
                    ContentDigest::from_bytes(b"a"),
                    MediaKind::Video,
                    "mp4",
                    100,
                    b"v",
                )
                .unwrap();
            store.persist().unwrap();
        }
        let store = CacheStore::open(dir.path(), &snapshot()).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.load_outcome(), &LoadOutcome::Reused { entries: 1 });
    }

    #[test]
    fn reopen_with_changed_config_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = CacheStore::open(dir.path(), &snapshot()).unwrap();
            store
                .store_artifact(ContentDigest::from_bytes(b"a"), MediaKind::Image, "jpg", 10, b"x")
                .unwrap();
            store.persist().unwrap();
        }
        let changed = ConfigSnapshot::capture(&CompressionConfig {
            skip_videos: true,
            ..CompressionConfig::default()
        });
        let store = CacheStore::open(dir.path(), &changed).unwrap();
        assert!(store.is_empty());
        assert!(matches!(
            store.load_outcome(),
            LoadOutcome::Invalidated { .. }
        ));
    }

    #[test]
    fn prune_orphans_also_sweeps_untracked_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::open(dir.path(), &snapshot()).unwrap();
        let keep = store
            .store_artifact(ContentDigest::from_bytes(b"keep"), MediaKind::Image, "png", 4, b"k")
            .unwrap();
        let gone = store
            .store_artifact(ContentDigest::from_bytes(b"gone"), MediaKind::Image, "png", 4, b"g")
            .unwrap();
        let stray = format!("{}.png", ContentDigest::from_bytes(b"stray"));
        std::fs::write(dir.path().join(&stray), b"leftover").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"mine").unwrap();

        let live: HashSet<_> = [keep.digest].into_iter().collect();
        let removed = store.prune_orphans(&live);

        assert_eq!(removed, vec![gone.clone()]);
        assert!(!store.artifact_path(&gone).exists());
        assert!(!dir.path().join(&stray).exists());
        assert!(dir.path().join("notes.txt").exists());
        assert!(store.artifact_path(&keep).exists());
    }

    #[test]
    fn tampered_manifest_cannot_delete_outside_files() {
        let root = tempfile::tempdir().unwrap();
        let cache = root.path().join("cache");
        let victim = root.path().join("victim.txt");
        std::fs::write(&victim, b"precious").unwrap();
        {
            let store = CacheStore::open(&cache, &snapshot()).unwrap();
            store.persist().unwrap();
        }

        let manifest_path = cache.join(crate::MANIFEST_FILE);
        let mut raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&manifest_path).unwrap()).unwrap();
        let digest = ContentDigest::from_bytes(b"victim");
        raw["entries"][digest.to_string()] = serde_json::json!({
            "path": "../victim.txt",
            "original_size": 8,
            "compressed_size": 8,
            "kind": "image",
        });
        std::fs::write(&manifest_path, serde_json::to_vec(&raw).unwrap()).unwrap();

        let store = CacheStore::open(&cache, &snapshot()).unwrap();
        assert!(store.is_empty());
        store.prune_orphans(&HashSet::new());
        assert_eq!(std::fs::read(&victim).unwrap(), b"precious");
    }

    #[test]
    fn concurrent_inserts_are_all_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::open(dir.path(), &snapshot()).unwrap();
        std::thread::scope(|s| {
            for t in 0..8u8 {
                let store = &store;
                s.spawn(move || {
                    for i in 0..16u8 {
                        let digest = ContentDigest::from_bytes(&[t, i]);
                        store
                            .store_artifact(digest, MediaKind::Image, "png", 2, &[t, i, 0])
                            .unwrap();
                    }
                });
            }
        });
        assert_eq!(store.len(), 8 * 16);
    }

    #[test]
    fn clear_removes_manifest_and_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = CacheStore::open(dir.path(), &snapshot()).unwrap();
            store
                .store_artifact(ContentDigest::from_bytes(b"a"), MediaKind::Image, "png", 1, b"a")
                .unwrap();
            store.persist().unwrap();
        }
        CacheStore::clear(dir.path()).unwrap();
        let store = CacheStore::open(dir.path(), &snapshot()).unwrap();
        assert!(store.is_empty());
        assert_eq!(store.load_outcome(), &LoadOutcome::Missing);
    }
}
